use httpmock::prelude::*;
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_studentd");
    let mut child = Command::new(exe)
        .env_remove("STUDENTD_API_URL")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn studentd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn open_profile(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    profile: &Path,
    api_base_url: Option<&str>,
) -> serde_json::Value {
    let mut params = json!({ "path": profile.to_string_lossy() });
    if let Some(url) = api_base_url {
        params["apiBaseUrl"] = json!(url);
    }
    request(stdin, reader, "open", "profile.open", params)
}

fn mock_login(server: &MockServer, email: &str, name: &str, role: &str) {
    let body = json!({
        "user": {
            "id": "u-1",
            "email": email,
            "name": name,
            "role": role,
            "created_at": "2026-01-15T09:30:00.000000"
        }
    });
    let matcher = format!(r#"{{ "email": "{}" }}"#, email);
    server.mock(move |when, then| {
        when.method(POST)
            .path("/auth/login")
            .json_body_includes(matcher.clone());
        then.status(200)
            .header("content-type", "application/json")
            .json_body(body.clone());
    });
}

#[test]
fn login_persists_across_a_restart() {
    let profile = temp_dir("studentd-session-restart");
    let server = MockServer::start();
    mock_login(&server, "asha@example.edu", "Asha", "user");

    let first_identity;
    {
        let (mut child, mut stdin, mut reader) = spawn_sidecar();
        let opened = open_profile(&mut stdin, &mut reader, &profile, Some(&server.base_url()));
        assert_eq!(opened["ok"], json!(true));

        let restored = request(&mut stdin, &mut reader, "1", "auth.restore", json!({}));
        assert_eq!(restored["result"]["identity"], json!(null));

        let login = request(
            &mut stdin,
            &mut reader,
            "2",
            "auth.login",
            json!({ "email": "asha@example.edu", "password": "pw" }),
        );
        assert_eq!(login["ok"], json!(true));
        first_identity = login["result"]["identity"].clone();

        drop(stdin);
        let _ = child.wait();
    }

    // Fresh process over the same profile; no apiBaseUrl this time, the
    // persisted gateway URL must be picked up.
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let opened = open_profile(&mut stdin, &mut reader, &profile, None);
    assert_eq!(opened["ok"], json!(true));
    assert_eq!(
        opened["result"]["gatewayUrl"].as_str(),
        Some(server.base_url().as_str())
    );

    let restored = request(&mut stdin, &mut reader, "3", "auth.restore", json!({}));
    assert_eq!(restored["result"]["identity"], first_identity);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(profile);
}

#[test]
fn failed_login_reports_reason_and_keeps_identity() {
    let profile = temp_dir("studentd-session-badlogin");
    let server = MockServer::start();
    mock_login(&server, "asha@example.edu", "Asha", "user");
    server.mock(|when, then| {
        when.method(POST)
            .path("/auth/login")
            .json_body_includes(r#"{ "email": "intruder@example.edu" }"#);
        then.status(401)
            .header("content-type", "application/json")
            .json_body(json!({ "detail": "Invalid credentials" }));
    });

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_profile(&mut stdin, &mut reader, &profile, Some(&server.base_url()));

    let login = request(
        &mut stdin,
        &mut reader,
        "1",
        "auth.login",
        json!({ "email": "asha@example.edu", "password": "pw" }),
    );
    assert_eq!(login["ok"], json!(true));

    let failed = request(
        &mut stdin,
        &mut reader,
        "2",
        "auth.login",
        json!({ "email": "intruder@example.edu", "password": "guess" }),
    );
    assert_eq!(failed["ok"], json!(false));
    assert_eq!(failed["error"]["code"], json!("auth_failed"));
    assert_eq!(failed["error"]["message"], json!("Invalid credentials"));

    let current = request(&mut stdin, &mut reader, "3", "auth.current", json!({}));
    assert_eq!(
        current["result"]["identity"]["email"],
        json!("asha@example.edu")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(profile);
}

#[test]
fn logout_clears_the_store_for_later_restores() {
    let profile = temp_dir("studentd-session-logout");
    let server = MockServer::start();
    mock_login(&server, "asha@example.edu", "Asha", "user");

    {
        let (mut child, mut stdin, mut reader) = spawn_sidecar();
        let _ = open_profile(&mut stdin, &mut reader, &profile, Some(&server.base_url()));
        let login = request(
            &mut stdin,
            &mut reader,
            "1",
            "auth.login",
            json!({ "email": "asha@example.edu", "password": "pw" }),
        );
        assert_eq!(login["ok"], json!(true));

        let out = request(&mut stdin, &mut reader, "2", "auth.logout", json!({}));
        assert_eq!(out["result"]["loggedOut"], json!(true));

        let current = request(&mut stdin, &mut reader, "3", "auth.current", json!({}));
        assert_eq!(current["result"]["identity"], json!(null));

        drop(stdin);
        let _ = child.wait();
    }

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_profile(&mut stdin, &mut reader, &profile, None);
    let restored = request(&mut stdin, &mut reader, "4", "auth.restore", json!({}));
    assert_eq!(restored["result"]["identity"], json!(null));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(profile);
}

#[test]
fn register_leaves_the_session_alone() {
    let profile = temp_dir("studentd-session-register");
    let server = MockServer::start();
    let register = server.mock(|when, then| {
        when.method(POST).path("/auth/register");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({ "message": "User registered successfully" }));
    });

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_profile(&mut stdin, &mut reader, &profile, Some(&server.base_url()));

    let registered = request(
        &mut stdin,
        &mut reader,
        "1",
        "auth.register",
        json!({
            "email": "new@example.edu",
            "password": "pw",
            "name": "New User",
            "role": "user"
        }),
    );
    assert_eq!(registered["result"]["registered"], json!(true));
    register.assert();

    // Still logged out: registration must not adopt an identity.
    let current = request(&mut stdin, &mut reader, "2", "auth.current", json!({}));
    assert_eq!(current["result"]["identity"], json!(null));

    let restored = request(&mut stdin, &mut reader, "3", "auth.restore", json!({}));
    assert_eq!(restored["result"]["identity"], json!(null));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(profile);
}

#[test]
fn tampered_store_restores_as_absent() {
    let profile = temp_dir("studentd-session-tamper");
    let server = MockServer::start();
    mock_login(&server, "asha@example.edu", "Asha", "user");

    {
        let (mut child, mut stdin, mut reader) = spawn_sidecar();
        let _ = open_profile(&mut stdin, &mut reader, &profile, Some(&server.base_url()));
        let login = request(
            &mut stdin,
            &mut reader,
            "1",
            "auth.login",
            json!({ "email": "asha@example.edu", "password": "pw" }),
        );
        assert_eq!(login["ok"], json!(true));
        drop(stdin);
        let _ = child.wait();
    }

    // Flip a byte behind the daemon's back; the digest no longer matches.
    {
        let conn = rusqlite::Connection::open(profile.join("studentd.sqlite3"))
            .expect("open profile db");
        conn.execute(
            "UPDATE settings SET value = replace(value, 'asha', 'mallory')
             WHERE key = 'session.identity'",
            [],
        )
        .expect("tamper identity");
    }

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_profile(&mut stdin, &mut reader, &profile, None);
    let restored = request(&mut stdin, &mut reader, "2", "auth.restore", json!({}));
    assert_eq!(restored["ok"], json!(true), "corrupt store is not an error");
    assert_eq!(restored["result"]["identity"], json!(null));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(profile);
}

#[test]
fn opening_a_fresh_profile_needs_a_gateway_url() {
    let profile = temp_dir("studentd-session-nourl");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let opened = open_profile(&mut stdin, &mut reader, &profile, None);
    assert_eq!(opened["ok"], json!(false));
    assert_eq!(opened["error"]["code"], json!("bad_params"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(profile);
}
