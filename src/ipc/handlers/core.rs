use crate::db;
use crate::gateway::Gateway;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::session::Session;
use serde_json::json;
use std::path::PathBuf;

const GATEWAY_URL_KEY: &str = "gateway.base_url";
const GATEWAY_URL_ENV: &str = "STUDENTD_API_URL";

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "profilePath": state.profile.as_ref().map(|p| p.to_string_lossy().to_string()),
            "gatewayUrl": state.gateway.as_ref().map(|g| g.base_url().to_string()),
            "authenticated": state.session.current().is_some(),
            "sessionId": state.session.handle(),
        }),
    )
}

fn handle_profile_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    let conn = match db::open_db(&path) {
        Ok(conn) => conn,
        Err(e) => return err(&req.id, "db_open_failed", format!("{e:?}"), None),
    };

    // Base URL resolution: explicit param, else what this profile used last,
    // else the environment.
    let param_url = req
        .params
        .get("apiBaseUrl")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let persisted_url = db::settings_get(&conn, GATEWAY_URL_KEY).ok().flatten();
    let env_url = std::env::var(GATEWAY_URL_ENV)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let Some(base_url) = param_url.or(persisted_url).or(env_url) else {
        return err(
            &req.id,
            "bad_params",
            format!("missing apiBaseUrl (no saved gateway and {} is unset)", GATEWAY_URL_ENV),
            None,
        );
    };

    let gateway = Gateway::new(&base_url);
    let base_url = gateway.base_url().to_string();
    if let Err(e) = db::settings_set(&conn, GATEWAY_URL_KEY, &base_url) {
        tracing::warn!(error = %e, "could not persist gateway base URL");
    }

    tracing::info!(profile = %path.to_string_lossy(), gateway = %base_url, "profile opened");

    // Opening a profile resets everything scoped to the previous one.
    state.profile = Some(path.clone());
    state.db = Some(conn);
    state.gateway = Some(gateway);
    state.session = Session::new();
    state.students = None;

    ok(
        &req.id,
        json!({
            "profilePath": path.to_string_lossy(),
            "gatewayUrl": base_url,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "profile.open" => Some(handle_profile_open(state, req)),
        _ => None,
    }
}
