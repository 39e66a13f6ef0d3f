use crate::gateway::ProfileUpdate;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::gateway_err;
use crate::ipc::types::{AppState, Request};
use crate::session::Role;
use serde_json::json;

fn handle_restore(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_profile", "open a profile first", None);
    };

    state.session.restore(conn);
    ok(&req.id, json!({ "identity": state.session.current() }))
}

fn handle_current(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "identity": state.session.current(),
            "sessionId": state.session.handle(),
        }),
    )
}

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_profile", "open a profile first", None);
    };
    let Some(gateway) = state.gateway.as_ref() else {
        return err(&req.id, "no_profile", "open a profile first", None);
    };

    let email = match req.params.get("email").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing email", None),
    };
    let password = match req.params.get("password").and_then(|v| v.as_str()) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => return err(&req.id, "bad_params", "missing password", None),
    };

    match state.session.login(gateway, conn, &email, &password) {
        Ok(identity) => {
            // A different user may now be looking at a different roster.
            state.students = None;
            ok(&req.id, json!({ "identity": identity }))
        }
        Err(e) => err(
            &req.id,
            "auth_failed",
            e.user_message("Login failed"),
            e.status().map(|s| json!({ "status": s })),
        ),
    }
}

fn handle_register(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(gateway) = state.gateway.as_ref() else {
        return err(&req.id, "no_profile", "open a profile first", None);
    };

    let email = match req.params.get("email").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing email", None),
    };
    let password = match req.params.get("password").and_then(|v| v.as_str()) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => return err(&req.id, "bad_params", "missing password", None),
    };
    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing name", None),
    };
    let role = match req.params.get("role").and_then(|v| v.as_str()) {
        None => Role::User,
        Some(raw) => match Role::parse(raw) {
            Some(role) => role,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "role must be user or admin",
                    Some(json!({ "role": raw })),
                )
            }
        },
    };

    match state.session.register(gateway, &email, &password, &name, role) {
        Ok(()) => ok(&req.id, json!({ "registered": true })),
        Err(e) => err(
            &req.id,
            "register_failed",
            e.user_message("Registration failed"),
            e.status().map(|s| json!({ "status": s })),
        ),
    }
}

fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_profile", "open a profile first", None);
    };

    state.session.logout(conn);
    state.students = None;
    ok(&req.id, json!({ "loggedOut": true }))
}

fn handle_update_profile(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_profile", "open a profile first", None);
    };
    let Some(gateway) = state.gateway.as_ref() else {
        return err(&req.id, "no_profile", "open a profile first", None);
    };
    let Some(user_email) = state.session.current().map(|i| i.email.clone()) else {
        return err(&req.id, "not_authenticated", "login first", None);
    };

    let current_password = match req.params.get("currentPassword").and_then(|v| v.as_str()) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => return err(&req.id, "bad_params", "missing currentPassword", None),
    };
    let name = req
        .params
        .get("name")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let email = req
        .params
        .get("email")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let new_password = req
        .params
        .get("newPassword")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty());

    if name.is_none() && email.is_none() && new_password.is_none() {
        return err(&req.id, "bad_params", "nothing to update", None);
    }

    let update = ProfileUpdate {
        current_password,
        name: name.clone(),
        email: email.clone(),
        new_password,
    };

    match gateway.update_profile(&user_email, &update) {
        Ok(()) => {
            state
                .session
                .apply_profile_update(conn, name.as_deref(), email.as_deref());
            ok(&req.id, json!({ "identity": state.session.current() }))
        }
        Err(e) => gateway_err(&req.id, "Failed to update profile", &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.restore" => Some(handle_restore(state, req)),
        "auth.current" => Some(handle_current(state, req)),
        "auth.login" => Some(handle_login(state, req)),
        "auth.register" => Some(handle_register(state, req)),
        "auth.logout" => Some(handle_logout(state, req)),
        "auth.updateProfile" => Some(handle_update_profile(state, req)),
        _ => None,
    }
}
