use crate::ipc::error::{err, ok};
use crate::ipc::handlers::gateway_err;
use crate::ipc::types::{AppState, Request};
use crate::session::{Identity, Role};
use serde_json::json;

/// Admin-only handler family. The service enforces the same rule; gating
/// here as well means a non-admin session never generates the request at
/// all, mirroring what the browser build did.
fn require_admin<'a>(
    state: &'a AppState,
    req: &Request,
    denial: &str,
) -> Result<&'a Identity, serde_json::Value> {
    let Some(identity) = state.session.current() else {
        return Err(err(&req.id, "not_authenticated", "login first", None));
    };
    if !identity.role.is_admin() {
        return Err(err(&req.id, "forbidden", denial, None));
    }
    Ok(identity)
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(gateway) = state.gateway.as_ref() else {
        return err(&req.id, "no_profile", "open a profile first", None);
    };
    let identity = match require_admin(state, req, "Only admins can view users") {
        Ok(identity) => identity,
        Err(resp) => return resp,
    };

    match gateway.list_users(&identity.email) {
        Ok(users) => ok(&req.id, json!({ "users": users })),
        Err(e) => gateway_err(&req.id, "Failed to load users", &e),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(gateway) = state.gateway.as_ref() else {
        return err(&req.id, "no_profile", "open a profile first", None);
    };
    let identity = match require_admin(state, req, "Only admins can delete users") {
        Ok(identity) => identity,
        Err(resp) => return resp,
    };
    let user_id = match req.params.get("userId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing userId", None),
    };

    match gateway.delete_user(&identity.email, &user_id) {
        Ok(()) => ok(&req.id, json!({ "deleted": true })),
        Err(e) => gateway_err(&req.id, "Failed to delete user", &e),
    }
}

fn handle_update_role(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(gateway) = state.gateway.as_ref() else {
        return err(&req.id, "no_profile", "open a profile first", None);
    };
    let identity = match require_admin(state, req, "Only admins can update user roles") {
        Ok(identity) => identity,
        Err(resp) => return resp,
    };
    let user_id = match req.params.get("userId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing userId", None),
    };
    let role = match req.params.get("role").and_then(|v| v.as_str()) {
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
        None => return err(&req.id, "bad_params", "missing role", None),
    };

    match gateway.update_user_role(&identity.email, &user_id, role) {
        Ok(()) => ok(&req.id, json!({ "updated": true })),
        Err(e) => gateway_err(&req.id, "Failed to update user role", &e),
    }
}

fn handle_logs_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(gateway) = state.gateway.as_ref() else {
        return err(&req.id, "no_profile", "open a profile first", None);
    };
    let identity = match require_admin(state, req, "Only admins can view activity logs") {
        Ok(identity) => identity,
        Err(resp) => return resp,
    };

    match gateway.list_activity_logs(&identity.email) {
        Ok(logs) => ok(&req.id, json!({ "logs": logs })),
        Err(e) => gateway_err(&req.id, "Failed to load activity logs", &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.list" => Some(handle_list(state, req)),
        "users.delete" => Some(handle_delete(state, req)),
        "users.updateRole" => Some(handle_update_role(state, req)),
        "logs.list" => Some(handle_logs_list(state, req)),
        _ => None,
    }
}
