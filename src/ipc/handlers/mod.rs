pub mod auth;
pub mod core;
pub mod students;
pub mod users;

use serde_json::json;

use crate::gateway::GatewayError;
use crate::ipc::error::err;

/// Maps a gateway failure onto the IPC error taxonomy. The message is the
/// server's own detail when it sent one, `fallback` otherwise.
pub(crate) fn gateway_err(id: &str, fallback: &str, e: &GatewayError) -> serde_json::Value {
    let code = match e.status() {
        Some(401) => "not_authenticated",
        Some(403) => "forbidden",
        Some(404) => "not_found",
        _ => "gateway_failed",
    };
    let details = e.status().map(|s| json!({ "status": s }));
    err(id, code, e.user_message(fallback), details)
}
