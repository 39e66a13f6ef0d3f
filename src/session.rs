use std::fmt::Write as _;

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::db;
use crate::gateway::{Gateway, GatewayError};

const IDENTITY_KEY: &str = "session.identity";
const IDENTITY_DIGEST_KEY: &str = "session.identity.sha256";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// The authenticated user as the records service reported it at login time.
/// Persisted verbatim so a restore reproduces exactly what login produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub email: String,
    pub name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
}

/// At most one authenticated identity per process. `restore`, `login`,
/// `logout` and `apply_profile_update` are the only mutators; durable writes
/// happen before the mutating call returns.
pub struct Session {
    current: Option<Identity>,
    handle: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            current: None,
            handle: None,
        }
    }

    pub fn current(&self) -> Option<&Identity> {
        self.current.as_ref()
    }

    /// Ephemeral per-process handle for log correlation; never persisted.
    pub fn handle(&self) -> Option<&str> {
        self.handle.as_deref()
    }

    /// Adopts the persisted identity if one is present and intact. Missing,
    /// unparseable, or digest-mismatched records all read as "absent" — a
    /// corrupt store must never surface as an error.
    pub fn restore(&mut self, conn: &Connection) {
        self.current = load_identity(conn);
        self.handle = self
            .current
            .as_ref()
            .map(|_| Uuid::new_v4().to_string());
        if let Some(identity) = &self.current {
            tracing::info!(email = %identity.email, "session restored");
        }
    }

    /// On success the returned identity becomes current and is persisted.
    /// On failure the existing identity (if any) is left untouched.
    pub fn login(
        &mut self,
        gateway: &Gateway,
        conn: &Connection,
        email: &str,
        password: &str,
    ) -> Result<Identity, GatewayError> {
        let identity = gateway.login(email, password)?;
        persist_identity(conn, &identity);
        tracing::info!(email = %identity.email, role = identity.role.as_str(), "login");
        self.current = Some(identity.clone());
        self.handle = Some(Uuid::new_v4().to_string());
        Ok(identity)
    }

    /// Registration never touches the current identity, whatever the outcome.
    pub fn register(
        &self,
        gateway: &Gateway,
        email: &str,
        password: &str,
        name: &str,
        role: Role,
    ) -> Result<(), GatewayError> {
        gateway.register(email, password, name, role)
    }

    pub fn logout(&mut self, conn: &Connection) {
        if let Some(identity) = &self.current {
            tracing::info!(email = %identity.email, "logout");
        }
        self.current = None;
        self.handle = None;
        clear_identity(conn);
    }

    /// The profile endpoint can rename the account or change its email; the
    /// persisted identity is patched in step so a later restore does not
    /// resurrect stale fields.
    pub fn apply_profile_update(
        &mut self,
        conn: &Connection,
        name: Option<&str>,
        email: Option<&str>,
    ) {
        let Some(identity) = self.current.as_mut() else {
            return;
        };
        if let Some(n) = name {
            identity.name = n.to_string();
        }
        if let Some(e) = email {
            identity.email = e.to_string();
        }
        let snapshot = identity.clone();
        persist_identity(conn, &snapshot);
    }
}

fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut out = String::with_capacity(64);
    for b in digest {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

fn persist_identity(conn: &Connection, identity: &Identity) {
    // Best-effort: a failed durable write must not undo a successful
    // authentication, but it is worth a warning.
    let json = match serde_json::to_string(identity) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "could not serialize identity for persistence");
            return;
        }
    };
    let digest = sha256_hex(json.as_bytes());
    if let Err(e) = db::settings_set(conn, IDENTITY_KEY, &json)
        .and_then(|()| db::settings_set(conn, IDENTITY_DIGEST_KEY, &digest))
    {
        tracing::warn!(error = %e, "could not persist identity");
    }
}

fn load_identity(conn: &Connection) -> Option<Identity> {
    let json = db::settings_get(conn, IDENTITY_KEY).ok()??;
    let digest = db::settings_get(conn, IDENTITY_DIGEST_KEY).ok()??;
    if sha256_hex(json.as_bytes()) != digest {
        tracing::warn!("stored identity failed its integrity check; treating as absent");
        return None;
    }
    match serde_json::from_str(&json) {
        Ok(identity) => Some(identity),
        Err(e) => {
            tracing::warn!(error = %e, "stored identity is unreadable; treating as absent");
            None
        }
    }
}

fn clear_identity(conn: &Connection) {
    if let Err(e) = db::settings_delete(conn, IDENTITY_KEY)
        .and_then(|()| db::settings_delete(conn, IDENTITY_DIGEST_KEY))
    {
        tracing::warn!(error = %e, "could not clear persisted identity");
    }
}
