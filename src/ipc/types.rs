use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::gateway::{Gateway, Student};
use crate::session::Session;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Transient copy of the last student fetch. `rev` is monotonic across
/// refreshes so a UI can discard renders built from an older fetch.
pub struct StudentsCache {
    pub students: Vec<Student>,
    pub rev: u64,
}

/// Explicit process context: there is no global session state anywhere.
pub struct AppState {
    pub profile: Option<PathBuf>,
    pub db: Option<Connection>,
    pub gateway: Option<Gateway>,
    pub session: Session,
    pub students: Option<StudentsCache>,
    pub students_rev: u64,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            profile: None,
            db: None,
            gateway: None,
            session: Session::new(),
            students: None,
            students_rev: 0,
        }
    }
}
