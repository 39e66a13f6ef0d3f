use std::time::Duration;

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::session::{Identity, Role};

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Wire shapes mirror the records service verbatim (snake_case JSON). The
/// service emits naive UTC timestamps, hence `NaiveDateTime`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub name: String,
    pub marks: i64,
    pub grade: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemesterResult {
    pub semester: String,
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub roll_number: String,
    pub stream: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    pub current_semester: String,
    #[serde(default)]
    pub semester_results: Vec<SemesterResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentInput {
    pub name: String,
    pub roll_number: String,
    pub stream: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    pub current_semester: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StudentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roll_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_semester: Option<String>,
}

impl StudentPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.roll_number.is_none()
            && self.stream.is_none()
            && self.photo.is_none()
            && self.current_semester.is_none()
    }
}

/// Profile endpoint keys are camelCase on the wire, unlike the rest of the
/// service.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(rename = "currentPassword")]
    pub current_password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "newPassword", skip_serializing_if = "Option::is_none")]
    pub new_password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub action: String,
    pub user_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<NaiveDateTime>,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("could not reach the records service: {0}")]
    Transport(String),
    #[error("records service returned status {status}")]
    Api { status: u16, detail: Option<String> },
    #[error("records service sent an unreadable response: {0}")]
    BadResponse(String),
}

impl GatewayError {
    /// The message shown to a person: the server's own detail when it sent
    /// one, the caller's fallback otherwise.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            GatewayError::Api {
                detail: Some(d), ..
            } => d.clone(),
            _ => fallback.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct AuthResponse {
    user: Identity,
}

/// Client for the external records API. Authorization rides on a plain
/// `user_email` query parameter; that is the service's contract, kept on the
/// wire here and nowhere else. It is a weak trust boundary, not a pattern
/// to extend.
pub struct Gateway {
    agent: ureq::Agent,
    base_url: String,
}

impl Gateway {
    pub fn new(base_url: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn login(&self, email: &str, password: &str) -> Result<Identity, GatewayError> {
        let resp = self
            .agent
            .post(&self.url("/auth/login"))
            .send_json(json!({ "email": email, "password": password }))
            .map_err(map_err)?;
        let auth: AuthResponse = parse_json(resp)?;
        Ok(auth.user)
    }

    pub fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
        role: Role,
    ) -> Result<(), GatewayError> {
        self.agent
            .post(&self.url("/auth/register"))
            .send_json(json!({
                "email": email,
                "password": password,
                "name": name,
                "role": role.as_str(),
            }))
            .map_err(map_err)?;
        Ok(())
    }

    pub fn list_students(&self, user_email: &str) -> Result<Vec<Student>, GatewayError> {
        let resp = self
            .agent
            .get(&self.url("/students"))
            .query("user_email", user_email)
            .call()
            .map_err(map_err)?;
        parse_json(resp)
    }

    pub fn create_student(
        &self,
        user_email: &str,
        input: &StudentInput,
    ) -> Result<Student, GatewayError> {
        let resp = self
            .agent
            .post(&self.url("/students"))
            .query("user_email", user_email)
            .send_json(input)
            .map_err(map_err)?;
        parse_json(resp)
    }

    pub fn update_student(
        &self,
        user_email: &str,
        student_id: &str,
        patch: &StudentPatch,
    ) -> Result<Student, GatewayError> {
        let resp = self
            .agent
            .put(&self.url(&format!("/students/{}", student_id)))
            .query("user_email", user_email)
            .send_json(patch)
            .map_err(map_err)?;
        parse_json(resp)
    }

    pub fn delete_student(&self, user_email: &str, student_id: &str) -> Result<(), GatewayError> {
        self.agent
            .delete(&self.url(&format!("/students/{}", student_id)))
            .query("user_email", user_email)
            .call()
            .map_err(map_err)?;
        Ok(())
    }

    pub fn update_subjects(
        &self,
        user_email: &str,
        student_id: &str,
        semester: &str,
        subjects: &[Subject],
    ) -> Result<(), GatewayError> {
        self.agent
            .put(&self.url(&format!("/students/{}/subjects", student_id)))
            .query("user_email", user_email)
            .send_json(json!({ "semester": semester, "subjects": subjects }))
            .map_err(map_err)?;
        Ok(())
    }

    pub fn list_users(&self, user_email: &str) -> Result<Vec<Identity>, GatewayError> {
        let resp = self
            .agent
            .get(&self.url("/users"))
            .query("user_email", user_email)
            .call()
            .map_err(map_err)?;
        parse_json(resp)
    }

    pub fn delete_user(&self, user_email: &str, user_id: &str) -> Result<(), GatewayError> {
        self.agent
            .delete(&self.url(&format!("/users/{}", user_id)))
            .query("user_email", user_email)
            .call()
            .map_err(map_err)?;
        Ok(())
    }

    pub fn update_user_role(
        &self,
        user_email: &str,
        user_id: &str,
        role: Role,
    ) -> Result<(), GatewayError> {
        self.agent
            .put(&self.url(&format!("/users/{}/role", user_id)))
            .query("user_email", user_email)
            .send_json(json!({ "role": role.as_str() }))
            .map_err(map_err)?;
        Ok(())
    }

    pub fn update_profile(
        &self,
        user_email: &str,
        update: &ProfileUpdate,
    ) -> Result<(), GatewayError> {
        self.agent
            .put(&self.url("/users/profile"))
            .query("user_email", user_email)
            .send_json(update)
            .map_err(map_err)?;
        Ok(())
    }

    pub fn list_activity_logs(&self, user_email: &str) -> Result<Vec<ActivityLog>, GatewayError> {
        let resp = self
            .agent
            .get(&self.url("/activity-logs"))
            .query("user_email", user_email)
            .call()
            .map_err(map_err)?;
        parse_json(resp)
    }
}

fn parse_json<T: DeserializeOwned>(resp: ureq::Response) -> Result<T, GatewayError> {
    resp.into_json::<T>()
        .map_err(|e| GatewayError::BadResponse(e.to_string()))
}

fn map_err(e: ureq::Error) -> GatewayError {
    match e {
        ureq::Error::Status(status, resp) => {
            let detail = resp
                .into_string()
                .ok()
                .and_then(|body| serde_json::from_str::<serde_json::Value>(&body).ok())
                .and_then(|v| {
                    v.get("detail")
                        .and_then(|d| d.as_str())
                        .map(|s| s.to_string())
                });
            tracing::warn!(status, detail = detail.as_deref(), "gateway request failed");
            GatewayError::Api { status, detail }
        }
        ureq::Error::Transport(t) => {
            let msg = t.to_string();
            tracing::warn!(error = %msg, "gateway transport failure");
            GatewayError::Transport(msg)
        }
    }
}
