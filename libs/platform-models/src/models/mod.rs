//! API models

use serde::{Deserialize, Serialize};

/// Machine token authorization request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineTokenRequest {
    pub machine_token: String,
    pub client: String,
}

/// Session returned by the authorization endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session: String,
    pub user_id: String,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

/// Site name lookup response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteNameResponse {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Site info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub frozen: bool,
}

/// A commit from an environment's code log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    /// Environments the commit has been deployed to
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Workflow creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRequest {
    #[serde(rename = "type")]
    pub workflow_type: String,
    pub params: serde_json::Value,
}

/// Final task of a finished workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTask {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub messages: Option<serde_json::Value>,
}

/// Workflow info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInfo {
    pub id: String,
    #[serde(default)]
    pub site_id: Option<String>,
    #[serde(rename = "type", default)]
    pub workflow_type: Option<String>,
    /// `succeeded`, `failed` or `aborted` once finished
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub active_description: Option<String>,
    #[serde(default)]
    pub finished_at: Option<f64>,
    #[serde(default)]
    pub final_task: Option<WorkflowTask>,
}

impl WorkflowInfo {
    /// Whether the workflow has reached a terminal state
    pub fn is_finished(&self) -> bool {
        self.result.is_some() || self.finished_at.is_some()
    }

    /// Whether the workflow finished successfully
    pub fn is_successful(&self) -> bool {
        self.result.as_deref() == Some("succeeded")
    }
}

/// User profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
}

/// User info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub profile: UserProfile,
}

impl UserInfo {
    /// Display name, falling back to the email address
    pub fn display_name(&self) -> Option<String> {
        if let Some(name) = self.profile.full_name.as_deref().filter(|n| !n.trim().is_empty()) {
            return Some(name.to_string());
        }
        let parts: Vec<&str> = [self.profile.firstname.as_deref(), self.profile.lastname.as_deref()]
            .into_iter()
            .flatten()
            .filter(|p| !p.trim().is_empty())
            .collect();
        if !parts.is_empty() {
            return Some(parts.join(" "));
        }
        self.email.clone()
    }
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}
