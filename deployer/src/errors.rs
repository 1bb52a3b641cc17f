//! Error types for safe-deploy

use thiserror::Error;

/// Main error type for safe-deploy
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Invalid environment: {0}")]
    InvalidEnvironment(String),

    #[error("Site is frozen: {0}")]
    SiteFrozen(String),

    #[error("There is no code to deploy.")]
    NoDeployableCode,

    #[error("{0}")]
    ConfigurationDrift(String),

    #[error("Remote command error: {0}")]
    RemoteCommand(String),

    #[error("Deploy operation failed: {0}")]
    DeployOperationFailed(String),

    #[error("Notification delivery failed: {0}")]
    NotificationDeliveryFailed(String),

    #[error("Platform API error: {0}")]
    Platform(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeployError {
    /// Whether the error must abort the run.
    ///
    /// `NoDeployableCode` ends a run early but successfully.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, DeployError::NoDeployableCode)
    }
}

impl From<dialoguer::Error> for DeployError {
    fn from(err: dialoguer::Error) -> Self {
        DeployError::Prompt(err.to_string())
    }
}
