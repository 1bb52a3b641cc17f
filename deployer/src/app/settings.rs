//! Settings file and environment overrides

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;
use crate::logs::LogLevel;
use crate::notify::RetryPolicy;

/// Tool settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// Also write logs to this file
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Platform API configuration
    #[serde(default)]
    pub platform: PlatformSettings,

    /// Remote command configuration
    #[serde(default)]
    pub ssh: SshSettings,

    /// Notification configuration
    #[serde(default)]
    pub notification: NotificationSettings,
}

impl Settings {
    /// Load settings from an optional JSON file, then apply environment overrides
    pub async fn load(path: Option<&Path>) -> Result<Self, DeployError> {
        let mut settings = match path {
            Some(path) => {
                let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
                    DeployError::Config(format!("Unable to read {}: {}", path.display(), e))
                })?;
                serde_json::from_str(&contents).map_err(|e| {
                    DeployError::Config(format!("Invalid settings in {}: {}", path.display(), e))
                })?
            }
            None => Settings::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Override values from the environment
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = var("SLACK_URL") {
            self.notification.webhook_url = Some(url);
        }
        if let Some(link) = var("SLACK_MESSAGE_CONTEXT_LINK") {
            self.notification.context_link = Some(link);
        }
        if let Some(token) = var("TERMINUS_MACHINE_TOKEN") {
            self.platform.machine_token = Some(token);
        }
        if let Some(command) = var("TERMINUS_SSH_COMMAND") {
            self.ssh.command = command;
        }
    }
}

/// Platform API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformSettings {
    /// Base URL for the platform API
    #[serde(default = "default_platform_url")]
    pub base_url: String,

    /// Machine token used to open a session
    #[serde(default, skip_serializing)]
    pub machine_token: Option<String>,

    /// Seconds between workflow status polls
    #[serde(default = "default_poll_interval")]
    pub workflow_poll_interval_secs: u64,
}

fn default_platform_url() -> String {
    "https://terminus.pantheon.io/api".to_string()
}

fn default_poll_interval() -> u64 {
    3
}

impl PlatformSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.workflow_poll_interval_secs)
    }
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            base_url: default_platform_url(),
            machine_token: None,
            workflow_poll_interval_secs: default_poll_interval(),
        }
    }
}

/// SSH settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    /// ssh binary, optionally followed by extra arguments
    #[serde(default = "default_ssh_command")]
    pub command: String,

    /// Application server port
    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

fn default_ssh_command() -> String {
    "ssh".to_string()
}

fn default_ssh_port() -> u16 {
    2222
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            command: default_ssh_command(),
            port: default_ssh_port(),
        }
    }
}

/// Notification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Incoming webhook URL
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Extra context line appended to every message
    #[serde(default)]
    pub context_link: Option<String>,

    /// Delivery attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Seconds between attempts
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,

    /// Per-attempt timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_interval() -> u64 {
    3
}

fn default_timeout() -> u64 {
    5
}

impl NotificationSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_secs(self.retry_interval_secs),
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            context_link: None,
            max_attempts: default_max_attempts(),
            retry_interval_secs: default_retry_interval(),
            timeout_secs: default_timeout(),
        }
    }
}
