//! Deployment options

/// Annotation used when no deploy message is given
pub const DEFAULT_DEPLOY_MESSAGE: &str = "Deploy from safe-deploy";

/// Options for a single promotion run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOptions {
    /// Continue despite configuration drift
    pub force_deploy: bool,

    /// Import configuration after the deploy
    pub with_config_import: bool,

    /// Run database updates after the deploy
    pub with_db_update: bool,

    /// Back up code and database before the deploy
    pub with_backup: bool,

    /// Clear the platform's environment caches at the end
    pub clear_env_caches: bool,

    /// Annotation attached to the deploy operation
    pub deploy_message: String,

    /// Send a notification on success or failure
    pub notify: bool,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            force_deploy: false,
            with_config_import: false,
            with_db_update: false,
            with_backup: false,
            clear_env_caches: false,
            deploy_message: DEFAULT_DEPLOY_MESSAGE.to_string(),
            notify: false,
        }
    }
}

impl DeployOptions {
    /// Normalize the options once at entry
    pub fn validated(mut self) -> Self {
        let message = self.deploy_message.trim();
        self.deploy_message = if message.is_empty() {
            DEFAULT_DEPLOY_MESSAGE.to_string()
        } else {
            message.to_string()
        };
        self
    }
}
