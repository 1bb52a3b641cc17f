//! Hosting platform API

pub mod client;
pub mod workflows;

use async_trait::async_trait;

use crate::deploy::environment::EnvironmentRef;
use crate::errors::DeployError;

/// A long-running platform operation that has been started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncOperation {
    /// Platform identifier of the operation
    pub id: String,

    /// Site the operation belongs to
    pub site_id: String,

    /// Human readable description, e.g. "Deploy code to test"
    pub description: String,
}

/// Completion status of an awaited operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub succeeded: bool,
    pub message: String,
}

/// Which elements a backup includes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupElements {
    pub code: bool,
    pub database: bool,
    pub files: bool,
}

impl Default for BackupElements {
    /// Code and database, not files
    fn default() -> Self {
        Self {
            code: true,
            database: true,
            files: false,
        }
    }
}

/// Parameters of an incremental deploy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployParams {
    pub updatedb: bool,
    pub annotation: String,
}

/// Capabilities consumed from the hosting platform
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Whether the site owning `env` is frozen
    async fn is_frozen(&self, env: &EnvironmentRef) -> Result<bool, DeployError>;

    /// Whether the predecessor environment has code `env` has not received
    async fn has_deployable_code(&self, env: &EnvironmentRef) -> Result<bool, DeployError>;

    /// Whether `env` has ever received code
    async fn is_initialized(&self, env: &EnvironmentRef) -> Result<bool, DeployError>;

    /// Start an incremental deploy
    async fn deploy(
        &self,
        env: &EnvironmentRef,
        params: &DeployParams,
    ) -> Result<AsyncOperation, DeployError>;

    /// Start the first deploy of an uninitialized environment
    async fn initialize_bindings(
        &self,
        env: &EnvironmentRef,
        annotation: &str,
    ) -> Result<AsyncOperation, DeployError>;

    /// Start a backup
    async fn create_backup(
        &self,
        env: &EnvironmentRef,
        elements: BackupElements,
    ) -> Result<AsyncOperation, DeployError>;

    /// Start a platform cache clear
    async fn clear_environment_cache(
        &self,
        env: &EnvironmentRef,
    ) -> Result<AsyncOperation, DeployError>;

    /// Block until the operation finishes
    async fn await_operation(
        &self,
        operation: &AsyncOperation,
    ) -> Result<OperationResult, DeployError>;

    /// Name of the user the session belongs to
    async fn current_user_name(&self) -> Result<String, DeployError>;
}
