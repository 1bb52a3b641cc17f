//! Configuration drift detection

use serde_json::Value;
use tracing::{info, warn};

use crate::deploy::confirm::Confirmer;
use crate::deploy::environment::EnvironmentRef;
use crate::errors::DeployError;
use crate::platform::PlatformApi;
use crate::remote::CommandExecutor;

/// Remote tool that reports configuration status
pub const STATUS_COMMAND: &str = "drush";

/// Arguments of the status report
pub const STATUS_ARGS: &[&str] = &["config:status"];

/// Failure reason when drift blocks a deploy
pub const DRIFT_ABORT_REASON: &str = "There is overridden configuration on the target environment. Deploying is not automatically considered safe.";

/// Result of a single drift check
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDriftResult {
    pub has_drift: bool,
    pub raw_diff: Value,
}

/// How the drift gate was passed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftGate {
    /// No drift
    Clean,

    /// Drift present, overridden by `force_deploy`
    Forced,

    /// Drift present, the operator agreed to continue
    Confirmed,
}

/// Whether a status report contains anything
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Runs the configuration status report on an environment
pub struct DriftChecker<'a> {
    executor: &'a dyn CommandExecutor,
}

impl<'a> DriftChecker<'a> {
    pub fn new(executor: &'a dyn CommandExecutor) -> Self {
        Self { executor }
    }

    /// Check the environment for configuration drift
    pub async fn check_drift(&self, env: &EnvironmentRef) -> Result<ConfigDriftResult, DeployError> {
        let raw_diff = self
            .executor
            .execute_json(env, STATUS_COMMAND, STATUS_ARGS)
            .await?;

        Ok(ConfigDriftResult {
            has_drift: is_truthy(&raw_diff),
            raw_diff,
        })
    }

    /// Print the human readable status table
    pub async fn show_status(&self, env: &EnvironmentRef) -> Result<(), DeployError> {
        let output = self.executor.execute(env, STATUS_COMMAND, STATUS_ARGS).await?;
        println!("{}", output.stdout_lossy().trim_end());
        Ok(())
    }

    /// Apply the drift gate to a check result
    pub fn gate(
        &self,
        env: &EnvironmentRef,
        result: &ConfigDriftResult,
        force_deploy: bool,
        confirmer: &dyn Confirmer,
    ) -> Result<DriftGate, DeployError> {
        if !result.has_drift {
            info!("There are no configuration differences.");
            return Ok(DriftGate::Clean);
        }

        if force_deploy {
            warn!("Deploying to {} despite overridden configuration.", env);
            return Ok(DriftGate::Forced);
        }

        let prompt = format!(
            "There are configuration differences on {}. Are you sure you want to CONTINUE?",
            env
        );
        if confirmer.confirm(&prompt)? {
            warn!("Continuing on {} with overridden configuration.", env);
            return Ok(DriftGate::Confirmed);
        }

        Err(DeployError::ConfigurationDrift(DRIFT_ABORT_REASON.to_string()))
    }
}

/// Report whether it is safe to deploy to `env`
pub async fn check_config(
    platform: &dyn PlatformApi,
    executor: &dyn CommandExecutor,
    env: &EnvironmentRef,
    throw_on_drift: bool,
) -> Result<ConfigDriftResult, DeployError> {
    if platform.is_frozen(env).await? {
        return Err(DeployError::SiteFrozen(env.site.clone()));
    }

    let checker = DriftChecker::new(executor);
    let result = checker.check_drift(env).await?;
    if !result.has_drift {
        info!("Configuration is in sync on target environment.");
        return Ok(result);
    }

    checker.show_status(env).await?;
    if throw_on_drift {
        return Err(DeployError::ConfigurationDrift(DRIFT_ABORT_REASON.to_string()));
    }
    warn!("Flagging as safe, even though there is overridden configuration.");
    Ok(result)
}
