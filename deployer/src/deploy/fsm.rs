//! Finite State Machine for a promotion run

use serde::{Deserialize, Serialize};

/// Promotion stage
///
/// Variants are declared in execution order; a run only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStage {
    /// Initial state, nothing checked yet
    Pending,

    /// Reject frozen targets
    ValidateFrozen,

    /// Resolve the source environment
    ResolveSource,

    /// Ask the platform for deployable code
    CheckDeployable,

    /// Configuration drift gate
    CheckDrift,

    /// Optional pre-deploy backup
    Backup,

    /// Deploy or initialize the target
    Deploy,

    /// Optional configuration import
    ConfigImport,

    /// Optional database updates
    DbUpdate,

    /// Application cache rebuild
    CacheClear,

    /// Optional platform cache clear
    EnvCacheClear,

    /// Outcome notification
    Notify,

    /// Terminal state
    Finished,
}

/// Promotion FSM
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    stage: DeploymentStage,
    history: Vec<DeploymentStage>,
    error: Option<String>,
    failed_stage: Option<DeploymentStage>,
}

impl DeploymentFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self {
            stage: DeploymentStage::Pending,
            history: Vec::new(),
            error: None,
            failed_stage: None,
        }
    }

    /// Get current stage
    pub fn stage(&self) -> DeploymentStage {
        self.stage
    }

    /// Stages entered so far, in order
    pub fn history(&self) -> &[DeploymentStage] {
        &self.history
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Stage that was active when the run failed
    pub fn failed_stage(&self) -> Option<DeploymentStage> {
        self.failed_stage
    }

    /// Enter the next stage. Stages may be skipped but never re-entered.
    pub fn advance(&mut self, next: DeploymentStage) -> Result<(), String> {
        if self.stage == DeploymentStage::Finished || next <= self.stage {
            return Err(format!(
                "Invalid transition: {:?} -> {:?}",
                self.stage, next
            ));
        }
        self.stage = next;
        self.history.push(next);
        Ok(())
    }

    /// Record a fatal failure in the current stage
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.failed_stage = Some(self.stage);
        self.error = Some(reason.into());
    }

    /// Whether the run has failed
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Whether a stage was entered during this run
    pub fn visited(&self, stage: DeploymentStage) -> bool {
        self.history.contains(&stage)
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}
