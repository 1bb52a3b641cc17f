//! Promotion orchestrator
//!
//! Drives one promotion run through the stages of [`DeploymentStage`]:
//! frozen check, source resolution, deployable-code check, drift gate,
//! optional backup, deploy, optional maintenance commands and the final
//! notification. A fatal error in any stage skips straight to notification.

use tracing::{debug, error, info, warn};

use crate::deploy::confirm::Confirmer;
use crate::deploy::drift::DriftChecker;
use crate::deploy::environment::{predecessor, EnvironmentRef, PipelineStage};
use crate::deploy::fsm::{DeploymentFsm, DeploymentStage};
use crate::deploy::options::DeployOptions;
use crate::errors::DeployError;
use crate::notify::{clip, ContentBlock, Dispatcher, Message, MessageError, RetryPolicy, MAX_TEXT_LEN};
use crate::platform::{AsyncOperation, BackupElements, DeployParams, OperationResult, PlatformApi};
use crate::remote::{command_line, CommandExecutor};

/// Maintenance tool run on the target after the deploy
const DRUSH: &str = "drush";

/// Per-run state handed to every stage
#[derive(Debug, Clone)]
pub struct DeploymentContext<'o> {
    pub target: EnvironmentRef,
    pub source: Option<PipelineStage>,
    pub options: &'o DeployOptions,

    /// User the platform session belongs to, resolved when notifying
    pub initiator: Option<String>,
}

impl<'o> DeploymentContext<'o> {
    pub fn new(target: EnvironmentRef, options: &'o DeployOptions) -> Self {
        Self {
            target,
            source: None,
            options,
            initiator: None,
        }
    }

    /// `*site* - source ➤ target`
    pub fn transition(&self) -> String {
        let source = self
            .source
            .map(|s| s.to_string())
            .unwrap_or_else(|| "?".to_string());
        format!("*{}* - {} ➤ {}", self.target.site, source, self.target.stage)
    }
}

/// Terminal value of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentOutcome {
    pub succeeded: bool,
    pub message: String,
    pub failure_reason: Option<String>,

    /// Nothing was deployed because the target was already up to date
    pub no_op: bool,

    /// Stage that failed, if any
    pub failed_stage: Option<DeploymentStage>,
}

impl DeploymentOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            message: message.into(),
            failure_reason: None,
            no_op: false,
            failed_stage: None,
        }
    }

    pub fn nothing_to_deploy() -> Self {
        Self {
            no_op: true,
            ..Self::success(DeployError::NoDeployableCode.to_string())
        }
    }

    pub fn failure(reason: impl Into<String>, stage: Option<DeploymentStage>) -> Self {
        let reason = reason.into();
        Self {
            succeeded: false,
            message: reason.clone(),
            failure_reason: Some(reason),
            no_op: false,
            failed_stage: stage,
        }
    }

    /// Process exit status for this outcome
    pub fn exit_code(&self) -> u8 {
        if self.succeeded {
            0
        } else {
            1
        }
    }
}

/// Where and how outcome notifications are sent
pub struct Notifier {
    pub dispatcher: Dispatcher,
    pub url: String,
    pub context_link: Option<String>,
    pub policy: RetryPolicy,
}

/// Wrap `text` as inline code in a labelled section, clipped to the text limit
fn code_section(label: &str, text: &str) -> Result<ContentBlock, MessageError> {
    let room = MAX_TEXT_LEN.saturating_sub(label.chars().count() + 4);
    ContentBlock::section(format!("{}: `{}`", label, clip(text, room)))
}

/// Build the notification for an outcome
pub fn outcome_message(
    ctx: &DeploymentContext<'_>,
    outcome: &DeploymentOutcome,
    context_link: Option<&str>,
) -> Result<Message, MessageError> {
    let user = ctx.initiator.as_deref().unwrap_or("unknown");
    let mut message = Message::new();
    if outcome.succeeded {
        message
            .push(ContentBlock::context(format!(
                "✅ Deployment completed: {}",
                ctx.transition()
            ))?)?
            .push(code_section("Message", &outcome.message)?)?;
    } else {
        let reason = outcome.failure_reason.as_deref().unwrap_or(&outcome.message);
        message
            .push(ContentBlock::context(format!(
                "🚨 Deployment failed: {}",
                ctx.transition()
            ))?)?
            .push(code_section("Reason", reason)?)?;
    }
    message
        .push(ContentBlock::Divider)?
        .push(ContentBlock::context(format!("Initiated by: {}", user))?)?;
    if let Some(link) = context_link.filter(|l| !l.trim().is_empty()) {
        message.push(ContentBlock::context(link)?)?;
    }
    Ok(message)
}

/// Runs promotions against a platform
pub struct Deployer<'a> {
    platform: &'a dyn PlatformApi,
    executor: &'a dyn CommandExecutor,
    confirmer: &'a dyn Confirmer,
    notifier: Option<Notifier>,
}

impl<'a> Deployer<'a> {
    pub fn new(
        platform: &'a dyn PlatformApi,
        executor: &'a dyn CommandExecutor,
        confirmer: &'a dyn Confirmer,
    ) -> Self {
        Self {
            platform,
            executor,
            confirmer,
            notifier: None,
        }
    }

    /// Send outcome notifications through `notifier`
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Promote code into `target`
    pub async fn run(&self, target: EnvironmentRef, options: &DeployOptions) -> DeploymentOutcome {
        let mut fsm = DeploymentFsm::new();
        let mut ctx = DeploymentContext::new(target, options);

        let outcome = match self.execute(&mut fsm, &mut ctx).await {
            Ok(()) => {
                info!("Deployment of {} completed.", ctx.transition());
                DeploymentOutcome::success(&options.deploy_message)
            }
            Err(e) if !e.is_fatal() => {
                info!("{} Target: {}.", e, ctx.target);
                enter(&mut fsm, DeploymentStage::Finished).ok();
                return DeploymentOutcome::nothing_to_deploy();
            }
            Err(e) => {
                fsm.fail(e.to_string());
                error!("Deployment failed during {:?}: {}", fsm.stage(), e);
                DeploymentOutcome::failure(e.to_string(), fsm.failed_stage())
            }
        };

        if enter(&mut fsm, DeploymentStage::Notify).is_ok() && options.notify {
            ctx.initiator = Some(self.initiator().await);
            self.notify(&ctx, &outcome).await;
        }
        enter(&mut fsm, DeploymentStage::Finished).ok();
        outcome
    }

    async fn execute(
        &self,
        fsm: &mut DeploymentFsm,
        ctx: &mut DeploymentContext<'_>,
    ) -> Result<(), DeployError> {
        enter(fsm, DeploymentStage::ValidateFrozen)?;
        self.validate_frozen(ctx).await?;

        enter(fsm, DeploymentStage::ResolveSource)?;
        ctx.source = Some(predecessor(ctx.target.stage)?);
        info!(
            "Deploying {} from {} to {}.",
            ctx.target.site,
            ctx.source.map(|s| s.as_str()).unwrap_or("?"),
            ctx.target.stage
        );

        enter(fsm, DeploymentStage::CheckDeployable)?;
        if !self.platform.has_deployable_code(&ctx.target).await? {
            return Err(DeployError::NoDeployableCode);
        }

        enter(fsm, DeploymentStage::CheckDrift)?;
        self.check_drift(ctx).await?;

        if ctx.options.with_backup {
            enter(fsm, DeploymentStage::Backup)?;
            self.backup(ctx).await?;
        }

        enter(fsm, DeploymentStage::Deploy)?;
        self.deploy(ctx).await?;

        if ctx.options.with_config_import {
            enter(fsm, DeploymentStage::ConfigImport)?;
            info!("Clearing Drupal cache on target environment.");
            self.drush(ctx, &["cache-rebuild"]).await?;
            info!("Importing configuration on target environment.");
            self.drush(ctx, &["config-import", "-y"]).await?;
        }

        if ctx.options.with_db_update {
            enter(fsm, DeploymentStage::DbUpdate)?;
            info!("Running database updates.");
            self.drush(ctx, &["updatedb", "-y"]).await?;
        }

        enter(fsm, DeploymentStage::CacheClear)?;
        info!("Clearing Drupal caches.");
        self.drush(ctx, &["cache-rebuild"]).await?;

        if ctx.options.clear_env_caches {
            enter(fsm, DeploymentStage::EnvCacheClear)?;
            let operation = self.platform.clear_environment_cache(&ctx.target).await?;
            self.await_operation(&operation, "Environment cache clear").await?;
            info!("Environment caches cleared on {}.", ctx.target.stage);
        }

        Ok(())
    }

    async fn validate_frozen(&self, ctx: &DeploymentContext<'_>) -> Result<(), DeployError> {
        if self.platform.is_frozen(&ctx.target).await? {
            return Err(DeployError::SiteFrozen(format!(
                "{} is frozen; unfreeze it before deploying.",
                ctx.target.site
            )));
        }
        Ok(())
    }

    async fn check_drift(&self, ctx: &DeploymentContext<'_>) -> Result<(), DeployError> {
        let checker = DriftChecker::new(self.executor);
        let result = checker.check_drift(&ctx.target).await?;
        if result.has_drift {
            error!(
                "There are configuration differences on the {} environment.",
                ctx.target.stage
            );
            if let Err(e) = checker.show_status(&ctx.target).await {
                warn!("Unable to show configuration status: {}", e);
            }
        }
        let gate = checker.gate(
            &ctx.target,
            &result,
            ctx.options.force_deploy,
            self.confirmer,
        )?;
        debug!("Drift gate passed: {:?}", gate);
        Ok(())
    }

    async fn backup(&self, ctx: &DeploymentContext<'_>) -> Result<(), DeployError> {
        let operation = self
            .platform
            .create_backup(&ctx.target, BackupElements::default())
            .await?;
        self.await_operation(&operation, "Backup").await?;
        info!("Created a backup of the {} environment.", ctx.target.stage);
        Ok(())
    }

    async fn deploy(&self, ctx: &DeploymentContext<'_>) -> Result<(), DeployError> {
        let annotation = ctx.options.deploy_message.as_str();
        let operation = if self.platform.is_initialized(&ctx.target).await? {
            let params = DeployParams {
                updatedb: false,
                annotation: annotation.to_string(),
            };
            self.platform.deploy(&ctx.target, &params).await?
        } else {
            info!("Initializing the {} environment.", ctx.target.stage);
            self.platform
                .initialize_bindings(&ctx.target, annotation)
                .await?
        };
        let result = self.await_operation(&operation, "Deploy").await?;
        info!("{}", result.message);
        Ok(())
    }

    async fn await_operation(
        &self,
        operation: &AsyncOperation,
        what: &str,
    ) -> Result<OperationResult, DeployError> {
        debug!("Waiting for {}: {}", what, operation.description);
        let result = self.platform.await_operation(operation).await?;
        if !result.succeeded {
            return Err(DeployError::DeployOperationFailed(format!(
                "{}: {}",
                what, result.message
            )));
        }
        Ok(result)
    }

    async fn drush(&self, ctx: &DeploymentContext<'_>, args: &[&str]) -> Result<(), DeployError> {
        let output = self.executor.execute(&ctx.target, DRUSH, args).await?;
        let stdout = output.stdout_lossy();
        if !stdout.trim().is_empty() {
            info!("{}", stdout.trim_end());
        }
        if !output.success() {
            return Err(DeployError::RemoteCommand(format!(
                "`{}` on {} exited with status {}: {}",
                command_line(DRUSH, args),
                ctx.target,
                output.exit_code,
                output.stderr_lossy().trim()
            )));
        }
        Ok(())
    }

    async fn initiator(&self) -> String {
        match self.platform.current_user_name().await {
            Ok(user) => user,
            Err(e) => {
                warn!("Unable to look up the current user: {}", e);
                "unknown".to_string()
            }
        }
    }

    async fn notify(&self, ctx: &DeploymentContext<'_>, outcome: &DeploymentOutcome) {
        let Some(notifier) = &self.notifier else {
            warn!("Notification requested but no webhook URL is configured.");
            return;
        };

        match outcome_message(ctx, outcome, notifier.context_link.as_deref()) {
            Ok(message) => {
                notifier
                    .dispatcher
                    .send(&message, &notifier.url, &notifier.policy)
                    .await;
            }
            Err(e) => error!("Unable to build notification: {}", e),
        }
    }
}

fn enter(fsm: &mut DeploymentFsm, stage: DeploymentStage) -> Result<(), DeployError> {
    fsm.advance(stage).map_err(DeployError::Internal)?;
    debug!("Entering stage {:?}", stage);
    Ok(())
}
