//! Orchestrator unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use safe_deploy::deploy::confirm::Confirmer;
use safe_deploy::deploy::drift::{check_config, DriftChecker, DRIFT_ABORT_REASON};
use safe_deploy::deploy::environment::{EnvironmentRef, PipelineStage};
use safe_deploy::deploy::fsm::DeploymentStage;
use safe_deploy::deploy::options::DeployOptions;
use safe_deploy::deploy::orchestrator::{Deployer, Notifier};
use safe_deploy::errors::DeployError;
use safe_deploy::notify::dispatcher::{TransportError, WebhookTransport};
use safe_deploy::notify::{Dispatcher, RetryPolicy, MAX_TEXT_LEN};
use safe_deploy::platform::{
    AsyncOperation, BackupElements, DeployParams, OperationResult, PlatformApi,
};
use safe_deploy::remote::{command_line, CommandExecutor, CommandOutput};

const DRIFT: &str = r#"{"system.site":{"name":"system.site","state":"Different"}}"#;

#[derive(Default)]
struct MockPlatform {
    frozen: bool,
    deployable: bool,
    uninitialized: bool,
    failing_operation: Option<&'static str>,
    calls: Mutex<Vec<String>>,
}

impl MockPlatform {
    fn deployable() -> Self {
        Self {
            deployable: true,
            ..Default::default()
        }
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn position(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    fn operation(&self, id: &str) -> AsyncOperation {
        AsyncOperation {
            id: id.to_string(),
            site_id: "site-id".to_string(),
            description: format!("{} workflow", id),
        }
    }
}

#[async_trait]
impl PlatformApi for MockPlatform {
    async fn is_frozen(&self, _env: &EnvironmentRef) -> Result<bool, DeployError> {
        self.record("is_frozen");
        Ok(self.frozen)
    }

    async fn has_deployable_code(&self, _env: &EnvironmentRef) -> Result<bool, DeployError> {
        self.record("has_deployable_code");
        Ok(self.deployable)
    }

    async fn is_initialized(&self, _env: &EnvironmentRef) -> Result<bool, DeployError> {
        self.record("is_initialized");
        Ok(!self.uninitialized)
    }

    async fn deploy(
        &self,
        _env: &EnvironmentRef,
        params: &DeployParams,
    ) -> Result<AsyncOperation, DeployError> {
        self.record(format!("deploy updatedb={} annotation={}", params.updatedb, params.annotation));
        Ok(self.operation("deploy"))
    }

    async fn initialize_bindings(
        &self,
        _env: &EnvironmentRef,
        annotation: &str,
    ) -> Result<AsyncOperation, DeployError> {
        self.record(format!("initialize_bindings annotation={}", annotation));
        Ok(self.operation("initialize"))
    }

    async fn create_backup(
        &self,
        _env: &EnvironmentRef,
        elements: BackupElements,
    ) -> Result<AsyncOperation, DeployError> {
        assert_eq!(elements, BackupElements::default());
        self.record("create_backup");
        Ok(self.operation("backup"))
    }

    async fn clear_environment_cache(
        &self,
        _env: &EnvironmentRef,
    ) -> Result<AsyncOperation, DeployError> {
        self.record("clear_environment_cache");
        Ok(self.operation("clear_cache"))
    }

    async fn await_operation(
        &self,
        operation: &AsyncOperation,
    ) -> Result<OperationResult, DeployError> {
        self.record(format!("await {}", operation.id));
        let succeeded = self.failing_operation != Some(operation.id.as_str());
        Ok(OperationResult {
            succeeded,
            message: if succeeded {
                format!("{} finished", operation.id)
            } else {
                format!("{} blew up", operation.id)
            },
        })
    }

    async fn current_user_name(&self) -> Result<String, DeployError> {
        Ok("Jo Doe".to_string())
    }
}

struct MockExecutor {
    status_json: String,
    failing_command: Option<&'static str>,
    failure_stderr: String,
    calls: Mutex<Vec<String>>,
}

impl MockExecutor {
    fn clean() -> Self {
        Self::with_status("[]")
    }

    fn with_status(status_json: &str) -> Self {
        Self {
            status_json: status_json.to_string(),
            failing_command: None,
            failure_stderr: "boom".to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, line: &str) -> usize {
        self.calls().iter().filter(|c| *c == line).count()
    }
}

#[async_trait]
impl CommandExecutor for MockExecutor {
    async fn execute(
        &self,
        _env: &EnvironmentRef,
        command: &str,
        args: &[&str],
    ) -> Result<CommandOutput, DeployError> {
        let line = command_line(command, args);
        self.calls.lock().unwrap().push(line.clone());

        if self.failing_command == Some(line.as_str()) {
            return Ok(CommandOutput {
                stderr: self.failure_stderr.clone().into_bytes(),
                exit_code: 1,
                ..Default::default()
            });
        }
        let stdout = if line == "drush config:status --format=json" {
            self.status_json.clone()
        } else {
            String::new()
        };
        Ok(CommandOutput {
            stdout: stdout.into_bytes(),
            ..Default::default()
        })
    }
}

struct Answer {
    yes: bool,
    asked: AtomicUsize,
}

impl Answer {
    fn new(yes: bool) -> Self {
        Self {
            yes,
            asked: AtomicUsize::new(0),
        }
    }

    fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

impl Confirmer for Answer {
    fn confirm(&self, _prompt: &str) -> Result<bool, DeployError> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.yes)
    }
}

#[derive(Default)]
struct RecordingTransport {
    payloads: Mutex<Vec<String>>,
}

impl RecordingTransport {
    fn payloads(&self) -> Vec<String> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookTransport for RecordingTransport {
    async fn post(&self, _url: &str, payload: &str, _timeout: Duration) -> Result<String, TransportError> {
        self.payloads.lock().unwrap().push(payload.to_string());
        Ok("ok".to_string())
    }
}

fn notifier(transport: Arc<RecordingTransport>) -> Notifier {
    Notifier {
        dispatcher: Dispatcher::new(transport),
        url: "https://hooks.example.com/T1/B2".to_string(),
        context_link: None,
        policy: RetryPolicy::default(),
    }
}

fn live() -> EnvironmentRef {
    EnvironmentRef::new("mysite", PipelineStage::Live)
}

#[tokio::test]
async fn test_nothing_to_deploy_is_a_successful_no_op() {
    let platform = MockPlatform::default();
    let executor = MockExecutor::clean();
    let confirmer = Answer::new(true);
    let transport = Arc::new(RecordingTransport::default());
    let options = DeployOptions {
        with_backup: true,
        notify: true,
        ..Default::default()
    };

    let outcome = Deployer::new(&platform, &executor, &confirmer)
        .with_notifier(notifier(transport.clone()))
        .run(live(), &options)
        .await;

    assert!(outcome.succeeded);
    assert!(outcome.no_op);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(platform.calls(), vec!["is_frozen", "has_deployable_code"]);
    assert!(executor.calls().is_empty());
    assert!(transport.payloads().is_empty());
}

#[tokio::test]
async fn test_drift_without_force_or_confirmation_aborts() {
    let platform = MockPlatform::deployable();
    let executor = MockExecutor::with_status(DRIFT);
    let confirmer = Answer::new(false);

    let outcome = Deployer::new(&platform, &executor, &confirmer)
        .run(live(), &DeployOptions::default())
        .await;

    assert!(!outcome.succeeded);
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(outcome.failure_reason.as_deref(), Some(DRIFT_ABORT_REASON));
    assert_eq!(outcome.failed_stage, Some(DeploymentStage::CheckDrift));
    assert_eq!(confirmer.asked(), 1);
    assert!(!platform.calls().iter().any(|c| c.starts_with("deploy")));
    // The human readable status is shown before giving up
    assert_eq!(executor.count("drush config:status"), 1);
}

#[tokio::test]
async fn test_forced_deploy_proceeds_despite_drift() {
    let platform = MockPlatform::deployable();
    let executor = MockExecutor::with_status(DRIFT);
    let confirmer = Answer::new(false);
    let options = DeployOptions {
        force_deploy: true,
        deploy_message: "Release 42".to_string(),
        ..Default::default()
    };

    let outcome = Deployer::new(&platform, &executor, &confirmer)
        .run(live(), &options)
        .await;

    assert!(outcome.succeeded);
    assert_eq!(outcome.message, "Release 42");
    assert_eq!(confirmer.asked(), 0);
    assert!(platform
        .position("deploy updatedb=false annotation=Release 42")
        .is_some());
}

#[tokio::test]
async fn test_confirmed_drift_proceeds() {
    let platform = MockPlatform::deployable();
    let executor = MockExecutor::with_status(DRIFT);
    let confirmer = Answer::new(true);

    let outcome = Deployer::new(&platform, &executor, &confirmer)
        .run(live(), &DeployOptions::default())
        .await;

    assert!(outcome.succeeded);
    assert_eq!(confirmer.asked(), 1);
    assert!(platform.position("await deploy").is_some());
}

#[tokio::test]
async fn test_backup_completes_before_deploy() {
    let platform = MockPlatform::deployable();
    let executor = MockExecutor::clean();
    let confirmer = Answer::new(false);
    let options = DeployOptions {
        with_backup: true,
        ..Default::default()
    };

    let outcome = Deployer::new(&platform, &executor, &confirmer)
        .run(live(), &options)
        .await;
    assert!(outcome.succeeded);

    let backup = platform.position("create_backup").unwrap();
    let backup_done = platform.position("await backup").unwrap();
    let deploy = platform
        .calls()
        .iter()
        .position(|c| c.starts_with("deploy"))
        .unwrap();
    assert!(backup < backup_done);
    assert!(backup_done < deploy);
}

#[tokio::test]
async fn test_failed_backup_stops_the_run() {
    let platform = MockPlatform {
        failing_operation: Some("backup"),
        ..MockPlatform::deployable()
    };
    let executor = MockExecutor::clean();
    let confirmer = Answer::new(false);
    let options = DeployOptions {
        with_backup: true,
        ..Default::default()
    };

    let outcome = Deployer::new(&platform, &executor, &confirmer)
        .run(live(), &options)
        .await;

    assert!(!outcome.succeeded);
    assert_eq!(outcome.failed_stage, Some(DeploymentStage::Backup));
    assert!(!platform.calls().iter().any(|c| c.starts_with("deploy")));
}

#[tokio::test]
async fn test_cache_rebuild_runs_once_after_maintenance_steps() {
    let platform = MockPlatform::deployable();
    let executor = MockExecutor::clean();
    let confirmer = Answer::new(false);
    let options = DeployOptions {
        with_config_import: true,
        with_db_update: true,
        ..Default::default()
    };

    let outcome = Deployer::new(&platform, &executor, &confirmer)
        .run(live(), &options)
        .await;
    assert!(outcome.succeeded);

    assert_eq!(
        executor.calls(),
        vec![
            "drush config:status --format=json",
            "drush cache-rebuild",
            "drush config-import -y",
            "drush updatedb -y",
            "drush cache-rebuild",
        ]
    );
}

#[tokio::test]
async fn test_cache_rebuild_runs_without_optional_steps() {
    let platform = MockPlatform::deployable();
    let executor = MockExecutor::clean();
    let confirmer = Answer::new(false);

    let outcome = Deployer::new(&platform, &executor, &confirmer)
        .run(live(), &DeployOptions::default())
        .await;

    assert!(outcome.succeeded);
    assert_eq!(executor.count("drush cache-rebuild"), 1);
    assert_eq!(executor.count("drush updatedb -y"), 0);
    assert!(platform.position("clear_environment_cache").is_none());
}

#[tokio::test]
async fn test_environment_cache_clear_is_awaited() {
    let platform = MockPlatform::deployable();
    let executor = MockExecutor::clean();
    let confirmer = Answer::new(false);
    let options = DeployOptions {
        clear_env_caches: true,
        ..Default::default()
    };

    let outcome = Deployer::new(&platform, &executor, &confirmer)
        .run(live(), &options)
        .await;

    assert!(outcome.succeeded);
    let calls = platform.calls();
    assert_eq!(
        &calls[calls.len() - 2..],
        &["clear_environment_cache", "await clear_cache"]
    );
}

#[tokio::test]
async fn test_uninitialized_target_is_initialized() {
    let platform = MockPlatform {
        uninitialized: true,
        ..MockPlatform::deployable()
    };
    let executor = MockExecutor::clean();
    let confirmer = Answer::new(false);

    let outcome = Deployer::new(&platform, &executor, &confirmer)
        .run(
            EnvironmentRef::new("mysite", PipelineStage::Test),
            &DeployOptions::default(),
        )
        .await;

    assert!(outcome.succeeded);
    assert!(platform
        .position("initialize_bindings annotation=Deploy from safe-deploy")
        .is_some());
    assert!(!platform.calls().iter().any(|c| c.starts_with("deploy")));
}

#[tokio::test]
async fn test_failed_deploy_skips_maintenance_and_notifies() {
    let platform = MockPlatform {
        failing_operation: Some("deploy"),
        ..MockPlatform::deployable()
    };
    let executor = MockExecutor::clean();
    let confirmer = Answer::new(false);
    let transport = Arc::new(RecordingTransport::default());
    let options = DeployOptions {
        with_db_update: true,
        notify: true,
        ..Default::default()
    };

    let outcome = Deployer::new(&platform, &executor, &confirmer)
        .with_notifier(notifier(transport.clone()))
        .run(live(), &options)
        .await;

    assert!(!outcome.succeeded);
    assert_eq!(outcome.failed_stage, Some(DeploymentStage::Deploy));
    assert_eq!(
        outcome.failure_reason.as_deref(),
        Some("Deploy operation failed: Deploy: deploy blew up")
    );
    assert_eq!(executor.count("drush cache-rebuild"), 0);

    let payloads = transport.payloads();
    assert_eq!(payloads.len(), 1);
    assert!(payloads[0].contains("Deployment failed: *mysite* - test ➤ live"));
    assert!(payloads[0].contains("deploy blew up"));
}

#[tokio::test]
async fn test_failed_maintenance_command_fails_the_run() {
    let platform = MockPlatform::deployable();
    let executor = MockExecutor {
        failing_command: Some("drush updatedb -y"),
        ..MockExecutor::clean()
    };
    let confirmer = Answer::new(false);
    let options = DeployOptions {
        with_db_update: true,
        ..Default::default()
    };

    let outcome = Deployer::new(&platform, &executor, &confirmer)
        .run(live(), &options)
        .await;

    assert!(!outcome.succeeded);
    assert_eq!(outcome.failed_stage, Some(DeploymentStage::DbUpdate));
    assert_eq!(executor.count("drush cache-rebuild"), 0);
}

#[tokio::test]
async fn test_frozen_site_fails_and_notifies() {
    let platform = MockPlatform {
        frozen: true,
        ..MockPlatform::deployable()
    };
    let executor = MockExecutor::clean();
    let confirmer = Answer::new(false);
    let transport = Arc::new(RecordingTransport::default());
    let options = DeployOptions {
        notify: true,
        ..Default::default()
    };

    let outcome = Deployer::new(&platform, &executor, &confirmer)
        .with_notifier(notifier(transport.clone()))
        .run(live(), &options)
        .await;

    assert!(!outcome.succeeded);
    assert_eq!(outcome.failed_stage, Some(DeploymentStage::ValidateFrozen));
    assert_eq!(platform.calls(), vec!["is_frozen"]);
    assert_eq!(transport.payloads().len(), 1);
}

#[tokio::test]
async fn test_initial_stage_has_no_source() {
    let platform = MockPlatform::deployable();
    let executor = MockExecutor::clean();
    let confirmer = Answer::new(false);

    let outcome = Deployer::new(&platform, &executor, &confirmer)
        .run(
            EnvironmentRef::new("mysite", PipelineStage::Dev),
            &DeployOptions::default(),
        )
        .await;

    assert!(!outcome.succeeded);
    assert_eq!(outcome.failed_stage, Some(DeploymentStage::ResolveSource));
    assert!(platform.position("has_deployable_code").is_none());
}

#[tokio::test]
async fn test_success_notification_content() {
    let platform = MockPlatform::deployable();
    let executor = MockExecutor::clean();
    let confirmer = Answer::new(false);
    let transport = Arc::new(RecordingTransport::default());
    let options = DeployOptions {
        notify: true,
        deploy_message: "Release 42".to_string(),
        ..Default::default()
    };

    let outcome = Deployer::new(&platform, &executor, &confirmer)
        .with_notifier(notifier(transport.clone()))
        .run(live(), &options)
        .await;
    assert!(outcome.succeeded);

    let payloads = transport.payloads();
    assert_eq!(payloads.len(), 1);
    let payload: serde_json::Value = serde_json::from_str(&payloads[0]).unwrap();
    let blocks = payload["blocks"].as_array().unwrap();
    assert_eq!(
        blocks[0]["elements"][0]["text"],
        "✅ Deployment completed: *mysite* - test ➤ live"
    );
    assert_eq!(blocks[1]["text"]["text"], "Message: `Release 42`");
    assert_eq!(blocks[2]["type"], "divider");
    assert_eq!(blocks[3]["elements"][0]["text"], "Initiated by: Jo Doe");
}

#[tokio::test]
async fn test_notification_disabled_sends_nothing() {
    let platform = MockPlatform::deployable();
    let executor = MockExecutor::clean();
    let confirmer = Answer::new(false);
    let transport = Arc::new(RecordingTransport::default());

    let outcome = Deployer::new(&platform, &executor, &confirmer)
        .with_notifier(notifier(transport.clone()))
        .run(live(), &DeployOptions::default())
        .await;

    assert!(outcome.succeeded);
    assert!(transport.payloads().is_empty());
}

#[tokio::test]
async fn test_drift_check_is_repeatable() {
    let executor = MockExecutor::with_status(DRIFT);
    let checker = DriftChecker::new(&executor);

    let first = checker.check_drift(&live()).await.unwrap();
    let second = checker.check_drift(&live()).await.unwrap();

    assert!(first.has_drift);
    assert_eq!(first.has_drift, second.has_drift);
}

#[tokio::test]
async fn test_malformed_status_output_is_fatal() {
    let platform = MockPlatform::deployable();
    let executor = MockExecutor::with_status("Command config:status not found");
    let confirmer = Answer::new(true);

    let outcome = Deployer::new(&platform, &executor, &confirmer)
        .run(live(), &DeployOptions::default())
        .await;

    assert!(!outcome.succeeded);
    assert_eq!(outcome.failed_stage, Some(DeploymentStage::CheckDrift));
    assert!(outcome.message.starts_with("Remote command error"));
    assert_eq!(confirmer.asked(), 0);
}

#[tokio::test]
async fn test_long_failure_output_still_notifies() {
    let platform = MockPlatform::deployable();
    let executor = MockExecutor {
        failing_command: Some("drush config-import -y"),
        failure_stderr: "E".repeat(4000),
        ..MockExecutor::clean()
    };
    let confirmer = Answer::new(false);
    let transport = Arc::new(RecordingTransport::default());
    let options = DeployOptions {
        with_config_import: true,
        notify: true,
        ..Default::default()
    };

    let outcome = Deployer::new(&platform, &executor, &confirmer)
        .with_notifier(notifier(transport.clone()))
        .run(live(), &options)
        .await;

    assert!(!outcome.succeeded);
    assert!(outcome.failure_reason.as_ref().unwrap().len() > MAX_TEXT_LEN);

    let payloads = transport.payloads();
    assert_eq!(payloads.len(), 1);
    let payload: serde_json::Value = serde_json::from_str(&payloads[0]).unwrap();
    let reason = payload["blocks"][1]["text"]["text"].as_str().unwrap();
    assert_eq!(reason.chars().count(), MAX_TEXT_LEN);
    assert!(reason.starts_with("Reason: `Remote command error"));
    assert!(reason.ends_with("…`"));
}

#[tokio::test]
async fn test_long_deploy_message_still_notifies() {
    let platform = MockPlatform::deployable();
    let executor = MockExecutor::clean();
    let confirmer = Answer::new(false);
    let transport = Arc::new(RecordingTransport::default());
    let options = DeployOptions {
        notify: true,
        deploy_message: "m".repeat(MAX_TEXT_LEN),
        ..Default::default()
    };

    let outcome = Deployer::new(&platform, &executor, &confirmer)
        .with_notifier(notifier(transport.clone()))
        .run(live(), &options)
        .await;

    assert!(outcome.succeeded);
    assert_eq!(transport.payloads().len(), 1);
}

#[tokio::test]
async fn test_check_config_rejects_frozen_site() {
    let platform = MockPlatform {
        frozen: true,
        ..Default::default()
    };
    let executor = MockExecutor::with_status(DRIFT);

    let result = check_config(&platform, &executor, &live(), true).await;

    assert!(matches!(result, Err(DeployError::SiteFrozen(_))));
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn test_check_config_throws_on_drift() {
    let platform = MockPlatform::default();
    let executor = MockExecutor::with_status(DRIFT);

    let result = check_config(&platform, &executor, &live(), true).await;

    match result {
        Err(DeployError::ConfigurationDrift(reason)) => assert_eq!(reason, DRIFT_ABORT_REASON),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_check_config_flags_drift_as_safe() {
    let platform = MockPlatform::default();
    let executor = MockExecutor::with_status(DRIFT);

    let result = check_config(&platform, &executor, &live(), false).await.unwrap();

    assert!(result.has_drift);
    assert_eq!(result.raw_diff["system.site"]["state"], "Different");
    assert_eq!(executor.count("drush config:status"), 1);
}

#[tokio::test]
async fn test_check_config_in_sync() {
    let platform = MockPlatform::default();
    let executor = MockExecutor::clean();

    let result = check_config(&platform, &executor, &live(), true).await.unwrap();

    assert!(!result.has_drift);
    assert_eq!(executor.calls(), vec!["drush config:status --format=json"]);
}
