//! Platform workflows and environment queries

use async_trait::async_trait;
use platform_models::{Commit, SiteInfo, UserInfo, WorkflowInfo, WorkflowRequest};
use serde_json::json;
use tracing::debug;

use crate::deploy::environment::{predecessor, EnvironmentRef, PipelineStage};
use crate::errors::DeployError;
use crate::platform::client::PlatformClient;
use crate::platform::{
    AsyncOperation, BackupElements, DeployParams, OperationResult, PlatformApi,
};

impl PlatformClient {
    /// Get site info
    pub async fn site(&self, env: &EnvironmentRef) -> Result<SiteInfo, DeployError> {
        let site_id = self.site_id(&env.site).await?;
        self.get(&format!("/sites/{}", site_id)).await
    }

    /// Get the code log of an environment
    pub async fn commits(&self, env: &EnvironmentRef) -> Result<Vec<Commit>, DeployError> {
        let site_id = self.site_id(&env.site).await?;
        self.get(&format!(
            "/sites/{}/environments/{}/code-log",
            site_id, env.stage
        ))
        .await
    }

    /// Start a workflow on an environment
    pub async fn create_workflow(
        &self,
        env: &EnvironmentRef,
        workflow_type: &str,
        params: serde_json::Value,
    ) -> Result<AsyncOperation, DeployError> {
        let site_id = self.site_id(&env.site).await?;
        let request = WorkflowRequest {
            workflow_type: workflow_type.to_string(),
            params,
        };
        let workflow: WorkflowInfo = self
            .post(
                &format!("/sites/{}/environments/{}/workflows", site_id, env.stage),
                &request,
            )
            .await?;
        debug!("Started {} workflow {} on {}", workflow_type, workflow.id, env);

        Ok(AsyncOperation {
            id: workflow.id,
            site_id,
            description: workflow
                .active_description
                .unwrap_or_else(|| format!("{} on {}", workflow_type, env)),
        })
    }

    /// Get the current state of a workflow
    pub async fn workflow(&self, site_id: &str, workflow_id: &str) -> Result<WorkflowInfo, DeployError> {
        self.get(&format!("/sites/{}/workflows/{}", site_id, workflow_id))
            .await
    }
}

/// Commits in the parent environment that the target has not received
fn count_deployable_commits(
    parent_commits: &[Commit],
    parent: PipelineStage,
    target: PipelineStage,
) -> usize {
    parent_commits
        .iter()
        .filter(|c| {
            c.labels.iter().any(|l| l == parent.as_str())
                && !c.labels.iter().any(|l| l == target.as_str())
        })
        .count()
}

fn operation_result(workflow: &WorkflowInfo) -> OperationResult {
    let succeeded = workflow.is_successful();
    let message = if succeeded {
        workflow.active_description.clone()
    } else {
        workflow
            .final_task
            .as_ref()
            .and_then(|t| t.reason.clone())
            .or_else(|| workflow.active_description.clone())
    };

    OperationResult {
        succeeded,
        message: message.unwrap_or_else(|| {
            format!(
                "Workflow {} finished with result {}",
                workflow.id,
                workflow.result.as_deref().unwrap_or("unknown")
            )
        }),
    }
}

#[async_trait]
impl PlatformApi for PlatformClient {
    async fn is_frozen(&self, env: &EnvironmentRef) -> Result<bool, DeployError> {
        Ok(self.site(env).await?.frozen)
    }

    async fn has_deployable_code(&self, env: &EnvironmentRef) -> Result<bool, DeployError> {
        let parent = predecessor(env.stage)?;
        let commits = self.commits(&env.with_stage(parent)).await?;
        let count = count_deployable_commits(&commits, parent, env.stage);
        debug!("{} deployable commits from {} to {}", count, parent, env.stage);
        Ok(count > 0)
    }

    async fn is_initialized(&self, env: &EnvironmentRef) -> Result<bool, DeployError> {
        // Only environments downstream of dev start out empty
        if env.stage == PipelineStage::Dev {
            return Ok(true);
        }
        Ok(!self.commits(env).await?.is_empty())
    }

    async fn deploy(
        &self,
        env: &EnvironmentRef,
        params: &DeployParams,
    ) -> Result<AsyncOperation, DeployError> {
        self.create_workflow(
            env,
            "deploy",
            json!({
                "updatedb": params.updatedb,
                "annotation": params.annotation,
            }),
        )
        .await
    }

    async fn initialize_bindings(
        &self,
        env: &EnvironmentRef,
        annotation: &str,
    ) -> Result<AsyncOperation, DeployError> {
        let from = predecessor(env.stage)?;
        self.create_workflow(
            env,
            "create_environment",
            json!({
                "annotation": annotation,
                "clone_database": { "from_environment": from.as_str() },
                "clone_files": { "from_environment": from.as_str() },
            }),
        )
        .await
    }

    async fn create_backup(
        &self,
        env: &EnvironmentRef,
        elements: BackupElements,
    ) -> Result<AsyncOperation, DeployError> {
        self.create_workflow(
            env,
            "do_export",
            json!({
                "code": elements.code,
                "database": elements.database,
                "files": elements.files,
                "entry_type": "backup",
            }),
        )
        .await
    }

    async fn clear_environment_cache(
        &self,
        env: &EnvironmentRef,
    ) -> Result<AsyncOperation, DeployError> {
        self.create_workflow(env, "clear_cache", json!({ "framework_cache": true }))
            .await
    }

    async fn await_operation(
        &self,
        operation: &AsyncOperation,
    ) -> Result<OperationResult, DeployError> {
        loop {
            let workflow = self.workflow(&operation.site_id, &operation.id).await?;
            if workflow.is_finished() {
                return Ok(operation_result(&workflow));
            }
            debug!("Waiting for workflow: {}", operation.description);
            tokio::time::sleep(self.poll_interval()).await;
        }
    }

    async fn current_user_name(&self) -> Result<String, DeployError> {
        let user_id = self.user_id().await?;
        let user: UserInfo = self.get(&format!("/users/{}", user_id)).await?;
        Ok(user.display_name().unwrap_or(user_id))
    }
}
