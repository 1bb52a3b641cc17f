//! Remote command execution against an environment

pub mod ssh;

use async_trait::async_trait;

use crate::deploy::environment::EnvironmentRef;
use crate::errors::DeployError;

/// Output of a finished remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Render a command line for log and error messages
pub fn command_line(command: &str, args: &[&str]) -> String {
    std::iter::once(command)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs named maintenance commands on an environment
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `command` with `args` and capture its output
    async fn execute(
        &self,
        env: &EnvironmentRef,
        command: &str,
        args: &[&str],
    ) -> Result<CommandOutput, DeployError>;

    /// Run a command that supports `--format=json` and parse its output.
    ///
    /// A non-zero exit status or output that is not JSON is an error.
    async fn execute_json(
        &self,
        env: &EnvironmentRef,
        command: &str,
        args: &[&str],
    ) -> Result<serde_json::Value, DeployError> {
        let mut args = args.to_vec();
        if !args.iter().any(|a| a.starts_with("--format")) {
            args.push("--format=json");
        }
        let line = command_line(command, &args);

        let output = self.execute(env, command, &args).await?;
        if !output.success() {
            return Err(DeployError::RemoteCommand(format!(
                "`{}` on {} exited with status {}: {}",
                line,
                env,
                output.exit_code,
                output.stderr_lossy().trim()
            )));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            DeployError::RemoteCommand(format!(
                "Output of `{}` on {} is not valid JSON: {}",
                line, env, e
            ))
        })
    }
}
