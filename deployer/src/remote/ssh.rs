//! SSH command executor

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::deploy::environment::EnvironmentRef;
use crate::errors::DeployError;
use crate::platform::client::PlatformClient;
use crate::remote::{command_line, CommandExecutor, CommandOutput};

/// Connection details of an environment's application server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub username: String,
    pub host: String,
    pub port: u16,
}

impl ConnectionInfo {
    pub fn for_environment(site_id: &str, env: &EnvironmentRef, port: u16) -> Self {
        Self {
            username: format!("{}.{}", env.stage, site_id),
            host: format!("appserver.{}.{}.drush.in", env.stage, site_id),
            port,
        }
    }
}

/// Quote an argument for the remote POSIX shell
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_=./:@,+".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Runs commands on the application server over SSH
pub struct SshExecutor {
    ssh_command: String,
    port: u16,
    platform: Arc<PlatformClient>,
}

impl SshExecutor {
    pub fn new(ssh_command: &str, port: u16, platform: Arc<PlatformClient>) -> Self {
        Self {
            ssh_command: ssh_command.to_string(),
            port,
            platform,
        }
    }

    /// Build the local ssh invocation for a remote command line
    pub fn ssh_args(&self, connection: &ConnectionInfo, remote: &str) -> Vec<String> {
        let mut args: Vec<String> = self
            .ssh_command
            .split_whitespace()
            .skip(1)
            .map(str::to_string)
            .collect();
        args.extend([
            "-T".to_string(),
            format!("{}@{}", connection.username, connection.host),
            "-p".to_string(),
            connection.port.to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "AddressFamily=inet".to_string(),
            remote.to_string(),
        ]);
        args
    }
}

#[async_trait]
impl CommandExecutor for SshExecutor {
    async fn execute(
        &self,
        env: &EnvironmentRef,
        command: &str,
        args: &[&str],
    ) -> Result<CommandOutput, DeployError> {
        let site_id = self.platform.site_id(&env.site).await?;
        let connection = ConnectionInfo::for_environment(&site_id, env, self.port);

        let remote = std::iter::once(command)
            .chain(args.iter().copied())
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ");
        debug!("shell command on {}: {}", env, command_line(command, args));

        let program = self
            .ssh_command
            .split_whitespace()
            .next()
            .unwrap_or("ssh");
        let output = Command::new(program)
            .args(self.ssh_args(&connection, &remote))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                DeployError::RemoteCommand(format!("Failed to run {}: {}", program, e))
            })?;

        Ok(CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}
