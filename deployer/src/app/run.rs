//! Command entry points

use std::sync::Arc;

use secrecy::SecretString;
use tracing::{error, info, warn};

use crate::app::settings::Settings;
use crate::deploy::confirm::{Confirmer, NonInteractive, PromptConfirmer};
use crate::deploy::drift::{self, ConfigDriftResult};
use crate::deploy::environment::EnvironmentRef;
use crate::deploy::options::DeployOptions;
use crate::deploy::orchestrator::{Deployer, DeploymentOutcome, Notifier};
use crate::errors::DeployError;
use crate::notify::dispatcher::Dispatcher;
use crate::notify::transport::ReqwestTransport;
use crate::platform::client::PlatformClient;
use crate::remote::ssh::SshExecutor;

/// Create the platform client from settings
pub fn platform_client(settings: &Settings) -> Result<Arc<PlatformClient>, DeployError> {
    let token = settings.platform.machine_token.clone().ok_or_else(|| {
        DeployError::Config(
            "No machine token configured. Set TERMINUS_MACHINE_TOKEN or platform.machine_token."
                .to_string(),
        )
    })?;
    let client = PlatformClient::new(
        &settings.platform.base_url,
        SecretString::from(token),
        settings.platform.poll_interval(),
    )?;
    Ok(Arc::new(client))
}

/// Create the outcome notifier, if a usable webhook is configured
pub fn notifier(settings: &Settings) -> Option<Notifier> {
    let notification = &settings.notification;
    let url = notification.webhook_url.as_deref()?;
    if let Err(e) = url::Url::parse(url) {
        warn!("Ignoring invalid webhook URL: {}", e);
        return None;
    }

    let transport = match ReqwestTransport::new() {
        Ok(transport) => transport,
        Err(e) => {
            error!("Unable to create the webhook transport: {}", e);
            return None;
        }
    };

    Some(Notifier {
        dispatcher: Dispatcher::new(Arc::new(transport)).with_timeout(notification.timeout()),
        url: url.to_string(),
        context_link: notification.context_link.clone(),
        policy: notification.retry_policy(),
    })
}

/// Promote code into `site_dot_env`
pub async fn check_and_deploy(
    settings: &Settings,
    site_dot_env: &str,
    options: DeployOptions,
    interactive: bool,
) -> DeploymentOutcome {
    let options = options.validated();

    // Reject unknown environments before talking to the platform
    let target: EnvironmentRef = match site_dot_env.parse() {
        Ok(target) => target,
        Err(e) => return DeploymentOutcome::failure(e.to_string(), None),
    };
    let platform = match platform_client(settings) {
        Ok(platform) => platform,
        Err(e) => return DeploymentOutcome::failure(e.to_string(), None),
    };
    let executor = SshExecutor::new(&settings.ssh.command, settings.ssh.port, platform.clone());
    let confirmer: Box<dyn Confirmer> = if interactive {
        Box::new(PromptConfirmer)
    } else {
        Box::new(NonInteractive)
    };

    let mut deployer = Deployer::new(platform.as_ref(), &executor, confirmer.as_ref());
    if options.notify {
        match notifier(settings) {
            Some(notifier) => deployer = deployer.with_notifier(notifier),
            None => warn!("Notifications requested but SLACK_URL is not set."),
        }
    }

    info!("Starting deployment to {}", target);
    deployer.run(target, &options).await
}

/// Report whether deploying to `site_dot_env` is safe
pub async fn check_config(
    settings: &Settings,
    site_dot_env: &str,
    throw_on_drift: bool,
) -> Result<ConfigDriftResult, DeployError> {
    let target: EnvironmentRef = site_dot_env.parse()?;
    let platform = platform_client(settings)?;
    let executor = SshExecutor::new(&settings.ssh.command, settings.ssh.port, platform.clone());

    drift::check_config(platform.as_ref(), &executor, &target, throw_on_drift).await
}
