//! safe-deploy - Entry Point
//!
//! Promotes code between the dev, test and live environments of a site,
//! refusing to deploy over overridden configuration.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use safe_deploy::app::run::{check_and_deploy, check_config};
use safe_deploy::app::settings::Settings;
use safe_deploy::deploy::options::{DeployOptions, DEFAULT_DEPLOY_MESSAGE};
use safe_deploy::logs::{init_logging, LogLevel, LogOptions};
use safe_deploy::utils::version_info;

use tracing::error;
use tracing_appender::non_blocking::WorkerGuard;

/// safe-deploy CLI
#[derive(Parser)]
#[command(name = "safe-deploy")]
#[command(about = "Safely promote code between dev, test and live", long_about = None)]
#[command(version)]
struct Cli {
    /// Settings file (JSON)
    #[arg(short, long, env = "SAFE_DEPLOY_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Deploy code to <site>.<env> from the previous environment
    Deploy(DeployArgs),

    /// Check whether <site>.<env> has overridden configuration
    CheckConfig {
        /// Site and environment, e.g. mysite.test
        site_env: String,

        /// Only warn about overridden configuration
        #[arg(long)]
        no_throw: bool,
    },

    /// Print version and build information
    Version,
}

#[derive(Args)]
struct DeployArgs {
    /// Site and environment, e.g. mysite.test
    site_env: String,

    /// Deploy even when configuration is overridden on the target
    #[arg(long)]
    force_deploy: bool,

    /// Import configuration after the deploy
    #[arg(long)]
    with_cim: bool,

    /// Run database updates after the deploy
    #[arg(long)]
    with_updates: bool,

    /// Back up code and database before the deploy
    #[arg(long)]
    with_backup: bool,

    /// Clear the platform's environment caches after the deploy
    #[arg(long)]
    clear_env_caches: bool,

    /// Deploy note attached to the deployment
    #[arg(long, default_value = DEFAULT_DEPLOY_MESSAGE)]
    deploy_message: String,

    /// Notify Slack about success or failure
    #[arg(long, alias = "notify")]
    slack_alert: bool,

    /// Never prompt; overridden configuration aborts unless forced
    #[arg(short = 'n', long)]
    no_interaction: bool,
}

impl From<&DeployArgs> for DeployOptions {
    fn from(args: &DeployArgs) -> Self {
        DeployOptions {
            force_deploy: args.force_deploy,
            with_config_import: args.with_cim,
            with_db_update: args.with_updates,
            with_backup: args.with_backup,
            clear_env_caches: args.clear_env_caches,
            deploy_message: args.deploy_message.clone(),
            notify: args.slack_alert,
        }
    }
}

/// Load settings and initialize logging
async fn bootstrap(cli: &Cli) -> anyhow::Result<(Settings, Option<WorkerGuard>)> {
    let settings = Settings::load(cli.config.as_deref())
        .await
        .context("Unable to load settings")?;

    let log_options = LogOptions {
        log_level: cli.log_level.clone().unwrap_or_else(|| settings.log_level.clone()),
        log_file: settings.log_file.clone(),
        json_format: cli.log_json || settings.log_json,
    };
    let guard = init_logging(log_options).context("Failed to initialize logging")?;

    Ok((settings, guard))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("{}", e),
        }
        return ExitCode::SUCCESS;
    }

    let (settings, _log_guard) = match bootstrap(&cli).await {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Deploy(args) => {
            let interactive = !args.no_interaction && std::io::stdin().is_terminal();
            let outcome =
                check_and_deploy(&settings, &args.site_env, DeployOptions::from(&args), interactive)
                    .await;

            if outcome.succeeded {
                println!("{} {}", "✔".green().bold(), outcome.message);
            } else {
                println!("{} {}", "✘ Deployment failed:".red().bold(), outcome.message);
            }
            ExitCode::from(outcome.exit_code())
        }
        Commands::CheckConfig { site_env, no_throw } => {
            match check_config(&settings, &site_env, !no_throw).await {
                Ok(result) if result.has_drift => {
                    println!("{}", "⚠ Configuration is overridden on the target.".yellow());
                    ExitCode::SUCCESS
                }
                Ok(_) => {
                    println!("{}", "✔ Configuration is in sync.".green());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!("{}", e);
                    println!("{} {}", "✘".red().bold(), e);
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Version => ExitCode::SUCCESS,
    }
}
