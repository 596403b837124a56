use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use qhse_notify::auth::{LocalStorageFile, StaticToken, TokenSource};
use qhse_notify::logging::{LoggingOptions, init_logging};
use qhse_notify::{EngineConfig, Notification, NotificationService, SideChannelOutcome};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the QHSE API
    #[arg(long, env = "QHSE_API_URL")]
    api_url: Option<String>,

    /// Evaluate against the built-in mock snapshot instead of the API
    #[arg(long)]
    mock: bool,

    /// Bearer token (takes precedence over the token file)
    #[arg(long, env = "QHSE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Local storage file holding the bearer token under the "token" key
    #[arg(long, env = "QHSE_TOKEN_FILE")]
    token_file: Option<PathBuf>,

    /// Print notifications as JSON
    #[arg(long)]
    json: bool,

    /// Log filter directive (e.g. "qhse_notify=debug")
    #[arg(long)]
    log_filter: Option<String>,

    /// Directory for daily rolling log files
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Emit console logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the dashboard and print notifications until interrupted
    Watch {
        /// Polling interval in milliseconds
        #[arg(long, env = "QHSE_POLL_INTERVAL_MS")]
        interval_ms: Option<u64>,
    },
    /// Evaluate the current dashboard once
    Once,
    /// List the notification rules
    Rules,
    /// Mark a notification as read on the server
    Read { id: String },
    /// Delete a notification on the server
    Delete { id: String },
}

fn build_config(args: &Args) -> anyhow::Result<EngineConfig> {
    let mut config = EngineConfig::from_env().context("Failed to load configuration")?;
    if let Some(url) = &args.api_url {
        config.api_base_url = url.clone();
    }
    if args.mock {
        config.use_mock_data = true;
    }
    if let Some(path) = &args.token_file {
        config.token_file = Some(path.clone());
    }
    if let Command::Watch {
        interval_ms: Some(ms),
    } = args.command
    {
        config.poll_interval_ms = ms;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn logging_options(args: &Args) -> LoggingOptions {
    LoggingOptions {
        filter: args.log_filter.clone(),
        log_dir: args.log_dir.clone(),
        json: args.log_json,
    }
}

fn token_source(args: &Args, config: &EngineConfig) -> Arc<dyn TokenSource> {
    match (&args.token, &config.token_file) {
        (Some(token), _) => Arc::new(StaticToken::new(token.clone())),
        (None, Some(path)) => Arc::new(LocalStorageFile::new(path)),
        (None, None) => Arc::new(StaticToken::none()),
    }
}

fn print_notifications(notifications: &[Notification], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(notifications)?);
        return Ok(());
    }

    if notifications.is_empty() {
        println!("No notifications");
        return Ok(());
    }

    for n in notifications {
        println!(
            "{} [{:<7}] {}: {}",
            n.timestamp.format("%H:%M:%S"),
            n.kind,
            n.title,
            n.message
        );
        if let (Some(action), Some(link)) = (&n.action, &n.link) {
            println!("           -> {action} ({link})");
        }
    }
    Ok(())
}

fn report(outcome: SideChannelOutcome, what: &str, id: &str) -> anyhow::Result<()> {
    match outcome {
        SideChannelOutcome::Acknowledged => {
            println!("{what} {id}: ok");
            Ok(())
        }
        SideChannelOutcome::Failed { reason } => anyhow::bail!("{what} {id} failed: {reason}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let _guard = init_logging(&logging_options(&args))?;

    let config = build_config(&args)?;
    let tokens = token_source(&args, &config);
    let service = Arc::new(
        NotificationService::from_config_with_tokens(&config, tokens)
            .context("Failed to create notification service")?,
    );

    match &args.command {
        Command::Watch { .. } => {
            let json = args.json;
            let subscription = service.subscribe(move |notifications| {
                if let Err(e) = print_notifications(notifications, json) {
                    tracing::warn!(error = %e, "Failed to print notifications");
                }
            });

            // Initial render before the first tick.
            print_notifications(&service.get_current_notifications().await, json)?;
            service.start_polling(config.poll_interval())?;

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for ctrl-c")?;
            info!("Interrupted, stopping");
            service.stop_polling();
            subscription.unsubscribe();
        }
        Command::Once => {
            print_notifications(&service.get_current_notifications().await, args.json)?;
        }
        Command::Rules => {
            let rules = service.rule_infos();
            if args.json {
                println!("{}", serde_json::to_string_pretty(&rules)?);
            } else {
                for rule in rules {
                    println!(
                        "{:<36} {:<12} {:<9} {}",
                        rule.id, rule.module, rule.priority, rule.name
                    );
                }
            }
        }
        Command::Read { id } => report(service.mark_as_read(id).await, "read", id)?,
        Command::Delete { id } => report(service.delete_notification(id).await, "delete", id)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_json_flag() {
        let args = Args::try_parse_from(["qhse-cli", "--log-json", "once"]).unwrap();
        assert!(logging_options(&args).json);

        let argv = ["qhse-cli", "--log-filter", "qhse_notify=debug", "rules"];
        let args = Args::try_parse_from(argv).unwrap();
        let options = logging_options(&args);
        assert!(!options.json);
        assert_eq!(options.filter.as_deref(), Some("qhse_notify=debug"));
    }

    #[test]
    fn test_read_and_delete_take_an_id() {
        let args = Args::try_parse_from(["qhse-cli", "read", "1700000000000-abc"]).unwrap();
        assert!(matches!(args.command, Command::Read { ref id } if id == "1700000000000-abc"));
        assert!(Args::try_parse_from(["qhse-cli", "delete"]).is_err());
    }
}
