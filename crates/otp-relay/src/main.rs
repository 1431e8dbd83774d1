use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use secrecy::SecretString;
use tokio::sync::watch;
use tracing::{info, warn};

use otp_relay::bot::{CommandHandler, StatusInfo};
use otp_relay::config::{default_config_path, load_config, Config, SettingsSource};
use otp_relay::dispatch::{Dispatcher, TelegramClient};
use otp_relay::email::{ImapConnector, InboxScanner};
use otp_relay::error::{ConfigError, Result};
use otp_relay::sanitize::redact_address;
use otp_relay::secrets::SecretRef;
use otp_relay::store::EntitlementStore;
use otp_relay::telemetry::{init_logging, LogFormat};
use otp_relay::worker::RelayWorker;

/// Relays one-time-passcode emails from an IMAP mailbox to Telegram.
#[derive(Parser, Debug)]
#[command(name = "otp-relay", version, about)]
struct Cli {
    /// Config file (default: ~/.otp-relay/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level or filter directive; overrides `log_level` in the config
    #[arg(long)]
    log_level: Option<String>,

    /// Write logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Validate the config and its secrets, then exit
    #[arg(long)]
    check_config: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("otp-relay: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli
        .config
        .or_else(default_config_path)
        .ok_or_else(|| ConfigError::Validation {
            message: "cannot locate the home directory, pass --config".to_string(),
        })?;
    let config = load_config(&config_path)?;

    let password = resolve(&config.mailbox.password, "mailbox.password")?;
    let token = resolve(&config.telegram.bot_token, "telegram.bot_token")?;

    if cli.check_config {
        println!("Config OK: {}", config_path.display());
        return Ok(());
    }

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_logging(cli.log_level.as_deref().unwrap_or(&config.log_level), format)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(config, config_path, password, token))
}

fn resolve(secret: &SecretRef, field: &'static str) -> Result<SecretString> {
    secret
        .resolve()
        .map_err(|source| ConfigError::Secret { field, source }.into())
}

async fn serve(
    config: Config,
    config_path: PathBuf,
    password: SecretString,
    token: SecretString,
) -> Result<()> {
    info!("Starting otp-relay v{}", env!("CARGO_PKG_VERSION"));

    let owner_id = config.telegram.owner_id.trim().to_string();
    let store = EntitlementStore::open(&config.store.data_dir)?;
    store.ensure_owner(&owner_id)?;
    info!("Entitlements kept in {}", store.data_dir().display());

    let telegram = Arc::new(TelegramClient::from_config(&config.telegram, &token)?);
    let me = telegram.get_me().await?;
    info!(
        "Bot authenticated as @{}",
        me.username.as_deref().unwrap_or(&me.first_name)
    );

    info!(
        "Watching folder '{}' on {} as {}",
        config.mailbox.folder,
        config.mailbox.host,
        redact_address(&config.mailbox.username)
    );
    let connector = Arc::new(ImapConnector::new(config.mailbox.clone(), password));
    let scanner = InboxScanner::new(connector, config.mailbox.batch_size as usize);

    let dispatcher = Dispatcher::new(telegram.clone(), store.clone());
    let handler = CommandHandler::new(
        store.clone(),
        owner_id.clone(),
        StatusInfo {
            check_interval_secs: config.check_interval_secs,
            mail_host: config.mailbox.host.clone(),
            folder: config.mailbox.folder.clone(),
        },
    );
    let settings = SettingsSource::from_file(config_path, config.filter.clone());

    let worker = RelayWorker::new(
        scanner,
        settings,
        store,
        dispatcher,
        handler,
        owner_id,
        Duration::from_secs(config.check_interval_secs),
    )
    .with_updates(telegram, config.telegram.poll_timeout_secs);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        info!("Shutdown requested, finishing the current cycle");
        if shutdown_tx.send(true).is_err() {
            warn!("Relay worker already stopped");
        }
    })?;

    worker.run(shutdown_rx).await;
    info!("otp-relay stopped");
    Ok(())
}
