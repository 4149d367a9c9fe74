use anyhow::{Context, Result};
use anyrouter_auto::browser::select_launcher;
use anyrouter_auto::checkin::CheckinClient;
use anyrouter_auto::config::{AppConfig, AppPaths};
use anyrouter_auto::credentials::CredentialStore;
use anyrouter_auto::history::HistoryStore;
use anyrouter_auto::oauth::AuthorizationFlow;
use anyrouter_auto::runner::CheckinRunner;
use anyrouter_auto::scheduler::{next_fire, DailyScheduler, ScheduleStore};
use anyrouter_auto::Error;
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Automate AnyRouter daily check-in.
#[derive(Parser)]
#[command(name = "anyrouter-auto", version, about)]
struct Cli {
    /// Log level when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start OAuth authorization and store the resulting tokens.
    Authorize {
        /// OAuth client id (overrides config and ANYROUTER_CLIENT_ID).
        #[arg(long)]
        client_id: Option<String>,

        #[command(flatten)]
        secret: PassphraseArg,

        /// Print the URL without launching a browser.
        #[arg(long)]
        no_browser: bool,

        /// Seconds to wait for the callback.
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Check in once.
    Signin {
        #[command(flatten)]
        secret: PassphraseArg,
    },

    /// Show credential state and recent history.
    Status {
        #[command(flatten)]
        secret: PassphraseArg,

        /// Number of history entries to show.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Check in every day at the scheduled time until interrupted.
    Schedule {
        #[command(flatten)]
        secret: PassphraseArg,
    },

    /// Remove stored credentials.
    Clear,
}

#[derive(Args)]
struct PassphraseArg {
    /// Passphrase masking the credential file.
    #[arg(long, env = "ANYROUTER_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("anyrouter_auto={}", cli.log_level))),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            match e.downcast_ref::<Error>() {
                Some(Error::Timeout(_)) => ExitCode::from(2),
                _ => ExitCode::from(1),
            }
        }
    }
}

async fn run(command: Command) -> Result<()> {
    let paths = AppPaths::from_env()?;
    let config = AppConfig::load(&paths)?;

    match command {
        Command::Authorize {
            client_id,
            secret,
            no_browser,
            timeout,
        } => authorize(paths, config, client_id, secret.passphrase, no_browser, timeout).await,
        Command::Signin { secret } => signin(paths, config, secret.passphrase).await,
        Command::Status { secret, limit } => status(paths, config, secret.passphrase, limit),
        Command::Schedule { secret } => schedule(paths, config, secret.passphrase).await,
        Command::Clear => {
            CredentialStore::new(paths.credentials_file(), None).clear()?;
            println!("Stored credentials removed.");
            Ok(())
        }
    }
}

fn credential_store(paths: &AppPaths, passphrase: Option<&str>) -> Result<Arc<CredentialStore>> {
    paths.ensure()?;
    Ok(Arc::new(CredentialStore::new(
        paths.credentials_file(),
        passphrase,
    )))
}

fn checkin_runner(
    paths: &AppPaths,
    config: &AppConfig,
    passphrase: Option<&str>,
) -> Result<CheckinRunner> {
    if config.oauth.require_client_id().is_err() {
        warn!("ANYROUTER_CLIENT_ID missing; token refresh may fail");
    }

    let store = credential_store(paths, passphrase)?;
    let flow = Arc::new(AuthorizationFlow::new(
        config.oauth.clone(),
        config.http.clone(),
        store,
    ));
    let client = CheckinClient::new(&config.oauth, &config.http)?;
    let history = HistoryStore::new(paths.history_file());

    Ok(CheckinRunner::new(flow, client, history))
}

async fn authorize(
    paths: AppPaths,
    mut config: AppConfig,
    client_id: Option<String>,
    passphrase: Option<String>,
    no_browser: bool,
    timeout: Option<u64>,
) -> Result<()> {
    if let Some(client_id) = client_id {
        config.oauth.client_id = Some(client_id);
    }
    config.oauth.require_client_id()?;

    let timeout = timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.oauth.callback_timeout());

    let store = credential_store(&paths, passphrase.as_deref())?;
    let flow = AuthorizationFlow::new(config.oauth.clone(), config.http.clone(), store);

    let state = flow.generate_state();
    let url = flow.build_authorization_url(&state)?;

    println!("Open the following URL in your browser to authorize:");
    println!("{}", url);

    let launcher = select_launcher(no_browser);
    match launcher.open(&url) {
        Ok(true) => println!("Browser launched. Complete the login in the opened window."),
        Ok(false) => {}
        Err(e) => warn!(launcher = launcher.name(), error = %format!("{:#}", e), "Unable to launch browser"),
    }

    println!("Waiting for callback on {} ...", config.oauth.redirect_uri());
    let result = flow.wait_for_callback(&state, timeout).await?;
    let record = flow.exchange_code(&result).await?;

    println!("Authorization succeeded. Access token stored.");
    if let Some(expires_at) = record.expires_at {
        println!("Token expires at {}", expires_at.with_timezone(&Local).to_rfc3339());
    }

    Ok(())
}

async fn signin(paths: AppPaths, config: AppConfig, passphrase: Option<String>) -> Result<()> {
    let runner = checkin_runner(&paths, &config, passphrase.as_deref())?;
    let result = runner.run_once().await?;
    println!("{}", result);
    Ok(())
}

fn status(
    paths: AppPaths,
    config: AppConfig,
    passphrase: Option<String>,
    limit: usize,
) -> Result<()> {
    let store = CredentialStore::new(paths.credentials_file(), passphrase.as_deref());
    match store.load()? {
        None => println!("No credentials stored."),
        Some(record) => {
            let state = if record.is_expired() { "expired" } else { "valid" };
            println!("Access token: {} status={}", record.token_preview(), state);
            if let Some(expires_at) = record.expires_at {
                println!("Expires at: {}", expires_at.with_timezone(&Local).to_rfc3339());
            }
        }
    }

    let schedule = ScheduleStore::new(paths.schedule_file(), config.schedule).load();
    if let Some(at) = schedule.time_of_day() {
        let next = next_fire(&Local::now(), at, schedule.last_run);
        println!(
            "Schedule: daily at {:02}:{:02}, next run {}",
            schedule.hour,
            schedule.minute,
            next.to_rfc3339()
        );
    }

    let history = HistoryStore::new(paths.history_file())
        .load()
        .context("Failed to load history")?;
    println!("Recent history:");
    let skip = history.len().saturating_sub(limit);
    for item in &history[skip..] {
        println!("- {}", item.summary());
    }

    Ok(())
}

async fn schedule(paths: AppPaths, config: AppConfig, passphrase: Option<String>) -> Result<()> {
    let runner = checkin_runner(&paths, &config, passphrase.as_deref())?;
    let store = ScheduleStore::new(paths.schedule_file(), config.schedule);

    let mut scheduler = DailyScheduler::new(Arc::new(runner), store);
    scheduler.start();
    println!("Scheduler running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown signal received");
    println!("Stopping scheduler...");
    scheduler.stop().await;

    Ok(())
}
