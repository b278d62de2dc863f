//! pagerduty-notifier - desktop notifications for new PagerDuty incidents.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use incident_sync::config::Config;
use incident_sync::cursor::{CursorStore, CursorStoreExt, FileCursorStore, MemoryCursorStore};
use incident_sync::logging::{self, LogFormat};
use incident_sync::pagerduty::PagerDutyClient;
use incident_sync::pause::{ControlHandle, PauseController};
use incident_sync::scheduler::Scheduler;
use incident_sync::source::ResolvedScope;
use incident_sync::sync::SyncContext;
use incident_sync::ConfigError;
use notify::{Notifier, NotifyEvent};

/// Poll PagerDuty and raise desktop notifications for matching incidents.
#[derive(Parser)]
#[command(name = "pagerduty-notifier")]
#[command(about = "Desktop notifications for new PagerDuty incidents")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.pagerduty.toml)
    #[arg(short, long, global = true, env = "PAGERDUTY_NOTIFIER_CONFIG")]
    config: Option<PathBuf>,

    /// Cursor file (default: ~/.pagerduty.ts)
    #[arg(long, global = true)]
    cursor_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Poll until interrupted (default)
    Run,

    /// Run a single sync cycle and exit
    Once {
        /// Print matches only: no notifications, cursor left as is
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate the config and resolve team, user and service names
    Check,

    /// Show a sample notification
    TestNotification,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(cli.verbose, cli.log_format).context("Failed to initialise logging")?;

    let notifier = Arc::new(Notifier::from_env());
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let cursor_path = cli
        .cursor_file
        .clone()
        .unwrap_or_else(FileCursorStore::default_path);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::TestNotification => {
            notifier
                .notify_and_wait(NotifyEvent::Test {
                    timestamp: Utc::now(),
                })
                .await;
            Ok(())
        }
        Commands::Check => check(&config_path, &notifier).await,
        Commands::Once { dry_run } => once(&config_path, &cursor_path, &notifier, dry_run).await,
        Commands::Run => run(&config_path, &cursor_path, notifier).await,
    }
}

/// Load the config, telling the user through a notification when it fails.
async fn load_config(path: &Path, notifier: &Notifier) -> Result<Config> {
    match Config::load(path) {
        Ok(config) => Ok(config),
        Err(e) => {
            error!(path = %path.display(), error = %e, "Cannot load configuration");
            let message = match &e {
                ConfigError::Read { source, .. }
                    if source.kind() == std::io::ErrorKind::NotFound =>
                {
                    "No config file found".to_string()
                }
                other => other.to_string(),
            };
            notifier
                .notify_and_wait(NotifyEvent::ConfigProblem {
                    path: path.display().to_string(),
                    message,
                    timestamp: Utc::now(),
                })
                .await;
            Err(e).with_context(|| format!("Failed to load {}", path.display()))
        }
    }
}

/// Build the API client and resolve configured names. Failures are fatal.
async fn connect(config: &Config) -> Result<(Arc<PagerDutyClient>, ResolvedScope)> {
    let pd = &config.pagerduty;
    let client = match &pd.api_url {
        Some(url) => PagerDutyClient::with_url(&pd.token, url),
        None => PagerDutyClient::new(&pd.token),
    }
    .context("Failed to create PagerDuty client")?;

    let scope = client
        .resolve_scope(&pd.teams, &pd.users, &pd.services)
        .await
        .context("Failed to resolve teams, users and services")?;

    info!(
        teams = scope.team_ids.len(),
        users = scope.user_ids.len(),
        services = scope.service_ids.len(),
        "PagerDuty scope resolved"
    );

    Ok((Arc::new(client), scope))
}

async fn check(config_path: &Path, notifier: &Notifier) -> Result<()> {
    let config = load_config(config_path, notifier).await?;
    let filters = config.filters();
    config.formatter().context("Invalid title template")?;
    let (client, scope) = connect(&config).await?;

    println!("Config:      {}", config_path.display());
    println!("API:         {}", client.api_url());
    println!("Interval:    {}s", config.pagerduty.interval);
    println!("Teams:       {:?}", scope.team_ids);
    println!("Users:       {:?}", scope.user_ids);
    println!("Services:    {:?}", scope.service_ids);
    println!("Include:     {} rule(s)", filters.include.len());
    println!("Exclude:     {} rule(s)", filters.exclude.len());
    for rule in filters.include.rules().chain(filters.exclude.rules()) {
        if rule.pattern.is_none() {
            println!("  invalid regex for {}.{}", rule.scope, rule.value);
        }
    }
    Ok(())
}

async fn once(
    config_path: &Path,
    cursor_path: &Path,
    notifier: &Notifier,
    dry_run: bool,
) -> Result<()> {
    let config = load_config(config_path, notifier).await?;
    let formatter = config.formatter().context("Invalid title template")?;
    let (client, scope) = connect(&config).await?;

    let file_store = FileCursorStore::new(cursor_path);
    let store: Arc<dyn CursorStore> = if dry_run {
        Arc::new(MemoryCursorStore::new(Some(file_store.read(Utc::now()))))
    } else {
        Arc::new(file_store)
    };

    let mut context = SyncContext::new(client, store, config.filters(), scope, Utc::now());
    let report = context.run().await.context("Sync cycle failed")?;

    for incident in &report.kept {
        let alert = formatter.alert(incident);
        println!("{}  {}  {}", incident.id, alert.title(), alert.message());
        if !dry_run {
            notifier.notify_and_wait(alert).await;
        }
    }
    println!(
        "{} fetched, {} kept, next cursor {}",
        report.fetched,
        report.kept.len(),
        report.cursor.to_rfc3339()
    );
    Ok(())
}

async fn run(config_path: &Path, cursor_path: &Path, notifier: Arc<Notifier>) -> Result<()> {
    let config = load_config(config_path, &notifier).await?;
    let formatter = config.formatter().context("Invalid title template")?;
    let (client, scope) = connect(&config).await?;

    let context = SyncContext::new(
        client,
        Arc::new(FileCursorStore::new(cursor_path)),
        config.filters(),
        scope,
        Utc::now(),
    );
    let (handle, control) = ControlHandle::channel();
    let scheduler = Scheduler::new(
        context,
        PauseController::new(config.main.pause_timeout),
        notifier,
        formatter,
        control,
    )
    .with_interval(config.interval())
    .with_clear_on_unpause(config.main.clear_on_unpause);

    let shutdown = CancellationToken::new();
    spawn_pause_toggle(handle, shutdown.clone());

    let task = tokio::spawn(scheduler.run(shutdown.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Received SIGINT, shutting down");
    shutdown.cancel();

    if let Err(e) = task.await {
        warn!(error = %e, "Scheduler task panicked");
    }
    Ok(())
}

/// `SIGUSR1` toggles pause.
#[cfg(unix)]
fn spawn_pause_toggle(handle: ControlHandle, shutdown: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut usr1 = match signal(SignalKind::user_defined1()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGUSR1, pause toggle unavailable");
                return;
            }
        };
        info!(pid = std::process::id(), "Send SIGUSR1 to pause or resume notifications");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                received = usr1.recv() => {
                    if received.is_none() || !handle.toggle().await {
                        break;
                    }
                }
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_pause_toggle(_handle: ControlHandle, _shutdown: CancellationToken) {
    warn!("Pause toggle by signal is only available on Unix");
}
