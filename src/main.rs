use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use searchgate::config::AppConfig;
use searchgate::state::AppState;
use searchgate::sync::scheduler::SyncScheduler;
use searchgate::sync::service::SyncReport;

#[derive(Debug, Parser)]
#[command(name = "searchgate", version, about = "Search gateway over ScyllaDB and Elasticsearch")]
struct Cli {
    /// TOML config file. Defaults to ./searchgate.toml when present.
    #[arg(short, long, env = "SEARCHGATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server and the periodic sync (default).
    Serve,
    /// Index all documents, or one category, then exit.
    Sync {
        #[arg(long)]
        category: Option<String>,
    },
    /// Drop, recreate and repopulate the search index, then exit.
    Reindex,
}

fn init_logging(default_filter: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&config.log_filter);

    tracing::info!(backend = ?config.backend, "Starting searchgate...");

    let state = AppState::connect(&config)
        .await
        .context("Failed to initialize backends")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(state, &config).await,
        Command::Sync { category } => {
            let report = match category {
                Some(category) => state.synchronizer.sync_category(&category).await?,
                None => state.synchronizer.sync_all().await?,
            };
            print_report(&report)
        }
        Command::Reindex => {
            let report = state.synchronizer.rebuild_all().await?;
            print_report(&report)
        }
    }
}

fn print_report(report: &SyncReport) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

async fn serve(mut state: AppState, config: &AppConfig) -> anyhow::Result<()> {
    let mut scheduler = if config.sync.enabled {
        let scheduler = SyncScheduler::spawn(
            state.synchronizer.clone(),
            Duration::from_secs(config.sync.interval_secs),
            config.sync.run_on_startup,
        );
        state.last_scheduled_sync = scheduler.last_report_handle();
        Some(scheduler)
    } else {
        tracing::info!("Periodic index sync disabled");
        None
    };

    let app = searchgate::app::router(state);

    let addr = config.server.socket_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(scheduler) = scheduler.as_mut() {
        scheduler.shutdown().await;
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
