use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pinsync::config::AppConfig;
use pinsync::server::{create_router, AppState};
use pinsync::shutdown::{grace_period, graceful_shutdown, wait_for_shutdown};
use pinsync::state::StateStore;
use pinsync::workflow::{Pipeline, RunOptions};

#[derive(Parser)]
#[command(name = "pinsync", about = "Keep a pinned tool version in sync with its upstream releases")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check, patch, build, and publish once
    Run {
        /// Stop after comparing versions
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the pinned and latest versions without changing anything
    Check,
    /// Print the persisted sync state
    Status,
    /// Serve webhooks and run on a schedule
    Serve,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run { dry_run } => {
            let pipeline = Pipeline::from_config(&config).await?;
            // Dropping the run on a signal restores the pinned file and releases the lock.
            let result = tokio::select! {
                result = pipeline.run(RunOptions { dry_run }) => result,
                _ = wait_for_shutdown() => {
                    tracing::warn!("Sync run interrupted");
                    return Ok(ExitCode::FAILURE);
                }
            };
            match result {
                Ok(outcome) => {
                    println!("{outcome}");
                    Ok(if outcome.is_success() {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::FAILURE
                    })
                }
                Err(e) => {
                    tracing::error!(error = %e, "Sync run failed");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Check => {
            let pipeline = Pipeline::from_config(&config).await?;
            let report = pipeline.check().await?;
            println!("pinned:   {}", report.pinned);
            println!("latest:   {} ({})", report.remote, report.tag);
            println!("decision: {:?}", report.decision);
            Ok(ExitCode::SUCCESS)
        }
        Command::Status => {
            let state = StateStore::new(&config.state.dir).load().await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Serve => {
            serve(config).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        tool = %config.target.tool,
        upstream = %config.upstream.repo,
        "Starting pinsync server"
    );

    if config.webhook_secret().is_none() {
        tracing::warn!("server.webhook_secret is not set; webhook and trigger requests will be refused");
    }

    let state = Arc::new(AppState::new(config.clone()).await?);

    let queue_state = Arc::clone(&state);
    tokio::spawn(async move {
        pinsync::queue::run_queue_processor(queue_state).await;
    });

    let schedule_state = Arc::clone(&state);
    tokio::spawn(async move {
        pinsync::queue::scheduler::run_scheduler(schedule_state).await;
    });

    let app = create_router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(format!(
        "{}:{}",
        config.server.host, config.server.port
    ))
    .await?;

    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    graceful_shutdown(&state, grace_period(&config)).await;

    Ok(())
}
