//! CLI entry point for the subway arrival service.
//!
//! `serve` runs the schedule API over the live MTA feeds; `watch` polls a
//! running server for one stop and prints a countdown.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use subway_eta::client::{Poller, RetryController, TcpProbe, VisibilitySuspender};
use subway_eta::config::ServerConfig;
use subway_eta::schedule::{DirectionFilter, FeedId, ScheduleAggregator, ScheduleQuery};
use subway_eta::server::{self, AppState};
use subway_eta::stops::StopCatalog;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "subway_eta")]
#[command(about = "Real-time subway arrivals for a stop", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the schedule, search and stop info API
    Serve {
        /// Port to listen on (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Poll a running server and print arrivals for one stop
    Watch {
        /// Stop id, e.g. 127 or 127N
        #[arg(value_name = "STOP_ID")]
        stop: String,

        /// Base URL of the server
        #[arg(short, long, default_value = "http://localhost:3001")]
        server: String,

        /// Only this direction (N or S)
        #[arg(short, long)]
        direction: Option<String>,

        /// Only this feed
        #[arg(short, long)]
        feed_id: Option<FeedId>,

        /// Seconds between polls
        #[arg(short, long, default_value_t = 30)]
        interval: u64,

        /// Attempts per poll before giving up
        #[arg(short, long, default_value_t = 5)]
        max_attempts: u32,

        /// Address probed to decide whether the device is online
        #[arg(long, default_value = "1.1.1.1:53")]
        probe: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = init_tracing()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port } => {
            let config = ServerConfig::from_env()?;
            let catalog = StopCatalog::load(&config.stops_path)?;
            let aggregator = ScheduleAggregator::new(config.feed_source()?);
            let state = Arc::new(AppState::new(aggregator, catalog));

            info!(
                auth = ?config.feed_auth,
                base_url = %config.feed_base_url,
                "Feeds configured"
            );
            server::serve(state, port.unwrap_or(config.port)).await?;
        }
        Commands::Watch {
            stop,
            server,
            direction,
            feed_id,
            interval,
            max_attempts,
            probe,
        } => {
            let mut query = ScheduleQuery::new(stop)
                .direction(DirectionFilter::from_query(direction.as_deref()));
            if let Some(feed) = feed_id {
                query = query.feed(feed);
            }

            let controller = RetryController::new(TcpProbe::new(probe));
            let poller = Poller::new(&server, &query, controller)?
                .with_interval(Duration::from_secs(interval))
                .with_max_attempts(max_attempts);

            // A stopped job (Ctrl-Z) does not run at all and a running one is
            // always on screen, so a terminal never reports "hidden" and the
            // flag stays on. Embedders with a real view call `track`.
            let suspender = VisibilitySuspender::new();
            poller
                .run(suspender.subscribe())
                .await
                .context("giving up on the server, restart to try again")?;
        }
    }

    Ok(())
}

/// Colored stderr output plus a JSON rolling log file.
fn init_tracing() -> Result<WorkerGuard> {
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/subway_eta.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("subway_eta.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    Ok(guard)
}
