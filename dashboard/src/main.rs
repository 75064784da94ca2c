mod api;
mod config;
mod dashboard;
mod event_stream;
mod live;
mod oneshot;
mod polled;
mod tasks;

use crate::{api::ApiError, config::Settings};
use clap::{Parser, Subcommand};

/// Monitor for the milk and vegetable cold stores, fed by MQTT and the gateway API.
#[derive(Parser)]
#[command(version = git_version::git_version!(fallback = "unknown"))]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive terminal dashboard
    Dashboard,

    /// Log readings, alerts and status changes without a UI
    EventStream,

    /// Print the latest stored readings and their alerts
    Status,

    /// Print stored history per group
    History {
        /// Only the last n hours, aggregated per hour
        #[arg(long)]
        hours: Option<u32>,
    },
}

#[derive(thiserror::Error, Debug)]
pub(crate) enum RunError {
    #[error("terminal error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[allow(async_fn_in_trait)]
trait Runner {
    async fn run(&self, settings: &Settings) -> Result<(), RunError>;
}

impl Runner for Command {
    async fn run(&self, settings: &Settings) -> Result<(), RunError> {
        match self {
            Command::Dashboard => dashboard::run(settings).await,
            Command::EventStream => {
                env_logger::init();
                event_stream::run(settings).await
            }
            Command::Status => {
                env_logger::init();
                oneshot::status(settings).await
            }
            Command::History { hours } => {
                env_logger::init();
                oneshot::history(settings, *hours).await
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.command.run(&cli.settings).await {
        eprintln!("{e}");
        ::std::process::exit(1);
    }
}
