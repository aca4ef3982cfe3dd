use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod lock;
mod schedule;
mod settings;

use settings::GlobalArgs;

#[derive(Parser)]
#[command(name = "mc-backup", version)]
#[command(about = "Back up a Minecraft server container with in-game warnings", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Warn players, stop the server, copy its data and start it again
    Run {
        /// Continue a run that stopped part-way
        #[arg(long)]
        resume: bool,
    },
    /// Verify the container, paths and console session without changing anything
    Check,
    /// Show interrupted-run state and the last scheduled backup
    Status,
    /// Run the backup every day at the configured time
    Daemon,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { resume } => commands::run::exec(&cli.global, resume).await,
        Commands::Check => commands::check::exec(&cli.global).await,
        Commands::Status => commands::status::exec(&cli.global).await,
        Commands::Daemon => commands::daemon::exec(&cli.global).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(backup_core::EXIT_FATAL)
        }
    }
}
