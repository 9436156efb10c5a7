use crate::jobs::{run_prune, run_reconciliation, run_stats, run_summary, RunArgs};
use crate::server;
use applicant_notify::error::AppError;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "Applicant Notifier",
    about = "Detect new job-posting applications and record employer notifications",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Execute one reconciliation run and print its summary as JSON
    Run(RunArgs),
    /// Print the active postings and stored snapshot count
    Summary,
    /// Delete snapshots for postings that are no longer active
    Prune,
    /// Print snapshot totals and the companies holding the most snapshots
    Stats,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Run(args) => run_reconciliation(args).await,
        Command::Summary => run_summary().await,
        Command::Prune => run_prune().await,
        Command::Stats => run_stats().await,
    }
}
