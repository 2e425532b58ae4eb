use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use openkick::store::{MemoryStore, Query, VEN_COLLECTION};
use openkick::ven::VenProps;
use openkick::{Config, Daemon};

/// OpenKick - demand-response coordinator for a fleet of VENs
#[derive(Parser)]
#[command(name = "openkick", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file (defaults to <config_dir>/openkick/config.toml)
    #[arg(long, env = "OPEN_KICK_CONFIG")]
    config: Option<PathBuf>,

    /// Start an agent for every seeded VEN at startup
    #[arg(long)]
    connect: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the coordinator and its API (default)
    Serve,
    /// Print generated VEN identities as JSON
    Seed {
        /// Number of identities
        #[arg(short, long, default_value = "5")]
        count: usize,
    },
    /// Run the configured VEN alone against a remote VTN
    Ven,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Config is needed before logging for the debug flag, so file warnings
    // emitted while loading are lost
    let config = Config::load(cli.config.as_deref());

    // Set up logging based on verbosity
    let debug = config.as_ref().is_ok_and(|c| c.debug);
    let filter = match (cli.verbose, debug) {
        (0, false) => "info,openkick=info",
        (0, true) | (1, _) => "info,openkick=debug",
        (2, _) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let result = match config {
        Ok(config) => run(cli.command, cli.connect, config).await,
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Option<Command>, connect: bool, config: Config) -> anyhow::Result<()> {
    match command.unwrap_or(Command::Serve) {
        Command::Serve => {
            Daemon::new(config).connect_at_start(connect).run().await?;
        }
        Command::Seed { count } => {
            let mut store = MemoryStore::new();
            store.seed(count);
            let records: Vec<VenProps> = store.find_records(VEN_COLLECTION, &Query::all())?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::Ven => {
            openkick::daemon::run_standalone_ven(&config).await?;
        }
    }
    Ok(())
}
