//! ordo operator CLI.
//!
//! Usage:
//!   # Mint identifiers
//!   ordo id -n 5
//!   ordo id --precise -n 1000
//!
//!   # When was this identifier minted?
//!   ordo ts 018bcfe5-6800-7a3c-9e1f-2f4d6c0b9a11
//!
//!   # Audit trail (JSON lines) from a database
//!   ordo --database records.db history 018bcfe5-6800-7a3c-9e1f-2f4d6c0b9a11
//!   ordo --config ordo.toml table-history orders --since 1700000000000
//!
//! Logs go to stderr; set RUST_LOG=debug for per-mutation detail.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use ordo_store::{Store, StoreConfig};
use ordo_types::{IdGenerator, IdMode, RecordId, Timestamp, extract_timestamp_str};

/// Time-ordered identifiers and audit history.
#[derive(Parser, Debug)]
#[command(name = "ordo")]
#[command(about = "Inspect ordo identifiers and audit history")]
struct Args {
    /// TOML config file (defaults plus ORDO_* environment otherwise)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database path, overriding the config
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mint new identifiers
    Id {
        /// Encode the sub-millisecond offset
        #[arg(long)]
        precise: bool,

        /// How many to print
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },
    /// Print the creation time embedded in identifiers
    Ts {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Audit entries for one record, in mutation order
    History { record_id: String },
    /// Audit entries for a table
    TableHistory {
        table: String,

        /// Only entries at or after this Unix millisecond time
        #[arg(long)]
        since: Option<u64>,
    },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    match args.command {
        Command::Id { precise, count } => {
            let mode = if precise { IdMode::Precise } else { IdMode::Standard };
            let generator = IdGenerator::system();
            for _ in 0..count {
                println!("{}", RecordId::generate(&generator, mode)?);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Ts { ids } => {
            let mut code = ExitCode::SUCCESS;
            for id in &ids {
                match extract_timestamp_str(id) {
                    Ok(ts) => println!("{id}\t{}", ts.as_millis()),
                    Err(e) => {
                        eprintln!("{id}: {e}");
                        code = ExitCode::FAILURE;
                    }
                }
            }
            Ok(code)
        }
        Command::History { record_id } => {
            let id = RecordId::parse(&record_id)
                .with_context(|| format!("bad record id {record_id:?}"))?;
            let store = open_store(args.config, args.database)?;
            for entry in store.history(id)? {
                println!("{}", serde_json::to_string(&entry)?);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::TableHistory { table, since } => {
            let store = open_store(args.config, args.database)?;
            for entry in store.table_history(&table, since.map(Timestamp::from_millis))? {
                println!("{}", serde_json::to_string(&entry)?);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Open an existing database for the read-only commands.
fn open_store(config: Option<PathBuf>, database: Option<PathBuf>) -> Result<Store> {
    let mut config = match config {
        Some(path) => StoreConfig::load(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => StoreConfig::from_env()?,
    };
    if let Some(db) = database {
        config.database = db;
    }
    let path = config.database.clone();
    Store::open_read_only(config)
        .with_context(|| format!("opening record store {}", path.display()))
}
