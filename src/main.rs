use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use paygate::application::manager::GatewayManager;
use paygate::config::GatewayConfig;
use paygate::domain::ports::TransactionStoreRef;
use paygate::domain::transaction::TransactionId;
use paygate::error::GatewayError;
use paygate::infrastructure::http::HttpTransport;
use paygate::infrastructure::in_memory::InMemoryTransactionStore;
#[cfg(feature = "storage-rocksdb")]
use paygate::infrastructure::rocksdb::RocksDBStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List active gateway drivers in display order
    Drivers {
        /// Gateway configuration file (TOML)
        #[arg(long)]
        config: PathBuf,
    },
    /// Print a stored transaction as JSON
    Show {
        id: TransactionId,

        /// Gateway configuration file (TOML)
        #[arg(long)]
        config: PathBuf,

        /// Path to persistent database (optional). If provided, uses RocksDB.
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Drivers { config } => {
            let config = GatewayConfig::from_file(config).into_diagnostic()?;
            for driver in config.active_drivers() {
                println!("{},{}", driver.key, driver.name);
            }
        }
        Command::Show {
            id,
            config,
            db_path,
        } => {
            let config = GatewayConfig::from_file(config).into_diagnostic()?;
            let store = open_store(db_path)?;
            let transport = HttpTransport::new(config.transport.timeout()).into_diagnostic()?;

            // Building the manager validates every provider's credentials.
            GatewayManager::new(config, Arc::clone(&store), Arc::new(transport))
                .into_diagnostic()?;

            let row = store
                .find(id)
                .await
                .into_diagnostic()?
                .ok_or(GatewayError::NotFoundTransaction(id))
                .into_diagnostic()?;
            println!("{}", serde_json::to_string_pretty(&row).into_diagnostic()?);
        }
    }

    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(db_path: Option<PathBuf>) -> Result<TransactionStoreRef> {
    Ok(match db_path {
        Some(db_path) => Arc::new(RocksDBStore::open(db_path).into_diagnostic()?),
        None => Arc::new(InMemoryTransactionStore::new()),
    })
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(db_path: Option<PathBuf>) -> Result<TransactionStoreRef> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Arc::new(InMemoryTransactionStore::new()))
}
