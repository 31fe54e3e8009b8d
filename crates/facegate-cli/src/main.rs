use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use facegate_store::IdentityStore;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "facegate", about = "Facegate identity store administration")]
struct Cli {
    /// Storage directory (default: FACEGATE_STORAGE_DIR or the XDG data dir)
    #[arg(short, long)]
    storage_dir: Option<PathBuf>,

    /// Canonical embedding dimensionality enforced on writes
    #[arg(long, default_value_t = 128)]
    embedding_dim: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored identity records
    List,
    /// Print one record as JSON
    Show {
        /// Identity name
        name: String,
        /// Per-registration face index
        index: usize,
    },
    /// Delete one record
    Remove {
        /// Identity name
        name: String,
        /// Per-registration face index
        index: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let dir = cli
        .storage_dir
        .or_else(|| std::env::var("FACEGATE_STORAGE_DIR").map(PathBuf::from).ok())
        .unwrap_or_else(facegate_store::default_storage_dir);
    let store = IdentityStore::open(dir, cli.embedding_dim)?;

    match cli.command {
        Commands::List => {
            let entries = store.entries()?;
            if entries.is_empty() {
                println!("No records stored");
                return Ok(());
            }
            for (key, record) in entries {
                println!(
                    "{key}\t{} ({})\t{} dims\t{}",
                    record.name,
                    record.condition,
                    record.embedding.dim(),
                    record.registered_at
                );
            }
        }
        Commands::Show { name, index } => match store.get(&name, index)? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => bail!("no record at ({name}, {index})"),
        },
        Commands::Remove { name, index } => {
            if store.remove(&name, index)? {
                println!("Removed ({name}, {index})");
            } else {
                bail!("no record at ({name}, {index})");
            }
        }
    }

    Ok(())
}
