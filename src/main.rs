use pit::{Dispatcher, FilterConstraintSet, Operation, StorageConfig};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pit")]
#[command(about = "Persist JSON records as Parquet files or relational tables, then read and filter them back")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize a JSON array of flat objects and write it to a destination
    Dump {
        /// Parquet path (local or s3://bucket/key) or table name
        destination: String,

        /// JSON payload, or @path to read it from a file
        #[arg(long)]
        data: String,

        /// Storage backend: file or database
        #[arg(long, default_value = "file")]
        mode: String,
    },
    /// Read one or more sources and merge them under one schema
    Retrieve {
        /// Parquet paths or table names
        #[arg(required = true)]
        sources: Vec<String>,

        /// Storage backend: file or database
        #[arg(long, default_value = "file")]
        mode: String,
    },
    /// Retrieve, then keep rows where every column equals its value
    Search {
        /// Parquet paths or table names
        #[arg(required = true)]
        sources: Vec<String>,

        /// Space-separated column=value pairs, e.g. "a=1 b=x"
        #[arg(long, default_value = "")]
        column_value_pairs: String,

        /// Storage backend: file or database
        #[arg(long, default_value = "file")]
        mode: String,
    },
    /// Copy a relational table to a Parquet file
    Export {
        /// Table name
        table: String,

        /// Parquet path (local or s3://bucket/key)
        destination: String,

        /// Storage backend (export reads from the database)
        #[arg(long, default_value = "database")]
        mode: String,
    },
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // stdout carries only the JSON result
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = StorageConfig::from_env();
    debug!("Storage configuration: {:?}", config);

    let (operation, mode) = match args.command {
        Commands::Dump { destination, data, mode } => {
            let payload = read_payload(&data)?;
            (Operation::Dump { destination, payload }, mode)
        }
        Commands::Retrieve { sources, mode } => (Operation::Retrieve { sources }, mode),
        Commands::Search {
            sources,
            column_value_pairs,
            mode,
        } => {
            let constraints = FilterConstraintSet::parse(&column_value_pairs)?;
            (Operation::Search { sources, constraints }, mode)
        }
        Commands::Export {
            table,
            destination,
            mode,
        } => (Operation::Export { table, destination }, mode),
    };

    let outcome = Dispatcher::shared()?.dispatch(operation, &mode, &config)?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    Ok(())
}

fn read_payload(data: &str) -> Result<String> {
    match data.strip_prefix('@') {
        Some(path) => fs::read_to_string(path).with_context(|| format!("Failed to read payload file {}", path)),
        None => Ok(data.to_string()),
    }
}
