//! Ecommerce API CLI - Database migrations and catalog tools.
//!
//! # Usage
//!
//! ```bash
//! # Apply pending migrations
//! ecommerce-cli migrate
//!
//! # Load products, variations and coupons
//! ecommerce-cli seed catalog.yaml
//!
//! # Only validate a seed file
//! ecommerce-cli seed catalog.yaml --check
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `seed` - Load a YAML catalog into `PostgreSQL`

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "ecommerce-cli")]
#[command(author, version, about = "Ecommerce API CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Load a catalog seed file into the database
    Seed {
        /// Path to the YAML seed file
        file: PathBuf,

        /// Validate the file without touching the database
        #[arg(long)]
        check: bool,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed { file, check } => commands::seed::catalog(&file, check).await?,
    }
    Ok(())
}
