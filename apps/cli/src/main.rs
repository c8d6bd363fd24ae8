//! govdata CLI: public-scheme statistics ETL.
//!
//! Fetches per-state scheme figures from the open data API, validates and
//! enriches them, and upserts them into a local libSQL database.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
