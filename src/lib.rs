//! Marketplace Ops - bulk product upload pipeline
//!
//! Client side of the operations dashboard's bulk upload workflow: upload a
//! CSV file, follow the server-side batch through a status check, list
//! batch history and approve completed batches.

// Module declarations
pub mod application;
pub mod commands;
pub mod domain;
pub mod infrastructure;

use anyhow::Context;
use clap::Parser;

/// Entry point for the `marketplace-ops` binary
pub fn run() -> anyhow::Result<()> {
    let cli = commands::Cli::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    runtime.block_on(commands::execute(cli))
}
