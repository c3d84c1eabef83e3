//! Export the TypeScript bindings consumed by the dashboard frontend
//!
//! Usage: `cargo run --bin generate_types [OUT_DIR]` (default `bindings/`).

use std::path::PathBuf;

use anyhow::Context;
use marketplace_ops_lib::domain::upload_outcome::{Classification, NormalizedResponse};
use marketplace_ops_lib::domain::{Batch, BatchStatus, UploadSession, UploadStatus, VendorContext};
use ts_rs::TS;

fn main() -> anyhow::Result<()> {
    let out_dir = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from("bindings"), PathBuf::from);

    Batch::export_all_to(&out_dir).context("Batch")?;
    BatchStatus::export_all_to(&out_dir).context("BatchStatus")?;
    UploadSession::export_all_to(&out_dir).context("UploadSession")?;
    UploadStatus::export_all_to(&out_dir).context("UploadStatus")?;
    NormalizedResponse::export_all_to(&out_dir).context("NormalizedResponse")?;
    Classification::export_all_to(&out_dir).context("Classification")?;
    VendorContext::export_all_to(&out_dir).context("VendorContext")?;

    println!("TypeScript bindings written to {}", out_dir.display());
    Ok(())
}
