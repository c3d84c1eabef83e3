//! Command-line front end for the bulk upload pipeline
//!
//! Each subcommand maps onto one operation of the pipeline and prints its
//! result as JSON on stdout. Logs go to stderr and the log file, so output
//! can be piped. The last vendor, store and batch are remembered in the
//! config file and used when the flags are omitted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::application::batch_approval::BatchApprovals;
use crate::application::batch_history::BatchHistory;
use crate::application::upload_controller::{UploadController, UploadControllerConfig};
use crate::domain::repositories::BulkUploadApi;
use crate::domain::upload_file::UploadFile;
use crate::domain::upload_session::UploadStatus;
use crate::domain::vendor_context::VendorContext;
use crate::infrastructure::bulk_upload_client::BulkUploadClient;
use crate::infrastructure::config::{AppConfig, ConfigManager};
use crate::infrastructure::logging::{get_log_directory, init_logging_with_config};

#[derive(Debug, Parser)]
#[command(name = "marketplace-ops", version, about = "Bulk product upload client for the marketplace operations dashboard")]
pub struct Cli {
    /// Config file (defaults to the per-user config directory)
    #[arg(long, global = true, env = "MARKETPLACE_OPS_CONFIG")]
    pub config: Option<PathBuf>,

    /// REST API root, e.g. https://ops.example.com/api/v1
    #[arg(long, global = true, env = "MARKETPLACE_OPS_BASE_URL")]
    pub base_url: Option<String>,

    /// Tenant sent as X-Tenant-ID on every request
    #[arg(long, global = true, env = "MARKETPLACE_OPS_TENANT_ID")]
    pub tenant: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Vendor/store selection shared by several subcommands
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ScopeArgs {
    #[arg(long)]
    pub vendor: Option<String>,

    /// Primary store of the vendor
    #[arg(long)]
    pub store: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload a CSV file and follow it through the status check
    Upload {
        file: PathBuf,
        #[command(flatten)]
        scope: ScopeArgs,
        /// Return right after the upload, without the follow-up status check
        #[arg(long)]
        no_wait: bool,
    },
    /// Show the processing status of a batch (defaults to the last upload)
    Status { batch_id: Option<String> },
    /// List batches for a vendor/store
    Batches {
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Approve a completed batch
    Approve {
        batch_id: String,
        #[arg(long)]
        reviewer: Option<String>,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Download the CSV template
    Template {
        /// Output directory (defaults to the current directory)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Inspect or reset the stored configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Overwrite the config file with defaults
    Reset,
}

/// Parse arguments, load configuration, start logging and run the command.
pub async fn execute(cli: Cli) -> Result<()> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let mut config = manager.load_config().await?;
    config.apply_overrides(cli.base_url.clone(), cli.tenant.clone());

    if let Err(e) = init_logging_with_config(&config.logging, &get_log_directory()) {
        eprintln!("Failed to initialize logging: {e:#}");
    }
    info!("🚀 marketplace-ops v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Upload {
            file,
            scope,
            no_wait,
        } => upload(&manager, &config, file, &scope, no_wait).await,
        Command::Status { batch_id } => status(&config, batch_id).await,
        Command::Batches { scope } => batches(&manager, &config, &scope).await,
        Command::Approve {
            batch_id,
            reviewer,
            scope,
        } => approve(&config, &batch_id, reviewer.as_deref(), &scope).await,
        Command::Template { out } => template(&config, out).await,
        Command::Config { action } => config_command(&manager, &config, action).await,
    }
}

fn client(config: &AppConfig, label: &str) -> Result<Arc<BulkUploadClient>> {
    let client = BulkUploadClient::from_api_config(&config.api)?.with_context_label(label);
    Ok(Arc::new(client))
}

/// Flags first, then the vendor/store remembered from the last run.
fn resolve_context(config: &AppConfig, scope: &ScopeArgs) -> VendorContext {
    let remembered = &config.app_managed;
    let vendor_id = scope
        .vendor
        .clone()
        .or_else(|| remembered.last_vendor_id.clone())
        .unwrap_or_default();
    let store_id = scope.store.clone().or_else(|| {
        // A remembered store belongs to the remembered vendor only
        (remembered.last_vendor_id.as_deref() == Some(vendor_id.as_str()))
            .then(|| remembered.last_store_id.clone())
            .flatten()
    });
    VendorContext::new(vendor_id, store_id)
}

async fn remember(manager: &ConfigManager, context: &VendorContext, batch_id: Option<&str>) {
    let result = manager
        .update_app_managed(|managed| {
            managed.last_vendor_id = Some(context.vendor_id.clone());
            managed.last_store_id = context.store_id.clone();
            if let Some(batch_id) = batch_id {
                managed.last_batch_id = Some(batch_id.to_string());
            }
        })
        .await;
    if let Err(e) = result {
        warn!("Failed to remember last selection: {:#}", e);
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{text}");
    Ok(())
}

async fn upload(
    manager: &ConfigManager,
    config: &AppConfig,
    path: PathBuf,
    scope: &ScopeArgs,
    no_wait: bool,
) -> Result<()> {
    let context = resolve_context(config, scope);
    context.scope()?;
    let file = UploadFile::from_path(&path).await?;

    let controller = UploadController::new(
        client(config, "upload")?,
        UploadControllerConfig::from_upload_config(&config.upload),
    );
    let mut session = controller.submit(file, &context).await?;
    remember(manager, &context, session.batch_id.as_deref()).await;

    if session.status == UploadStatus::Processing && !no_wait {
        session = tokio::select! {
            session = controller.wait_for_poll() => session,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted before the status check finished");
                controller.session().await
            }
        };
    }

    print_json(&session)?;

    if session.status == UploadStatus::Error {
        let reason = if session.errors.is_empty() {
            session
                .result
                .get("detail")
                .or_else(|| session.result.get("error"))
                .or_else(|| session.result.get("message"))
                .map_or_else(
                    || session.result.to_string(),
                    |value| value.as_str().map_or_else(|| value.to_string(), str::to_string),
                )
        } else {
            session.errors.join("; ")
        };
        bail!("Upload failed: {}", reason);
    }
    Ok(())
}

async fn status(config: &AppConfig, batch_id: Option<String>) -> Result<()> {
    let batch_id = batch_id
        .or_else(|| config.app_managed.last_batch_id.clone())
        .ok_or_else(|| anyhow!("No batch id given and no previous upload remembered"))?;

    let snapshot = client(config, "status")?.fetch_status(&batch_id).await?;
    let batch = snapshot.batch;
    print_json(&json!({
        "batch": snapshot.raw,
        "success_rate_percent": batch.success_rate_percent(),
        "approvable": batch.is_approvable(),
    }))
}

async fn batches(manager: &ConfigManager, config: &AppConfig, scope: &ScopeArgs) -> Result<()> {
    let context = resolve_context(config, scope);
    context.scope()?;

    let history = BatchHistory::new(client(config, "history")?);
    let batches = history.select_context(&context).await?;
    remember(manager, &context, None).await;
    print_json(&batches)
}

async fn approve(
    config: &AppConfig,
    batch_id: &str,
    reviewer: Option<&str>,
    scope: &ScopeArgs,
) -> Result<()> {
    let context = resolve_context(config, scope);
    let api = client(config, "approval")?;
    let history = Arc::new(BatchHistory::new(Arc::clone(&api)));
    history.select_context(&context).await?;

    let batch = match history.find(batch_id).await {
        Some(batch) => batch,
        None => api.fetch_status(batch_id).await?.batch,
    };

    let approvals = BatchApprovals::new(api, Arc::clone(&history));
    let refreshed = approvals.approve(&batch, reviewer).await?;
    match refreshed.iter().find(|batch| batch.batch_id == batch_id) {
        Some(batch) => print_json(batch),
        None => print_json(&json!({ "batch_id": batch_id, "approved": true })),
    }
}

async fn template(config: &AppConfig, out: Option<PathBuf>) -> Result<()> {
    let csv = client(config, "template")?.download_template().await?;

    let dir = out.unwrap_or_else(|| PathBuf::from("."));
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("Failed to create {:?}", dir))?;
    let path = dir.join(&config.upload.template_file_name);
    tokio::fs::write(&path, csv)
        .await
        .with_context(|| format!("Failed to write template to {:?}", path))?;

    info!("📄 Template saved to {:?}", path);
    print_json(&json!({ "path": path }))
}

async fn config_command(manager: &ConfigManager, config: &AppConfig, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => print_json(config),
        ConfigAction::Path => print_json(&json!({ "path": manager.config_path() })),
        ConfigAction::Reset => print_json(&manager.reset_to_defaults().await?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_last(vendor: Option<&str>, store: Option<&str>) -> AppConfig {
        let mut config = AppConfig::default();
        config.app_managed.last_vendor_id = vendor.map(str::to_string);
        config.app_managed.last_store_id = store.map(str::to_string);
        config
    }

    #[test]
    fn test_cli_parses_upload() {
        let cli = Cli::try_parse_from([
            "marketplace-ops",
            "--tenant",
            "t1",
            "upload",
            "products.csv",
            "--vendor",
            "v1",
            "--store",
            "s1",
            "--no-wait",
        ])
        .unwrap();

        assert_eq!(cli.tenant.as_deref(), Some("t1"));
        match cli.command {
            Command::Upload { file, scope, no_wait } => {
                assert_eq!(file, PathBuf::from("products.csv"));
                assert_eq!(scope.vendor.as_deref(), Some("v1"));
                assert_eq!(scope.store.as_deref(), Some("s1"));
                assert!(no_wait);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_remembered_scope_fills_missing_flags() {
        let config = config_with_last(Some("v1"), Some("s1"));
        let context = resolve_context(&config, &ScopeArgs::default());
        assert_eq!(context, VendorContext::with_store("v1", "s1"));
    }

    #[test]
    fn test_remembered_store_not_reused_for_other_vendor() {
        let config = config_with_last(Some("v1"), Some("s1"));
        let scope = ScopeArgs {
            vendor: Some("v2".to_string()),
            store: None,
        };
        let context = resolve_context(&config, &scope);
        assert_eq!(context, VendorContext::new("v2", None));
        assert!(!context.upload_enabled());
    }
}
