use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use advocado_core::config::AppConfig;
use advocado_core::errors::IngestionError;
use advocado_langbase::LangbaseServices;
use advocado_memory::{Ingestor, Manifest, MemoryStore};

use crate::commands::{
    block_on, config_failure, CommandResult, GlobalOptions, EXIT_CONFIG, EXIT_PARTIAL_FAILURE,
};

const COMMAND: &str = "sync-memory";

#[derive(Clone, Debug, Default)]
pub struct SyncOptions {
    pub manifest: Option<PathBuf>,
    pub root: Option<PathBuf>,
}

pub fn run(global: &GlobalOptions, options: &SyncOptions) -> CommandResult {
    let config = match global.load_config() {
        Ok(config) => config,
        Err(error) => return config_failure(COMMAND, &error),
    };
    let services = match LangbaseServices::connect(&config) {
        Ok(services) => services,
        Err(error) => {
            return CommandResult::failure(COMMAND, "capability_setup", error.to_string(), EXIT_CONFIG)
        }
    };

    match block_on(COMMAND, async {
        let manifest = match resolve_manifest(&config, options).await {
            Ok(manifest) => manifest,
            Err(error) => {
                return CommandResult::failure(COMMAND, "manifest", error.to_string(), EXIT_CONFIG)
            }
        };
        sync(services.memory, &config.langbase.memory_name, &manifest).await
    }) {
        Ok(result) | Err(result) => result,
    }
}

/// `--manifest` wins over the configured manifest; `--root` re-roots relative sources.
pub async fn resolve_manifest(config: &AppConfig, options: &SyncOptions) -> Result<Manifest, IngestionError> {
    let manifest = match (&options.manifest, &options.root) {
        (Some(path), root) => {
            let root = root
                .clone()
                .unwrap_or_else(|| path.parent().map(Path::to_path_buf).unwrap_or_default());
            Manifest::load(path).await?.rooted_at(&root)
        }
        (None, Some(root)) => Manifest::from_config(&config.memory).await?.rooted_at(root),
        (None, None) => Manifest::from_config(&config.memory).await?,
    };
    manifest.validate()?;
    Ok(manifest)
}

/// Uploads the whole manifest and reports one result per document.
pub async fn sync(store: Arc<dyn MemoryStore>, memory_name: &str, manifest: &Manifest) -> CommandResult {
    let ingestor = Ingestor::new(store, memory_name);
    let report = ingestor.sync_manifest(manifest).await;
    info!(
        event_name = "cli.sync_memory.completed",
        memory = %memory_name,
        uploaded = report.succeeded(),
        failed = report.failed(),
        "memory sync finished"
    );
    let summary = format!(
        "{} of {} documents uploaded to `{memory_name}`",
        report.succeeded(),
        report.results.len()
    );

    if report.all_succeeded() {
        CommandResult::success_with(COMMAND, summary, Some(report.to_json()))
    } else {
        CommandResult::failure_with(
            COMMAND,
            "partial_upload",
            summary,
            EXIT_PARTIAL_FAILURE,
            Some(report.to_json()),
        )
    }
}
