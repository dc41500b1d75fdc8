use std::sync::Arc;

use advocado_agent::runtime::{assemble_agent, TracingAuditSink};
use advocado_core::config::{AppConfig, ConfigError, LoadOptions};
use advocado_core::errors::{IngestionError, SchemaError};
use advocado_langbase::{LangbaseError, LangbaseServices};
use advocado_memory::Manifest;
use thiserror::Error;
use tracing::info;

use crate::conversations::AppState;

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("capability setup failed: {0}")]
    Capabilities(#[from] LangbaseError),
    #[error("manifest could not be loaded: {0}")]
    Manifest(#[from] IngestionError),
    #[error("agent configuration is invalid: {0}")]
    Schema(#[from] SchemaError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", correlation_id = "bootstrap", "starting application bootstrap");

    let services = LangbaseServices::connect(&config)?;
    let manifest = Manifest::from_config(&config.memory).await?;
    let assembly = assemble_agent(
        &config,
        &manifest.sources(),
        services.memory,
        services.language_model,
        services.email_sender,
        Arc::new(TracingAuditSink),
    )?;
    info!(
        event_name = "system.bootstrap.agent_assembled",
        correlation_id = "bootstrap",
        pipe = %assembly.configuration.name,
        policy_version = %assembly.configuration.policy_version,
        fingerprint = %assembly.configuration.fingerprint(),
        "agent runtime assembled"
    );

    let state = AppState::new(assembly, config.langbase.memory_name.clone());
    Ok(Application { config, state })
}
