use std::sync::Arc;

use anyhow::Context;
use serde_json::json;

use advocado_agent::publisher::{compose_configuration, PipeHost, PipePublisher};
use advocado_agent::tools::{contact_tool_registry, DisabledEmailSender};
use advocado_core::config::AppConfig;
use advocado_core::domain::document::SourceDescription;
use advocado_core::domain::pipe::AgentConfiguration;
use advocado_core::errors::SchemaError;
use advocado_langbase::pipes::pipe_payload;
use advocado_langbase::LangbaseServices;
use advocado_memory::Manifest;

use crate::commands::{
    block_on, config_failure, CommandResult, GlobalOptions, EXIT_CONFIG, EXIT_REMOTE, EXIT_SCHEMA,
};

const COMMAND: &str = "publish";

pub fn run(global: &GlobalOptions, dry_run: bool) -> CommandResult {
    let config = match global.load_config() {
        Ok(config) => config,
        Err(error) => return config_failure(COMMAND, &error),
    };

    let outcome = block_on(COMMAND, async {
        let manifest = match Manifest::from_config(&config.memory).await {
            Ok(manifest) => manifest,
            Err(error) => {
                return CommandResult::failure(COMMAND, "manifest", error.to_string(), EXIT_CONFIG)
            }
        };
        let configuration = match configuration(&config, &manifest.sources()) {
            Ok(configuration) => configuration,
            Err(error) => {
                return CommandResult::failure(COMMAND, "schema_validation", error.to_string(), EXIT_SCHEMA)
            }
        };
        if dry_run {
            return dry_run_result(&configuration);
        }

        let services = match LangbaseServices::connect(&config) {
            Ok(services) => services,
            Err(error) => {
                return CommandResult::failure(COMMAND, "capability_setup", error.to_string(), EXIT_CONFIG)
            }
        };
        publish(services.pipe_host, configuration).await
    });
    match outcome {
        Ok(result) | Err(result) => result,
    }
}

/// The tool declarations do not depend on how email is delivered, so a disabled sender suffices.
pub fn configuration(config: &AppConfig, sources: &[SourceDescription]) -> Result<AgentConfiguration, SchemaError> {
    let registry = contact_tool_registry(&config.persona.short_name, Arc::new(DisabledEmailSender))?;
    compose_configuration(config, sources, &registry)
}

pub fn dry_run_result(configuration: &AgentConfiguration) -> CommandResult {
    CommandResult::success_with(
        COMMAND,
        format!("dry run: `{}` was composed but not published", configuration.name),
        Some(json!({
            "fingerprint": configuration.fingerprint(),
            "pipe": pipe_payload(configuration),
        })),
    )
}

pub async fn publish(host: Arc<dyn PipeHost>, configuration: AgentConfiguration) -> CommandResult {
    let publisher = PipePublisher::new(host);
    let name = configuration.name.clone();
    match publish_once(&publisher, &name, configuration).await {
        Ok(details) => CommandResult::success_with(COMMAND, format!("pipe `{name}` published"), Some(details)),
        Err(error) => CommandResult::failure(COMMAND, "publish_failed", format!("{error:#}"), EXIT_REMOTE),
    }
}

async fn publish_once(
    publisher: &PipePublisher,
    name: &str,
    configuration: AgentConfiguration,
) -> anyhow::Result<serde_json::Value> {
    let outcome = publisher
        .publish(name, configuration)
        .await
        .with_context(|| format!("publishing pipe `{name}`"))?;
    serde_json::to_value(&outcome).context("serializing publish outcome")
}
