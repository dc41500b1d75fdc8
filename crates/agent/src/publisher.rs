use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use advocado_core::config::AppConfig;
use advocado_core::domain::document::SourceDescription;
use advocado_core::domain::pipe::AgentConfiguration;
use advocado_core::errors::{PublishError, SchemaError};
use advocado_core::policy::{BehaviorPolicy, Persona, PolicyAssembler, RetrievalPolicy};

use crate::tools::ToolRegistry;

/// Remote side of a publish: replaces the pipe stored under `name`.
#[async_trait]
pub trait PipeHost: Send + Sync {
    async fn update_pipe(&self, name: &str, configuration: &AgentConfiguration) -> Result<(), PublishError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PublishOutcome {
    Unchanged { fingerprint: String, revision: u64 },
    Updated { fingerprint: String, revision: u64 },
}

impl PublishOutcome {
    pub fn fingerprint(&self) -> &str {
        match self {
            Self::Unchanged { fingerprint, .. } | Self::Updated { fingerprint, .. } => fingerprint,
        }
    }

    pub fn revision(&self) -> u64 {
        match self {
            Self::Unchanged { revision, .. } | Self::Updated { revision, .. } => *revision,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PublishedConfiguration {
    pub configuration: Arc<AgentConfiguration>,
    pub fingerprint: String,
    pub revision: u64,
    pub published_at: DateTime<Utc>,
}

/// Publishes whole configurations. Readers only ever see a complete snapshot.
pub struct PipePublisher {
    host: Arc<dyn PipeHost>,
    published: Mutex<HashMap<String, PublishedConfiguration>>,
}

impl PipePublisher {
    pub fn new(host: Arc<dyn PipeHost>) -> Self {
        Self { host, published: Mutex::new(HashMap::new()) }
    }

    pub async fn publish(
        &self,
        name: &str,
        configuration: AgentConfiguration,
    ) -> Result<PublishOutcome, PublishError> {
        configuration.validate()?;
        let fingerprint = configuration.fingerprint();

        // Held across the host call so publishes under one publisher never interleave.
        let mut published = self.published.lock().await;
        let previous = published.get(name);
        if let Some(current) = previous.filter(|current| current.fingerprint == fingerprint) {
            info!(
                event_name = "pipe.publish.unchanged",
                pipe = %name,
                revision = current.revision,
                fingerprint = %fingerprint,
                "configuration already published"
            );
            return Ok(PublishOutcome::Unchanged { fingerprint, revision: current.revision });
        }
        let revision = previous.map_or(1, |current| current.revision + 1);

        if let Err(error) = self.host.update_pipe(name, &configuration).await {
            warn!(
                event_name = "pipe.publish.failed",
                pipe = %name,
                error = %error,
                "pipe host rejected configuration"
            );
            return Err(error);
        }

        published.insert(
            name.to_string(),
            PublishedConfiguration {
                configuration: Arc::new(configuration),
                fingerprint: fingerprint.clone(),
                revision,
                published_at: Utc::now(),
            },
        );
        info!(
            event_name = "pipe.publish.updated",
            pipe = %name,
            revision,
            fingerprint = %fingerprint,
            "configuration published"
        );
        Ok(PublishOutcome::Updated { fingerprint, revision })
    }

    /// Configuration new sessions should start with.
    pub async fn snapshot(&self, name: &str) -> Option<Arc<AgentConfiguration>> {
        self.published.lock().await.get(name).map(|current| Arc::clone(&current.configuration))
    }

    pub async fn current(&self, name: &str) -> Option<PublishedConfiguration> {
        self.published.lock().await.get(name).cloned()
    }
}

/// Builds the deployable configuration from process configuration, sources and tools.
pub fn compose_configuration(
    config: &AppConfig,
    sources: &[SourceDescription],
    tools: &ToolRegistry,
) -> Result<AgentConfiguration, SchemaError> {
    let behavior = behavior_policy(config);
    let assembled = PolicyAssembler.assemble(&behavior, &RetrievalPolicy::default(), sources);

    let configuration = AgentConfiguration {
        name: config.langbase.pipe_name.clone(),
        description: config.langbase.pipe_description.clone(),
        model: assembled.model,
        policy_version: assembled.policy_version,
        system_instructions: assembled.system_instructions,
        retrieval_instructions: assembled.retrieval_instructions,
        tool_declarations: tools.specs(),
        bound_memory_name: config.langbase.memory_name.clone(),
    };
    configuration.validate()?;
    Ok(configuration)
}

pub fn behavior_policy(config: &AppConfig) -> BehaviorPolicy {
    BehaviorPolicy::canonical(Persona::from(&config.persona)).with_model(config.llm.model.clone())
}
