//! Langbase-backed capabilities: memory, pipe hosting and pipe runs, plus the
//! HTTP mail relay used by the `send_email` tool.

pub mod client;
pub mod email;
pub mod memory;
pub mod pipes;

use std::sync::Arc;
use std::time::Duration;

use advocado_agent::tools::EmailSender;
use advocado_core::config::AppConfig;
use advocado_core::policy::RetrievalPolicy;

pub use client::{LangbaseClient, LangbaseError};
pub use email::{email_sender_from_config, HttpEmailSender};
pub use memory::LangbaseMemoryStore;
pub use pipes::{LangbaseLanguageModel, LangbasePipeHost};

/// Every remote collaborator built from one configuration.
#[derive(Clone)]
pub struct LangbaseServices {
    pub memory: Arc<LangbaseMemoryStore>,
    pub language_model: Arc<LangbaseLanguageModel>,
    pub pipe_host: Arc<LangbasePipeHost>,
    pub email_sender: Arc<dyn EmailSender>,
}

impl LangbaseServices {
    pub fn connect(config: &AppConfig) -> Result<Self, LangbaseError> {
        let memory_client = LangbaseClient::new(
            &config.langbase.base_url,
            config.langbase.api_key.clone(),
            Duration::from_secs(config.memory.timeout_secs),
        )?;
        let pipe_client = LangbaseClient::new(
            &config.langbase.base_url,
            config.langbase.api_key.clone(),
            Duration::from_secs(config.llm.timeout_secs),
        )?;

        Ok(Self {
            memory: Arc::new(LangbaseMemoryStore::new(memory_client)),
            language_model: Arc::new(LangbaseLanguageModel::new(
                pipe_client.clone(),
                RetrievalPolicy::default().context_label,
            )),
            pipe_host: Arc::new(LangbasePipeHost::new(pipe_client)),
            email_sender: email_sender_from_config(&config.email)?,
        })
    }
}
