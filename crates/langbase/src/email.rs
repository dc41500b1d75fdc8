use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::info;

use advocado_agent::tools::{DisabledEmailSender, EmailSender};
use advocado_core::config::EmailConfig;
use advocado_core::domain::contact::ContactEmail;
use advocado_core::errors::ToolInvocationError;

use crate::client::{ensure_success, send_error, HttpFailure, LangbaseError};

/// Posts contact emails to an HTTP mail relay.
#[derive(Clone)]
pub struct HttpEmailSender {
    http: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    recipient: Option<String>,
    timeout: Duration,
}

impl HttpEmailSender {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<SecretString>,
        recipient: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LangbaseError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| LangbaseError::Client(error.to_string()))?;
        Ok(Self { http, endpoint: endpoint.into(), api_key, recipient, timeout })
    }
}

pub(crate) fn email_payload(email: &ContactEmail, recipient: Option<&str>) -> Value {
    let mut payload = json!({
        "subject": email.subject,
        "content": email.content,
        "senderName": email.sender_name,
        "senderEmail": email.sender_email,
    });
    if let (Some(recipient), Some(object)) = (recipient, payload.as_object_mut()) {
        object.insert("to".to_string(), Value::String(recipient.to_string()));
    }
    payload
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, email: &ContactEmail) -> Result<(), ToolInvocationError> {
        let after_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        let mut request = self.http.post(&self.endpoint).json(&email_payload(email, self.recipient.as_deref()));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let outcome = match request.send().await {
            Ok(response) => ensure_success(response).await.map(|_| ()),
            Err(error) => Err(send_error(error)),
        };
        outcome.map_err(|failure| match failure {
            HttpFailure::Timeout => ToolInvocationError::Timeout { after_ms },
            HttpFailure::Status { status, message } => ToolInvocationError::Rejected { status, message },
            HttpFailure::Transport(message) | HttpFailure::Decode(message) => {
                ToolInvocationError::Delivery(message)
            }
        })?;

        info!(event_name = "email.relay.accepted", "contact email accepted by relay");
        Ok(())
    }
}

/// Relay sender when an endpoint is configured, otherwise one that refuses every send.
pub fn email_sender_from_config(config: &EmailConfig) -> Result<Arc<dyn EmailSender>, LangbaseError> {
    match &config.endpoint {
        Some(endpoint) => Ok(Arc::new(HttpEmailSender::new(
            endpoint.clone(),
            config.api_key.clone(),
            config.recipient.clone(),
            Duration::from_secs(config.timeout_secs),
        )?)),
        None => Ok(Arc::new(DisabledEmailSender)),
    }
}
