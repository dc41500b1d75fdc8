use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use advocado_core::domain::contact::{ContactEmail, ContactField, FieldValue};
use advocado_core::domain::pipe::{ParameterSpec, ParameterType, ToolSpec};
use advocado_core::errors::{SchemaError, ToolInvocationError, ValidationError};

pub const SEND_EMAIL_TOOL: &str = "send_email";

#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> &ToolSpec;
    async fn execute(&self, input: Value) -> Result<Value, ToolInvocationError>;
}

/// Declared tools by name. Declarations are validated on registration.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T) -> Result<(), SchemaError>
    where
        T: Tool + 'static,
    {
        let spec = tool.spec();
        spec.validate()?;
        if self.tools.contains_key(&spec.name) {
            return Err(SchemaError::DuplicateTool(spec.name.clone()));
        }
        self.tools.insert(spec.name.clone(), Arc::new(tool));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Declarations sorted by tool name.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs = self.tools.values().map(|tool| tool.spec().clone()).collect::<Vec<_>>();
        specs.sort_by(|left, right| left.name.cmp(&right.name));
        specs
    }

    pub async fn invoke(&self, name: &str, input: Value) -> Result<Value, ToolInvocationError> {
        let tool = self.get(name).ok_or_else(|| ToolInvocationError::UnknownTool(name.to_string()))?;
        tool.execute(input).await
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// The contact-email declaration: four mandatory string arguments.
pub fn contact_email_tool_spec(recipient_name: &str) -> ToolSpec {
    let string_param = |description: &str| ParameterSpec {
        kind: ParameterType::String,
        description: description.to_string(),
    };

    let mut parameters = BTreeMap::new();
    parameters.insert("subject".to_string(), string_param("Subject of the email"));
    parameters.insert("content".to_string(), string_param("Message content for the email"));
    parameters.insert(
        "senderName".to_string(),
        string_param("Name of the person sending this message"),
    );
    parameters.insert(
        "senderEmail".to_string(),
        string_param("Email address of the person sending this message"),
    );

    ToolSpec {
        name: SEND_EMAIL_TOOL.to_string(),
        description: format!("Send a message via email to {recipient_name}"),
        parameters,
        required: vec![
            "subject".to_string(),
            "content".to_string(),
            "senderName".to_string(),
            "senderEmail".to_string(),
        ],
    }
}

/// Reads `send_email` arguments into validated field values; unknown keys are ignored.
pub fn parse_contact_arguments(input: &Value) -> (Vec<FieldValue>, Vec<ValidationError>) {
    let mut values = Vec::new();
    let mut errors = Vec::new();
    let Some(object) = input.as_object() else {
        return (values, errors);
    };

    for field in ContactField::ORDER {
        let Some(raw) = object.get(field.tool_argument()).and_then(Value::as_str) else {
            continue;
        };
        match field.validate(raw) {
            Ok(value) => values.push(FieldValue::new(field, value)),
            Err(error) => errors.push(error),
        }
    }
    (values, errors)
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: &ContactEmail) -> Result<(), ToolInvocationError>;
}

/// Sends only fully specified, valid emails.
pub struct SendEmailTool {
    spec: ToolSpec,
    sender: Arc<dyn EmailSender>,
}

impl SendEmailTool {
    pub fn new(recipient_name: &str, sender: Arc<dyn EmailSender>) -> Self {
        Self { spec: contact_email_tool_spec(recipient_name), sender }
    }

    fn parse(&self, input: &Value) -> Result<ContactEmail, ToolInvocationError> {
        let invalid = |reason: String| ToolInvocationError::InvalidArguments {
            tool: self.spec.name.clone(),
            reason,
        };

        let object = input.as_object().ok_or_else(|| invalid("arguments must be an object".to_string()))?;
        for required in &self.spec.required {
            match object.get(required) {
                Some(Value::String(_)) => {}
                Some(_) => return Err(invalid(format!("`{required}` must be a string"))),
                None => return Err(invalid(format!("`{required}` is missing"))),
            }
        }

        let (values, errors) = parse_contact_arguments(input);
        if let Some(error) = errors.first() {
            return Err(invalid(error.to_string()));
        }
        let value = |field: ContactField| {
            values
                .iter()
                .find(|value| value.field == field)
                .map(|value| value.value.clone())
                .ok_or_else(|| invalid(format!("`{}` is missing", field.tool_argument())))
        };

        Ok(ContactEmail {
            subject: value(ContactField::Subject)?,
            content: value(ContactField::Message)?,
            sender_name: value(ContactField::FullName)?,
            sender_email: value(ContactField::EmailAddress)?,
        })
    }
}

#[async_trait]
impl Tool for SendEmailTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolInvocationError> {
        let email = self.parse(&input)?;
        self.sender.send(&email).await?;
        Ok(json!({ "status": "sent" }))
    }
}

/// Used when no email endpoint is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledEmailSender;

#[async_trait]
impl EmailSender for DisabledEmailSender {
    async fn send(&self, _email: &ContactEmail) -> Result<(), ToolInvocationError> {
        Err(ToolInvocationError::NotConfigured)
    }
}

/// Keeps sent emails in memory; can be told to fail the next `n` sends or to
/// acknowledge slowly.
#[derive(Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<ContactEmail>>,
    attempts: AtomicUsize,
    failures_remaining: AtomicUsize,
    ack_delay: Duration,
}

impl RecordingEmailSender {
    pub fn failing(times: usize) -> Self {
        let sender = Self::default();
        sender.failures_remaining.store(times, Ordering::SeqCst);
        sender
    }

    /// Records each email immediately and returns only after `delay`.
    pub fn slow_to_acknowledge(delay: Duration) -> Self {
        Self { ack_delay: delay, ..Self::default() }
    }

    pub fn sent(&self) -> Vec<ContactEmail> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, email: &ContactEmail) -> Result<(), ToolInvocationError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if fail {
            return Err(ToolInvocationError::Delivery("simulated outage".to_string()));
        }
        match self.sent.lock() {
            Ok(mut sent) => sent.push(email.clone()),
            Err(poisoned) => poisoned.into_inner().push(email.clone()),
        }
        if !self.ack_delay.is_zero() {
            tokio::time::sleep(self.ack_delay).await;
        }
        Ok(())
    }
}

/// Registry holding the single `send_email` tool.
pub fn contact_tool_registry(
    recipient_name: &str,
    sender: Arc<dyn EmailSender>,
) -> Result<ToolRegistry, SchemaError> {
    let mut registry = ToolRegistry::default();
    registry.register(SendEmailTool::new(recipient_name, sender))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use advocado_core::domain::contact::ContactField;
    use advocado_core::errors::{SchemaError, ToolInvocationError};

    use super::{
        contact_email_tool_spec, contact_tool_registry, parse_contact_arguments, DisabledEmailSender,
        RecordingEmailSender, SendEmailTool, ToolRegistry, SEND_EMAIL_TOOL,
    };

    #[test]
    fn contact_tool_declares_four_required_strings() {
        let spec = contact_email_tool_spec("Stevanus");
        assert_eq!(spec.validate(), Ok(()));
        assert_eq!(spec.description, "Send a message via email to Stevanus");
        assert_eq!(spec.required, vec!["subject", "content", "senderName", "senderEmail"]);
        assert_eq!(spec.parameters.len(), 4);
    }

    #[test]
    fn duplicate_registration_is_a_schema_error() {
        let mut registry = ToolRegistry::default();
        registry
            .register(SendEmailTool::new("Steve", Arc::new(DisabledEmailSender)))
            .expect("first registration");
        let second = registry.register(SendEmailTool::new("Steve", Arc::new(DisabledEmailSender)));

        assert_eq!(second, Err(SchemaError::DuplicateTool(SEND_EMAIL_TOOL.to_string())));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn send_is_refused_when_a_field_is_missing() {
        let sender = Arc::new(RecordingEmailSender::default());
        let registry = contact_tool_registry("Steve", sender.clone()).expect("registry");

        let error = registry
            .invoke(
                SEND_EMAIL_TOOL,
                json!({"subject": "Hello", "content": "Hi!", "senderName": "Jane Doe"}),
            )
            .await
            .expect_err("senderEmail missing");

        assert!(matches!(error, ToolInvocationError::InvalidArguments { .. }));
        assert_eq!(sender.attempts(), 0);
    }

    #[tokio::test]
    async fn complete_arguments_reach_the_sender() {
        let sender = Arc::new(RecordingEmailSender::default());
        let registry = contact_tool_registry("Steve", sender.clone()).expect("registry");

        let result = registry
            .invoke(
                SEND_EMAIL_TOOL,
                json!({
                    "subject": "Hello",
                    "content": "Hi!",
                    "senderName": "Jane Doe",
                    "senderEmail": "Jane@X.com"
                }),
            )
            .await
            .expect("sent");

        assert_eq!(result, json!({"status": "sent"}));
        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].sender_email, "jane@x.com");
    }

    #[tokio::test]
    async fn failing_sender_recovers_after_configured_failures() {
        let sender = RecordingEmailSender::failing(1);
        let registry = contact_tool_registry("Steve", Arc::new(sender)).expect("registry");
        let args = json!({"subject": "a", "content": "b", "senderName": "Jane", "senderEmail": "j@x.io"});

        assert!(registry.invoke(SEND_EMAIL_TOOL, args.clone()).await.is_err());
        assert!(registry.invoke(SEND_EMAIL_TOOL, args).await.is_ok());
        assert!(matches!(
            registry.invoke("other", json!({})).await,
            Err(ToolInvocationError::UnknownTool(_))
        ));
    }

    #[test]
    fn argument_parsing_splits_valid_and_invalid_values() {
        let (values, errors) = parse_contact_arguments(&json!({
            "senderName": "Jane Doe",
            "senderEmail": "not-an-email",
            "cc": "ignored"
        }));
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].field, ContactField::FullName);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field(), ContactField::EmailAddress);
    }
}
