use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use advocado_agent::llm::{render_context, Completion, CompletionRequest, LanguageModel, Role, ToolCall};
use advocado_agent::publisher::PipeHost;
use advocado_core::domain::pipe::AgentConfiguration;
use advocado_core::errors::{LanguageCapabilityError, PublishError};

use crate::client::{HttpFailure, LangbaseClient};

/// Name of the system message that carries retrieval instructions.
pub const RAG_MESSAGE_NAME: &str = "rag";

/// Full pipe definition sent on every publish.
pub fn pipe_payload(configuration: &AgentConfiguration) -> Value {
    let tools = configuration.tool_declarations.iter().map(|tool| tool.to_function_json()).collect::<Vec<_>>();
    json!({
        "name": configuration.name,
        "description": configuration.description,
        "model": configuration.model,
        "json": false,
        "stream": false,
        "upsert": true,
        "tools": tools,
        "memory": [{ "name": configuration.bound_memory_name }],
        "messages": [
            { "role": "system", "content": configuration.system_instructions },
            { "role": "system", "name": RAG_MESSAGE_NAME, "content": configuration.retrieval_instructions },
        ],
        "variables": [],
    })
}

pub fn run_payload(request: &CompletionRequest, context_label: &str) -> Value {
    let grounding = format!(
        "{}\n\n{}",
        request.retrieval_instructions,
        render_context(context_label, &request.context)
    );
    let mut messages = vec![
        json!({ "role": "system", "content": request.system_instructions }),
        json!({ "role": "system", "name": RAG_MESSAGE_NAME, "content": grounding }),
    ];
    messages.extend(request.history.iter().map(|message| {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        json!({ "role": role, "content": message.content })
    }));

    json!({
        "name": request.pipe_name,
        "stream": false,
        "messages": messages,
        "tools": request.tools.iter().map(|tool| tool.to_function_json()).collect::<Vec<_>>(),
    })
}

/// Reads `completion` and any `raw.choices[0].message.tool_calls`.
pub fn parse_run_response(value: &Value) -> Result<Completion, LanguageCapabilityError> {
    let text = value.get("completion").and_then(Value::as_str);
    let raw_calls = value
        .pointer("/raw/choices/0/message/tool_calls")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut tool_calls = Vec::with_capacity(raw_calls.len());
    for call in &raw_calls {
        let name = call
            .pointer("/function/name")
            .and_then(Value::as_str)
            .ok_or_else(|| LanguageCapabilityError::MalformedResponse("tool call without a name".to_string()))?;
        let arguments = match call.pointer("/function/arguments") {
            Some(Value::String(raw)) if raw.trim().is_empty() => json!({}),
            Some(Value::String(raw)) => serde_json::from_str(raw).map_err(|error| {
                LanguageCapabilityError::MalformedResponse(format!("tool arguments for `{name}`: {error}"))
            })?,
            Some(other) => other.clone(),
            None => json!({}),
        };
        tool_calls.push(ToolCall { name: name.to_string(), arguments });
    }

    if text.is_none() && tool_calls.is_empty() {
        return Err(LanguageCapabilityError::MalformedResponse(
            "response has neither a completion nor tool calls".to_string(),
        ));
    }
    Ok(Completion { text: text.unwrap_or_default().to_string(), tool_calls })
}

#[derive(Clone)]
pub struct LangbasePipeHost {
    client: LangbaseClient,
}

impl LangbasePipeHost {
    pub fn new(client: LangbaseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PipeHost for LangbasePipeHost {
    async fn update_pipe(&self, name: &str, configuration: &AgentConfiguration) -> Result<(), PublishError> {
        let _: Value = self
            .client
            .post_json(&format!("/v1/pipes/{name}"), &pipe_payload(configuration))
            .await
            .map_err(|failure| match failure {
                HttpFailure::Status { status, message } => {
                    PublishError::Rejected { pipe: name.to_string(), status, message }
                }
                HttpFailure::Timeout => PublishError::Transport("request timed out".to_string()),
                HttpFailure::Transport(message) | HttpFailure::Decode(message) => {
                    PublishError::Transport(message)
                }
            })?;
        Ok(())
    }
}

/// Runs the published pipe with explicit instructions, context and history.
#[derive(Clone)]
pub struct LangbaseLanguageModel {
    client: LangbaseClient,
    context_label: String,
}

impl LangbaseLanguageModel {
    pub fn new(client: LangbaseClient, context_label: impl Into<String>) -> Self {
        Self { client, context_label: context_label.into() }
    }
}

#[async_trait]
impl LanguageModel for LangbaseLanguageModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LanguageCapabilityError> {
        let after_ms = u64::try_from(self.client.timeout().as_millis()).unwrap_or(u64::MAX);
        let value: Value = self
            .client
            .post_json("/v1/pipes/run", &run_payload(request, &self.context_label))
            .await
            .map_err(|failure| match failure {
                HttpFailure::Timeout => LanguageCapabilityError::Timeout { after_ms },
                HttpFailure::Transport(message) => LanguageCapabilityError::Unavailable(message),
                HttpFailure::Status { status, message } => {
                    LanguageCapabilityError::Rejected { status, message }
                }
                HttpFailure::Decode(message) => LanguageCapabilityError::MalformedResponse(message),
            })?;
        let completion = parse_run_response(&value)?;
        debug!(
            event_name = "llm.completion.received",
            pipe = %request.pipe_name,
            tool_calls = completion.tool_calls.len(),
            "completion received"
        );
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use advocado_agent::llm::{ChatMessage, CompletionRequest};
    use advocado_core::domain::document::DocumentName;
    use advocado_core::domain::pipe::{AgentConfiguration, ParameterSpec, ParameterType, ToolSpec};
    use advocado_core::domain::retrieval::{RetrievedContext, RetrievedExcerpt};
    use advocado_core::errors::LanguageCapabilityError;

    use super::{parse_run_response, pipe_payload, run_payload};

    fn tool() -> ToolSpec {
        let mut parameters = BTreeMap::new();
        parameters.insert(
            "subject".to_string(),
            ParameterSpec { kind: ParameterType::String, description: "Subject of the email".to_string() },
        );
        ToolSpec {
            name: "send_email".to_string(),
            description: "Send a message via email to Stevanus".to_string(),
            parameters,
            required: vec!["subject".to_string()],
        }
    }

    #[test]
    fn pipe_payload_matches_hosted_pipe_shape() {
        let payload = pipe_payload(&AgentConfiguration {
            name: "advocado".to_string(),
            description: "The only avocado advocating for Steve".to_string(),
            model: "openai:gpt-4.1-nano".to_string(),
            policy_version: "advocate-v2".to_string(),
            system_instructions: "Speak about Steve in the third person.".to_string(),
            retrieval_instructions: "Use only the CONTEXT.".to_string(),
            tool_declarations: vec![tool()],
            bound_memory_name: "advocado-memory".to_string(),
        });

        assert_eq!(payload["json"], false);
        assert_eq!(payload["memory"], json!([{ "name": "advocado-memory" }]));
        assert_eq!(payload["messages"][1]["name"], "rag");
        assert_eq!(payload["tools"][0]["function"]["name"], "send_email");
        assert_eq!(payload["variables"], json!([]));
    }

    #[test]
    fn run_payload_appends_context_and_history() {
        let request = CompletionRequest {
            pipe_name: "advocado".to_string(),
            model: "openai:gpt-4.1-nano".to_string(),
            system_instructions: "system".to_string(),
            retrieval_instructions: "rules".to_string(),
            tools: vec![tool()],
            context: RetrievedContext::new(vec![RetrievedExcerpt {
                document_name: DocumentName::new("resume.md"),
                excerpt: "Product manager".to_string(),
                relevance: 0.9,
            }]),
            history: vec![ChatMessage::user("Who is Steve?")],
        };

        let payload = run_payload(&request, "CONTEXT");
        let grounding = payload["messages"][1]["content"].as_str().unwrap_or_default();
        assert!(grounding.starts_with("rules\n\nCONTEXT:\n--- resume.md ---"));
        assert_eq!(payload["messages"][2], json!({"role": "user", "content": "Who is Steve?"}));
        assert_eq!(payload["stream"], false);
    }

    #[test]
    fn tool_calls_are_decoded_from_raw_choices() {
        let completion = parse_run_response(&json!({
            "completion": "",
            "raw": {"choices": [{"message": {"tool_calls": [
                {"id": "call_1", "type": "function", "function": {
                    "name": "send_email",
                    "arguments": "{\"subject\":\"Hi\",\"senderEmail\":\"jane@x.com\"}"
                }}
            ]}}]}
        }))
        .expect("parsed");

        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].arguments["senderEmail"], "jane@x.com");

        let plain = parse_run_response(&json!({"completion": "Steve is a product manager."})).expect("parsed");
        assert_eq!(plain.text, "Steve is a product manager.");
        assert!(plain.tool_calls.is_empty());
    }

    #[test]
    fn broken_tool_arguments_are_malformed() {
        let result = parse_run_response(&json!({
            "raw": {"choices": [{"message": {"tool_calls": [
                {"function": {"name": "send_email", "arguments": "{not json"}}
            ]}}]}
        }));
        assert!(matches!(result, Err(LanguageCapabilityError::MalformedResponse(_))));
        assert!(matches!(parse_run_response(&json!({})), Err(LanguageCapabilityError::MalformedResponse(_))));
    }
}
