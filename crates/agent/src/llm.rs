use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use advocado_core::domain::pipe::ToolSpec;
use advocado_core::domain::retrieval::RetrievedContext;
use advocado_core::errors::LanguageCapabilityError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
}

#[derive(Clone, Debug)]
pub struct CompletionRequest {
    pub pipe_name: String,
    pub model: String,
    pub system_instructions: String,
    pub retrieval_instructions: String,
    pub tools: Vec<ToolSpec>,
    pub context: RetrievedContext,
    /// Prior turns followed by the current user message.
    pub history: Vec<ChatMessage>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), tool_calls: Vec::new() }
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LanguageCapabilityError>;
}

/// Grounding block appended to the retrieval instructions.
pub fn render_context(label: &str, context: &RetrievedContext) -> String {
    let mut block = format!("{label}:\n");
    for excerpt in context.iter() {
        block.push_str(&format!("--- {} ---\n{}\n", excerpt.document_name, excerpt.excerpt.trim()));
    }
    block
}

/// Replays queued completions in order and records every request it receives.
#[derive(Default)]
pub struct ScriptedLanguageModel {
    replies: Mutex<VecDeque<Result<Completion, LanguageCapabilityError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLanguageModel {
    pub fn new(replies: Vec<Result<Completion, LanguageCapabilityError>>) -> Self {
        Self { replies: Mutex::new(replies.into()), requests: Mutex::new(Vec::new()) }
    }

    pub fn push(&self, reply: Result<Completion, LanguageCapabilityError>) {
        match self.replies.lock() {
            Ok(mut replies) => replies.push_back(reply),
            Err(poisoned) => poisoned.into_inner().push_back(reply),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLanguageModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LanguageCapabilityError> {
        match self.requests.lock() {
            Ok(mut requests) => requests.push(request.clone()),
            Err(poisoned) => poisoned.into_inner().push(request.clone()),
        }
        let next = match self.replies.lock() {
            Ok(mut replies) => replies.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or_else(|| {
            Err(LanguageCapabilityError::Unavailable("no scripted completion left".to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use advocado_core::domain::document::DocumentName;
    use advocado_core::domain::retrieval::{RetrievedContext, RetrievedExcerpt};

    use super::render_context;

    #[test]
    fn context_block_lists_excerpts_in_relevance_order() {
        let context = RetrievedContext::new(vec![
            RetrievedExcerpt {
                document_name: DocumentName::new("gear.md"),
                excerpt: "A gravel bike".to_string(),
                relevance: 0.2,
            },
            RetrievedExcerpt {
                document_name: DocumentName::new("resume.md"),
                excerpt: "Product manager at Example Co".to_string(),
                relevance: 0.9,
            },
        ]);

        let block = render_context("CONTEXT", &context);
        assert!(block.starts_with("CONTEXT:\n--- resume.md ---"));
        assert!(block.find("resume.md") < block.find("gear.md"));
    }
}
