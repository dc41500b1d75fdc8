use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use advocado_agent::llm::{Completion, CompletionRequest, LanguageModel, ScriptedLanguageModel, ToolCall};
use advocado_agent::publisher::{behavior_policy, compose_configuration};
use advocado_agent::reply::ReplyStatus;
use advocado_agent::runtime::{AgentRuntime, Capabilities, ConversationSession, RuntimeLimits};
use advocado_agent::tools::{contact_tool_registry, RecordingEmailSender, SEND_EMAIL_TOOL};
use advocado_core::audit::InMemoryAuditSink;
use advocado_core::config::AppConfig;
use advocado_core::domain::contact::ContactField;
use advocado_core::domain::document::{DocumentName, KnowledgeDocument, TEXT_PLAIN};
use advocado_core::domain::pipe::AgentConfiguration;
use advocado_core::domain::retrieval::RetrievedContext;
use advocado_core::errors::{IngestionError, LanguageCapabilityError, RetrievalError};
use advocado_core::flows::FlowState;
use advocado_core::policy::{PolicyAssembler, RetrievalPolicy};
use advocado_memory::manifest::Manifest;
use advocado_memory::store::{InMemoryMemoryStore, MemoryStore, UploadAck};

const UNAVAILABLE: &str = "I don't have that detail available.";

struct Harness {
    runtime: AgentRuntime,
    llm: Arc<ScriptedLanguageModel>,
    sender: Arc<RecordingEmailSender>,
    audit: InMemoryAuditSink,
    configuration: Arc<AgentConfiguration>,
}

impl Harness {
    async fn new(sender: RecordingEmailSender) -> Self {
        let llm = Arc::new(ScriptedLanguageModel::default());
        Self::build(seeded_store().await, llm.clone(), llm, Arc::new(sender), RuntimeLimits::default())
    }

    fn build(
        memory: Arc<dyn MemoryStore>,
        language_model: Arc<dyn LanguageModel>,
        llm: Arc<ScriptedLanguageModel>,
        sender: Arc<RecordingEmailSender>,
        limits: RuntimeLimits,
    ) -> Self {
        let config = AppConfig::default();
        let sources = Manifest::portfolio("docs", "private").sources();
        let registry =
            contact_tool_registry(&config.persona.short_name, sender.clone()).expect("registry");
        let configuration =
            Arc::new(compose_configuration(&config, &sources, &registry).expect("configuration"));

        let audit = InMemoryAuditSink::default();
        let behavior = behavior_policy(&config);
        let catalog = PolicyAssembler.catalog(&behavior, &sources);
        let runtime = AgentRuntime::new(
            Capabilities {
                memory,
                language_model,
                tools: Arc::new(registry),
                audit: Arc::new(audit.clone()),
            },
            &behavior,
            &RetrievalPolicy::default(),
            catalog,
            limits,
        );

        Self { runtime, llm, sender, audit, configuration }
    }

    fn session(&self) -> ConversationSession {
        self.runtime.start_session(Arc::clone(&self.configuration))
    }
}

async fn seeded_store() -> Arc<InMemoryMemoryStore> {
    let config = AppConfig::default();
    let store = Arc::new(InMemoryMemoryStore::default());
    for (name, text) in [
        ("projects.md", "Steve built a quoting CLI in Rust.\n\nHe also maintains the portfolio site."),
        ("resume.md", "Product manager with a software engineering background."),
        ("supplementary.md", "His favourite childhood memory is a trip to Bali."),
    ] {
        store
            .upload(&config.langbase.memory_name, &document(name, text))
            .await
            .expect("seed memory");
    }
    store
}

/// Answers every query, but only after `delay`.
struct SlowMemory {
    inner: Arc<InMemoryMemoryStore>,
    delay: Duration,
}

#[async_trait]
impl MemoryStore for SlowMemory {
    async fn upload(&self, memory_name: &str, document: &KnowledgeDocument) -> Result<UploadAck, IngestionError> {
        self.inner.upload(memory_name, document).await
    }

    async fn retrieve(&self, query: &str, memory_name: &str, top_k: usize) -> Result<RetrievedContext, RetrievalError> {
        tokio::time::sleep(self.delay).await;
        self.inner.retrieve(query, memory_name, top_k).await
    }
}

/// Delegates to a scripted model after `delay`.
struct SlowModel {
    inner: Arc<ScriptedLanguageModel>,
    delay: Duration,
}

#[async_trait]
impl LanguageModel for SlowModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LanguageCapabilityError> {
        tokio::time::sleep(self.delay).await;
        self.inner.complete(request).await
    }
}

fn short_limits() -> RuntimeLimits {
    RuntimeLimits {
        retrieval_timeout: Duration::from_millis(20),
        completion_timeout: Duration::from_millis(20),
        ..RuntimeLimits::default()
    }
}

fn document(name: &str, text: &str) -> KnowledgeDocument {
    KnowledgeDocument {
        name: DocumentName::new(name),
        source_path: PathBuf::from(name),
        raw_bytes: text.as_bytes().to_vec(),
        content_type: TEXT_PLAIN.to_string(),
        metadata: BTreeMap::new(),
    }
}

async fn say(harness: &Harness, session: &mut ConversationSession, text: &str) -> advocado_agent::TurnReply {
    harness.runtime.handle_turn(session, text).await.expect("turn handled")
}

#[tokio::test]
async fn contact_scenario_sends_exactly_once_then_declines() {
    let harness = Harness::new(RecordingEmailSender::default()).await;
    let mut session = harness.session();

    let reply = say(&harness, &mut session, "contact Steve").await;
    assert_eq!(reply.state, FlowState::CollectingField { field: ContactField::FullName });
    assert_eq!(reply.status, ReplyStatus::Collecting);
    assert!(reply.message.contains("What is your full name?"));

    let reply = say(&harness, &mut session, "Jane Doe, jane@x.com").await;
    assert_eq!(
        reply.state,
        FlowState::ConfirmingField { field: ContactField::FullName, proposed: "Jane Doe".to_string() }
    );
    assert_eq!(session.context().form.pending(ContactField::EmailAddress), Some("jane@x.com"));

    let reply = say(&harness, &mut session, "yes").await;
    assert_eq!(reply.state, FlowState::CollectingField { field: ContactField::EmailAddress });
    assert!(reply.message.contains("jane@x.com"));
    assert!(!session.context().form.is_committed(ContactField::EmailAddress));

    let reply = say(&harness, &mut session, "yes").await;
    assert_eq!(reply.state, FlowState::CollectingField { field: ContactField::Subject });

    let reply = say(&harness, &mut session, "Hello").await;
    assert_eq!(
        reply.state,
        FlowState::ConfirmingField { field: ContactField::Subject, proposed: "Hello".to_string() }
    );
    say(&harness, &mut session, "yes").await;

    let reply = say(&harness, &mut session, "Hi!").await;
    assert_eq!(
        reply.state,
        FlowState::ConfirmingField { field: ContactField::Message, proposed: "Hi!".to_string() }
    );
    assert_eq!(harness.sender.attempts(), 0);

    let reply = say(&harness, &mut session, "yes").await;
    assert_eq!(reply.state, FlowState::Sent);
    assert_eq!(reply.status, ReplyStatus::Sent);
    assert!(reply.email_sent);

    let sent = harness.sender.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].sender_name, "Jane Doe");
    assert_eq!(sent[0].sender_email, "jane@x.com");
    assert_eq!(sent[0].subject, "Hello");
    assert_eq!(sent[0].content, "Hi!");

    let reply = say(&harness, &mut session, "contact Steve").await;
    assert_eq!(reply.state, FlowState::Declined);
    assert_eq!(reply.status, ReplyStatus::Declined);
    assert!(reply.message.contains("only one email"));
    assert_eq!(harness.sender.attempts(), 1);
    assert_eq!(harness.audit.count("tool.send_email.succeeded"), 1);
    assert_eq!(harness.llm.call_count(), 0);
}

#[tokio::test]
async fn empty_context_answers_unavailable_without_the_model() {
    let harness = Harness::new(RecordingEmailSender::default()).await;
    let mut session = harness.session();

    let reply = say(&harness, &mut session, "Which football club does he support?").await;

    assert_eq!(reply.status, ReplyStatus::Unavailable);
    assert_eq!(reply.message, UNAVAILABLE);
    assert!(!reply.message.contains("]("));
    assert_eq!(harness.llm.call_count(), 0);
}

#[tokio::test]
async fn restricted_only_context_is_unavailable_not_cited() {
    let harness = Harness::new(RecordingEmailSender::default()).await;
    let mut session = harness.session();

    let reply = say(&harness, &mut session, "Tell me a favourite childhood memory").await;

    assert_eq!(reply.status, ReplyStatus::Unavailable);
    assert!(!reply.message.contains("supplementary"));
    assert_eq!(harness.llm.call_count(), 0);
    assert_eq!(harness.audit.count("conversation.answer_unavailable"), 1);
}

#[tokio::test]
async fn grounded_answers_keep_only_allowed_citations() {
    let harness = Harness::new(RecordingEmailSender::default()).await;
    harness.llm.push(Ok(Completion::text(
        "Steve built a quoting CLI in Rust. See [projects](https://stevanussatria.com/projects.html) \
         and [notes](https://stevanussatria.com/supplementary.html).",
    )));
    let mut session = harness.session();

    let reply = say(&harness, &mut session, "What has Steve built with Rust?").await;

    assert_eq!(reply.status, ReplyStatus::Answered);
    assert_eq!(
        reply.message,
        "Steve built a quoting CLI in Rust. See [projects](https://stevanussatria.com/projects.html) and notes."
    );

    let requests = harness.llm.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.model, "openai:gpt-4.1-nano");
    assert!(request.context.iter().any(|excerpt| excerpt.excerpt.contains("quoting CLI")));
    assert_eq!(request.tools.len(), 1);
    assert_eq!(request.history.last().map(|message| message.content.as_str()), Some("What has Steve built with Rust?"));
    assert_eq!(session.history().len(), 2);
}

#[tokio::test]
async fn model_outage_is_retryable_and_leaves_the_session_alone() {
    let harness = Harness::new(RecordingEmailSender::default()).await;
    harness.llm.push(Err(LanguageCapabilityError::Unavailable("connection reset".to_string())));
    let mut session = harness.session();
    say(&harness, &mut session, "contact Steve").await;
    say(&harness, &mut session, "cancel").await;
    let before = session.clone();

    let reply = say(&harness, &mut session, "What has Steve built?").await;

    assert_eq!(reply.status, ReplyStatus::Retryable);
    assert_eq!(session.state(), before.state());
    assert_eq!(session.history().len(), before.history().len());
}

#[tokio::test]
async fn model_tool_call_only_caches_fields() {
    let harness = Harness::new(RecordingEmailSender::default()).await;
    harness.llm.push(Ok(Completion {
        text: String::new(),
        tool_calls: vec![ToolCall {
            name: SEND_EMAIL_TOOL.to_string(),
            arguments: json!({
                "subject": "Coffee",
                "content": "Are you free next week?",
                "senderName": "Jane Doe",
                "senderEmail": "jane@x.com"
            }),
        }],
    }));
    let mut session = harness.session();

    let reply = say(&harness, &mut session, "Could Steve build a Rust CLI for me?").await;

    assert_eq!(
        reply.state,
        FlowState::ConfirmingField { field: ContactField::FullName, proposed: "Jane Doe".to_string() }
    );
    assert!(!reply.email_sent);
    assert_eq!(harness.sender.attempts(), 0);
    assert_eq!(session.context().form.pending(ContactField::Subject), Some("Coffee"));
    assert_eq!(harness.audit.count("tool.send_email.intercepted"), 1);
}

#[tokio::test]
async fn send_failure_allows_one_retry_then_ends_the_contact_intent() {
    let harness = Harness::new(RecordingEmailSender::failing(2)).await;
    let mut session = harness.session();

    for text in [
        "contact Steve",
        "name: Jane Doe; email: jane@x.com; subject: Hello; message: Hi!",
        "yes",
        "yes",
        "yes",
    ] {
        say(&harness, &mut session, text).await;
    }
    let reply = say(&harness, &mut session, "yes").await;
    assert_eq!(reply.state, FlowState::ReadyToSend);
    assert_eq!(reply.status, ReplyStatus::SendFailed);
    assert!(reply.message.contains("try once more"));
    assert!(!reply.email_sent);

    let reply = say(&harness, &mut session, "try again").await;
    assert_eq!(reply.state, FlowState::FailedToSend);
    assert!(!reply.email_sent);

    let reply = say(&harness, &mut session, "contact Steve").await;
    assert_eq!(reply.state, FlowState::Declined);
    assert_eq!(harness.sender.attempts(), 2);
    assert!(harness.sender.sent().is_empty());
    assert_eq!(harness.audit.count("tool.send_email.failed"), 2);
}

#[tokio::test]
async fn sessions_do_not_share_contact_state() {
    let harness = Harness::new(RecordingEmailSender::default()).await;
    let mut first = harness.session();
    let mut second = harness.session();

    say(&harness, &mut first, "contact Steve").await;
    let reply = say(&harness, &mut second, "Which football club does he support?").await;

    assert_eq!(reply.state, FlowState::Answering);
    assert_eq!(first.state(), &FlowState::CollectingField { field: ContactField::FullName });
    assert_ne!(first.id(), second.id());
}

async fn fill_form_up_to_message(harness: &Harness, session: &mut ConversationSession) {
    for text in ["contact Steve", "Jane Doe, jane@x.com", "yes", "yes", "Hello", "yes", "Hi!"] {
        say(harness, session, text).await;
    }
    assert_eq!(
        session.state(),
        &FlowState::ConfirmingField { field: ContactField::Message, proposed: "Hi!".to_string() }
    );
}

#[tokio::test]
async fn dropped_turn_during_send_never_sends_twice() {
    let harness =
        Harness::new(RecordingEmailSender::slow_to_acknowledge(Duration::from_millis(300))).await;
    let mut session = harness.session();
    fill_form_up_to_message(&harness, &mut session).await;

    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), harness.runtime.handle_turn(&mut session, "yes")).await;
    assert!(abandoned.is_err(), "turn should still be waiting on the relay");
    assert_eq!(harness.sender.attempts(), 1);
    assert_eq!(session.state(), &FlowState::ReadyToSend);
    assert!(session.send_in_flight());
    assert!(!session.email_sent());

    let reply = say(&harness, &mut session, "yes").await;
    assert_eq!(reply.state, FlowState::Sent);
    assert_eq!(reply.status, ReplyStatus::Sent);
    assert!(reply.email_sent);
    assert!(!session.send_in_flight());

    let reply = say(&harness, &mut session, "contact Steve").await;
    assert_eq!(reply.state, FlowState::Declined);
    assert_eq!(harness.sender.attempts(), 1);
    assert_eq!(harness.sender.sent().len(), 1);
}

#[tokio::test]
async fn declining_the_retry_closes_contact_for_the_session() {
    let harness = Harness::new(RecordingEmailSender::failing(1)).await;
    let mut session = harness.session();
    fill_form_up_to_message(&harness, &mut session).await;

    let reply = say(&harness, &mut session, "yes").await;
    assert_eq!(reply.state, FlowState::ReadyToSend);
    assert!(reply.message.contains("try once more"));

    let reply = say(&harness, &mut session, "maybe later").await;
    assert_eq!(reply.state, FlowState::ReadyToSend);
    assert!(reply.message.contains("Reply yes to retry or no to stop"));
    assert_eq!(harness.sender.attempts(), 1);

    let reply = say(&harness, &mut session, "no").await;
    assert_eq!(reply.state, FlowState::FailedToSend);
    assert!(!reply.email_sent);

    let reply = say(&harness, &mut session, "contact Steve").await;
    assert_eq!(reply.state, FlowState::Declined);
    assert_eq!(reply.status, ReplyStatus::Declined);
    assert_eq!(harness.sender.attempts(), 1);
}

#[tokio::test]
async fn questions_mid_collection_are_answered_and_the_form_is_kept() {
    let harness = Harness::new(RecordingEmailSender::default()).await;
    harness.llm.push(Ok(Completion::text("Steve built a quoting CLI in Rust.")));
    let mut session = harness.session();
    say(&harness, &mut session, "contact Steve").await;

    let reply = say(&harness, &mut session, "What has Steve built with Rust?").await;
    assert_eq!(reply.status, ReplyStatus::Answered);
    assert_eq!(reply.state, FlowState::CollectingField { field: ContactField::FullName });
    assert!(reply.message.starts_with("Steve built a quoting CLI in Rust."));
    assert!(reply.message.ends_with("What is your full name?"));

    say(&harness, &mut session, "Jane Doe, jane@x.com").await;
    let reply = say(&harness, &mut session, "Which football club does he support?").await;
    assert_eq!(reply.status, ReplyStatus::Unavailable);
    assert!(reply.message.starts_with(UNAVAILABLE));
    assert!(reply.message.contains("Just to confirm, your full name is \"Jane Doe\"?"));
    assert_eq!(
        reply.state,
        FlowState::ConfirmingField { field: ContactField::FullName, proposed: "Jane Doe".to_string() }
    );
    assert_eq!(session.context().form.pending(ContactField::EmailAddress), Some("jane@x.com"));

    let reply = say(&harness, &mut session, "yes").await;
    assert_eq!(reply.state, FlowState::CollectingField { field: ContactField::EmailAddress });
    assert_eq!(session.context().form.committed(ContactField::FullName), Some("Jane Doe"));
}

#[tokio::test]
async fn email_while_confirming_the_name_keeps_the_name() {
    let harness = Harness::new(RecordingEmailSender::default()).await;
    let mut session = harness.session();
    say(&harness, &mut session, "contact Steve").await;
    say(&harness, &mut session, "Jane Doe").await;

    let reply = say(&harness, &mut session, "jane@x.com").await;
    assert_eq!(
        reply.state,
        FlowState::ConfirmingField { field: ContactField::FullName, proposed: "Jane Doe".to_string() }
    );
    assert!(reply.message.contains("\"Jane Doe\""));
    assert_eq!(session.context().form.pending(ContactField::EmailAddress), Some("jane@x.com"));

    let reply = say(&harness, &mut session, "yes").await;
    assert_eq!(reply.state, FlowState::CollectingField { field: ContactField::EmailAddress });
    assert!(reply.message.contains("jane@x.com"));
}

#[tokio::test]
async fn slow_retrieval_is_retryable_and_leaves_the_session_alone() {
    let store = seeded_store().await;
    let llm = Arc::new(ScriptedLanguageModel::default());
    let harness = Harness::build(
        Arc::new(SlowMemory { inner: store, delay: Duration::from_millis(200) }),
        llm.clone(),
        llm,
        Arc::new(RecordingEmailSender::default()),
        short_limits(),
    );
    let mut session = harness.session();

    let reply = say(&harness, &mut session, "What has Steve built?").await;
    assert_eq!(reply.status, ReplyStatus::Retryable);
    assert_eq!(reply.state, FlowState::Answering);
    assert!(session.history().is_empty());

    say(&harness, &mut session, "contact Steve").await;
    say(&harness, &mut session, "Jane Doe").await;
    let before = session.clone();

    let reply = say(&harness, &mut session, "What has Steve built?").await;
    assert_eq!(reply.status, ReplyStatus::Retryable);
    assert_eq!(session.state(), before.state());
    assert_eq!(session.context(), before.context());
    assert_eq!(session.history().len(), before.history().len());
    assert_eq!(harness.llm.call_count(), 0);
    assert_eq!(harness.audit.count("retrieval.failed"), 2);
}

#[tokio::test]
async fn slow_completion_is_retryable_and_leaves_the_session_alone() {
    let llm = Arc::new(ScriptedLanguageModel::default());
    llm.push(Ok(Completion::text("Steve built a quoting CLI in Rust.")));
    let harness = Harness::build(
        seeded_store().await,
        Arc::new(SlowModel { inner: llm.clone(), delay: Duration::from_millis(200) }),
        llm,
        Arc::new(RecordingEmailSender::default()),
        RuntimeLimits { retrieval_timeout: Duration::from_secs(5), ..short_limits() },
    );
    let mut session = harness.session();

    let reply = say(&harness, &mut session, "What has Steve built with Rust?").await;
    assert_eq!(reply.status, ReplyStatus::Retryable);
    assert_eq!(reply.state, FlowState::Answering);
    assert!(session.history().is_empty());

    say(&harness, &mut session, "contact Steve").await;
    let before = session.clone();

    let reply = say(&harness, &mut session, "What has Steve built with Rust?").await;

    assert_eq!(reply.status, ReplyStatus::Retryable);
    assert_eq!(session.state(), &FlowState::CollectingField { field: ContactField::FullName });
    assert_eq!(session.context(), before.context());
    assert_eq!(session.history().len(), before.history().len());
}
