use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use advocado_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use advocado_core::config::AppConfig;
use advocado_core::domain::contact::ContactEmail;
use advocado_core::domain::document::SourceDescription;
use advocado_core::domain::pipe::AgentConfiguration;
use advocado_core::errors::{
    ApplicationError, DomainError, LanguageCapabilityError, RetrievalError, SchemaError,
    ToolInvocationError,
};
use advocado_core::flows::{ContactFlow, FlowAction, FlowContext, FlowEngine, FlowEvent, FlowState};
use advocado_core::policy::citations::CitationCatalog;
use advocado_core::policy::{BehaviorPolicy, PolicyAssembler, RetrievalPolicy};
use advocado_memory::store::MemoryStore;

use crate::conversation::TurnParser;
use crate::guardrails::{GroundingDecision, GroundingGuard};
use crate::llm::{ChatMessage, CompletionRequest, LanguageModel};
use crate::reply::{ReplyRenderer, ReplyStatus};
use crate::publisher::{behavior_policy, compose_configuration};
use crate::tools::{
    contact_tool_registry, parse_contact_arguments, EmailSender, ToolRegistry, SEND_EMAIL_TOOL,
};

const MAX_HISTORY_MESSAGES: usize = 20;
const RETRYABLE_APOLOGY: &str =
    "Sorry, I'm having trouble answering right now. Please try again in a moment.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuntimeLimits {
    pub retrieval_timeout: Duration,
    pub completion_timeout: Duration,
    pub send_timeout: Duration,
    pub top_k: usize,
}

impl RuntimeLimits {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            retrieval_timeout: Duration::from_secs(config.memory.timeout_secs),
            completion_timeout: Duration::from_secs(config.llm.timeout_secs),
            send_timeout: Duration::from_secs(config.email.timeout_secs),
            top_k: config.memory.retrieval_top_k,
        }
    }
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// External collaborators of the runtime.
#[derive(Clone)]
pub struct Capabilities {
    pub memory: Arc<dyn MemoryStore>,
    pub language_model: Arc<dyn LanguageModel>,
    pub tools: Arc<ToolRegistry>,
    pub audit: Arc<dyn AuditSink>,
}

/// One visitor conversation. Sessions share nothing mutable with each other.
#[derive(Clone, Debug)]
pub struct ConversationSession {
    id: String,
    configuration: Arc<AgentConfiguration>,
    state: FlowState,
    context: FlowContext,
    history: Vec<ChatMessage>,
    started_at: DateTime<Utc>,
    in_flight: Option<PendingSend>,
}

/// Outcome slot of a send task that outlives the turn that started it.
type PendingSend = watch::Receiver<Option<FlowEvent>>;

impl ConversationSession {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn configuration(&self) -> &AgentConfiguration {
        &self.configuration
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn context(&self) -> &FlowContext {
        &self.context
    }

    pub fn email_sent(&self) -> bool {
        self.context.email_sent
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// True while a dispatched email has no recorded outcome yet.
    pub fn send_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    fn record(&mut self, user: &str, assistant: &str) {
        self.history.push(ChatMessage::user(user));
        self.history.push(ChatMessage::assistant(assistant));
        if self.history.len() > MAX_HISTORY_MESSAGES {
            let excess = self.history.len() - MAX_HISTORY_MESSAGES;
            self.history.drain(..excess);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TurnReply {
    pub message: String,
    pub status: ReplyStatus,
    pub state: FlowState,
    pub email_sent: bool,
    pub correlation_id: String,
}

pub struct AgentRuntime {
    capabilities: Capabilities,
    engine: FlowEngine<ContactFlow>,
    parser: TurnParser,
    renderer: ReplyRenderer,
    guard: GroundingGuard,
    context_label: String,
    limits: RuntimeLimits,
}

impl AgentRuntime {
    pub fn new(
        capabilities: Capabilities,
        behavior: &BehaviorPolicy,
        retrieval: &RetrievalPolicy,
        catalog: CitationCatalog,
        limits: RuntimeLimits,
    ) -> Self {
        Self {
            capabilities,
            engine: FlowEngine::default(),
            parser: TurnParser::new(&behavior.persona),
            renderer: ReplyRenderer::new(&behavior.persona),
            guard: GroundingGuard::new(catalog, behavior.unknown_response.clone()),
            context_label: retrieval.context_label.clone(),
            limits,
        }
    }

    pub fn context_label(&self) -> &str {
        &self.context_label
    }

    /// New sessions run against `configuration` until they end, whatever is published later.
    pub fn start_session(&self, configuration: Arc<AgentConfiguration>) -> ConversationSession {
        let session = ConversationSession {
            id: Uuid::new_v4().to_string(),
            configuration,
            state: self.engine.initial_state(),
            context: FlowContext::default(),
            history: Vec::new(),
            started_at: Utc::now(),
            in_flight: None,
        };
        let audit = AuditContext::new(Some(session.id.clone()), Uuid::new_v4().to_string(), "visitor");
        self.capabilities.audit.emit(
            AuditEvent::new(&audit, "conversation.started")
                .with_category(AuditCategory::Conversation)
                .with_metadata("pipe", session.configuration.name.clone())
                .with_metadata("policy_version", session.configuration.policy_version.clone()),
        );
        session
    }

    /// Runs one turn. The session only changes when the turn completes, except that a
    /// dispatch is recorded before the send is awaited.
    pub async fn handle_turn(
        &self,
        session: &mut ConversationSession,
        text: &str,
    ) -> Result<TurnReply, ApplicationError> {
        let correlation_id = Uuid::new_v4().to_string();
        let audit = AuditContext::new(Some(session.id.clone()), correlation_id.clone(), "visitor");

        let (message, status) = if let Some(pending) = session.in_flight.clone() {
            self.resume_send(session, pending, &audit).await?
        } else {
            match self.parser.parse(&session.state, text) {
                FlowEvent::InformationRequested => self.answer(session, text, &audit).await?,
                event => self.advance(session, event, &audit).await?,
            }
        };

        if status != ReplyStatus::Retryable {
            session.record(text, &message);
        }
        info!(
            event_name = "agent.turn.completed",
            session_id = %session.id,
            correlation_id = %correlation_id,
            state = session.state.name(),
            status = ?status,
            email_sent = session.context.email_sent,
            "turn handled"
        );

        Ok(TurnReply {
            message,
            status,
            state: session.state.clone(),
            email_sent: session.context.email_sent,
            correlation_id,
        })
    }

    async fn answer(
        &self,
        session: &mut ConversationSession,
        text: &str,
        audit: &AuditContext,
    ) -> Result<(String, ReplyStatus), ApplicationError> {
        let configuration = Arc::clone(&session.configuration);
        let retrieval = timeout(
            self.limits.retrieval_timeout,
            self.capabilities.memory.retrieve(
                text,
                &configuration.bound_memory_name,
                self.limits.top_k,
            ),
        )
        .await
        .unwrap_or_else(|_| {
            Err(RetrievalError::Timeout { after_ms: duration_ms(self.limits.retrieval_timeout) })
        });

        let context = match retrieval {
            Ok(context) => context,
            Err(error) => {
                warn!(
                    event_name = "agent.retrieval.failed",
                    session_id = %session.id,
                    correlation_id = %audit.correlation_id,
                    error = %error,
                    "retrieval failed"
                );
                self.capabilities.audit.emit(
                    AuditEvent::new(audit, "retrieval.failed")
                        .with_category(AuditCategory::Retrieval)
                        .with_outcome(AuditOutcome::Failed)
                        .with_metadata("error", error.to_string()),
                );
                if let RetrievalError::Timeout { .. } = error {
                    return Ok((RETRYABLE_APOLOGY.to_string(), ReplyStatus::Retryable));
                }
                let prompts = self.settle_answer(session, audit)?;
                return Ok((
                    join_reply(self.guard.unavailable_message(), &prompts),
                    ReplyStatus::Unavailable,
                ));
            }
        };

        if let GroundingDecision::Degrade { reason_code, user_message, .. } = self.guard.evaluate(&context) {
            self.capabilities.audit.emit(
                AuditEvent::new(audit, "conversation.answer_unavailable")
                    .with_category(AuditCategory::Conversation)
                    .with_metadata("reason_code", reason_code)
                    .with_metadata("excerpts", context.len().to_string()),
            );
            let prompts = self.settle_answer(session, audit)?;
            return Ok((join_reply(&user_message, &prompts), ReplyStatus::Unavailable));
        }

        let mut history = session.history.clone();
        history.push(ChatMessage::user(text));
        let request = CompletionRequest {
            pipe_name: configuration.name.clone(),
            model: configuration.model.clone(),
            system_instructions: configuration.system_instructions.clone(),
            retrieval_instructions: configuration.retrieval_instructions.clone(),
            tools: configuration.tool_declarations.clone(),
            context,
            history,
        };

        let completion = timeout(
            self.limits.completion_timeout,
            self.capabilities.language_model.complete(&request),
        )
        .await
        .unwrap_or_else(|_| {
            Err(LanguageCapabilityError::Timeout {
                after_ms: duration_ms(self.limits.completion_timeout),
            })
        });

        let completion = match completion {
            Ok(completion) => completion,
            Err(error) => {
                warn!(
                    event_name = "agent.completion.failed",
                    session_id = %session.id,
                    correlation_id = %audit.correlation_id,
                    retryable = error.is_retryable(),
                    error = %error,
                    "language model call failed"
                );
                return Ok((RETRYABLE_APOLOGY.to_string(), ReplyStatus::Retryable));
            }
        };

        if let Some(call) = completion.tool_calls.iter().find(|call| call.name == SEND_EMAIL_TOOL) {
            let (candidates, rejected) = parse_contact_arguments(&call.arguments);
            self.capabilities.audit.emit(
                AuditEvent::new(audit, "tool.send_email.intercepted")
                    .with_category(AuditCategory::Tool)
                    .with_outcome(AuditOutcome::Rejected)
                    .with_metadata("cached_fields", candidates.len().to_string())
                    .with_metadata("invalid_fields", rejected.len().to_string()),
            );
            return self.advance(session, FlowEvent::ContactRequested { candidates }, audit).await;
        }
        for call in &completion.tool_calls {
            warn!(
                event_name = "agent.tool_call.ignored",
                correlation_id = %audit.correlation_id,
                tool = %call.name,
                "ignoring undeclared tool call"
            );
        }

        let sanitized = self.guard.sanitize(&completion.text);
        if !sanitized.removed_links.is_empty() {
            info!(
                event_name = "agent.citations.rewritten",
                correlation_id = %audit.correlation_id,
                removed = sanitized.removed_links.len(),
                "disallowed links removed from answer"
            );
        }

        let prompts = self.settle_answer(session, audit)?;
        if sanitized.text.is_empty() {
            return Ok((
                join_reply(self.guard.unavailable_message(), &prompts),
                ReplyStatus::Unavailable,
            ));
        }
        Ok((join_reply(&sanitized.text, &prompts), ReplyStatus::Answered))
    }

    /// Records an answered question. Mid-collection the form is kept and the pending
    /// question is asked again; the returned lines carry that prompt.
    fn settle_answer(
        &self,
        session: &mut ConversationSession,
        audit: &AuditContext,
    ) -> Result<Vec<String>, ApplicationError> {
        let outcome = self
            .engine
            .apply_with_audit(
                &session.state,
                &FlowEvent::InformationRequested,
                &session.context,
                self.capabilities.audit.as_ref(),
                audit,
            )
            .map_err(DomainError::from)?;
        let prompts = outcome
            .actions
            .iter()
            .filter_map(|action| self.renderer.render(action, &outcome.context))
            .collect();
        session.state = outcome.to;
        session.context = outcome.context;
        Ok(prompts)
    }

    /// Waits for the outcome of a send started by an earlier, abandoned turn.
    async fn resume_send(
        &self,
        session: &mut ConversationSession,
        pending: PendingSend,
        audit: &AuditContext,
    ) -> Result<(String, ReplyStatus), ApplicationError> {
        info!(
            event_name = "agent.send.resumed",
            session_id = %session.id,
            correlation_id = %audit.correlation_id,
            "waiting on an earlier send"
        );
        let outcome = await_send(pending).await;
        session.in_flight = None;
        self.advance(session, outcome, audit).await
    }

    /// Applies `event` and any send outcome it triggers, then commits the result.
    async fn advance(
        &self,
        session: &mut ConversationSession,
        event: FlowEvent,
        audit: &AuditContext,
    ) -> Result<(String, ReplyStatus), ApplicationError> {
        let mut state = session.state.clone();
        let mut context = session.context.clone();
        let mut lines = Vec::new();
        let mut pending = VecDeque::from([event]);

        while let Some(event) = pending.pop_front() {
            let outcome = self
                .engine
                .apply_with_audit(&state, &event, &context, self.capabilities.audit.as_ref(), audit)
                .map_err(DomainError::from)?;

            for action in &outcome.actions {
                match action {
                    FlowAction::DispatchEmail(email) => {
                        let send = self.spawn_send(email.clone(), outcome.context.send_attempts, audit.clone());
                        // A turn dropped from here on leaves ReadyToSend plus the pending send.
                        session.state = outcome.to.clone();
                        session.context = outcome.context.clone();
                        session.in_flight = Some(send.clone());
                        let result = await_send(send).await;
                        session.in_flight = None;
                        pending.push_back(result);
                    }
                    action => lines.extend(self.renderer.render(action, &outcome.context)),
                }
            }
            state = outcome.to;
            context = outcome.context;
        }

        let status = match &state {
            FlowState::Answering => ReplyStatus::Cancelled,
            FlowState::CollectingField { .. } | FlowState::ConfirmingField { .. } => {
                ReplyStatus::Collecting
            }
            FlowState::ReadyToSend | FlowState::FailedToSend => ReplyStatus::SendFailed,
            FlowState::Sent => ReplyStatus::Sent,
            FlowState::Declined => ReplyStatus::Declined,
        };

        session.state = state;
        session.context = context;
        Ok((lines.join(" "), status))
    }

    /// Runs the send on its own task so it completes even if the turn is dropped.
    fn spawn_send(&self, email: ContactEmail, attempt: u8, audit: AuditContext) -> PendingSend {
        let (outcome, pending) = watch::channel(None);
        let tools = Arc::clone(&self.capabilities.tools);
        let sink = Arc::clone(&self.capabilities.audit);
        let send_timeout = self.limits.send_timeout;
        tokio::spawn(async move {
            let event = send_contact_email(&tools, sink.as_ref(), &email, attempt, &audit, send_timeout).await;
            outcome.send_replace(Some(event));
        });
        pending
    }
}

async fn await_send(mut pending: PendingSend) -> FlowEvent {
    let outcome = match pending.wait_for(Option::is_some).await {
        Ok(outcome) => outcome.clone(),
        Err(_) => None,
    };
    outcome.unwrap_or_else(|| FlowEvent::SendFailed { reason: "send task ended without an outcome".to_string() })
}

async fn send_contact_email(
    tools: &ToolRegistry,
    sink: &dyn AuditSink,
    email: &ContactEmail,
    attempt: u8,
    audit: &AuditContext,
    send_timeout: Duration,
) -> FlowEvent {
    sink.emit(
        AuditEvent::new(audit, "tool.send_email.attempted")
            .with_category(AuditCategory::Tool)
            .with_metadata("attempt", attempt.to_string()),
    );

    let result = match serde_json::to_value(email) {
        Ok(arguments) => timeout(send_timeout, tools.invoke(SEND_EMAIL_TOOL, arguments))
            .await
            .unwrap_or_else(|_| Err(ToolInvocationError::Timeout { after_ms: duration_ms(send_timeout) })),
        Err(error) => Err(ToolInvocationError::InvalidArguments {
            tool: SEND_EMAIL_TOOL.to_string(),
            reason: error.to_string(),
        }),
    };

    match result {
        Ok(_) => {
            info!(
                event_name = "tool.send_email.succeeded",
                correlation_id = %audit.correlation_id,
                attempt,
                "contact email sent"
            );
            sink.emit(
                AuditEvent::new(audit, "tool.send_email.succeeded")
                    .with_category(AuditCategory::Tool)
                    .with_metadata("attempt", attempt.to_string()),
            );
            FlowEvent::SendSucceeded
        }
        Err(error) => {
            warn!(
                event_name = "tool.send_email.failed",
                correlation_id = %audit.correlation_id,
                attempt,
                error = %error,
                "contact email failed"
            );
            sink.emit(
                AuditEvent::new(audit, "tool.send_email.failed")
                    .with_category(AuditCategory::Tool)
                    .with_outcome(AuditOutcome::Failed)
                    .with_metadata("attempt", attempt.to_string())
                    .with_metadata("error", error.to_string()),
            );
            FlowEvent::SendFailed { reason: error.to_string() }
        }
    }
}

fn join_reply(answer: &str, prompts: &[String]) -> String {
    std::iter::once(answer)
        .chain(prompts.iter().map(String::as_str))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// A runtime and the agent configuration its sessions start from.
pub struct AgentAssembly {
    pub runtime: AgentRuntime,
    pub configuration: Arc<AgentConfiguration>,
}

/// Wires policy, citation catalog and the contact tool around the given capabilities.
pub fn assemble_agent(
    config: &AppConfig,
    sources: &[SourceDescription],
    memory: Arc<dyn MemoryStore>,
    language_model: Arc<dyn LanguageModel>,
    email_sender: Arc<dyn EmailSender>,
    audit: Arc<dyn AuditSink>,
) -> Result<AgentAssembly, SchemaError> {
    let registry = contact_tool_registry(&config.persona.short_name, email_sender)?;
    let configuration = Arc::new(compose_configuration(config, sources, &registry)?);
    let behavior = behavior_policy(config);
    let catalog = PolicyAssembler.catalog(&behavior, sources);
    let runtime = AgentRuntime::new(
        Capabilities { memory, language_model, tools: Arc::new(registry), audit },
        &behavior,
        &RetrievalPolicy::default(),
        catalog,
        RuntimeLimits::from_config(config),
    );
    Ok(AgentAssembly { runtime, configuration })
}

/// Forwards audit events to the tracing subscriber.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        info!(
            event_name = "audit.event",
            audit_event = %event.event_type,
            category = ?event.category,
            outcome = ?event.outcome,
            session_id = event.session_id.as_deref().unwrap_or("-"),
            correlation_id = %event.correlation_id,
            metadata = ?event.metadata,
            "audit"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use advocado_core::config::AppConfig;
    use advocado_memory::manifest::Manifest;

    use super::{ConversationSession, RuntimeLimits};
    use crate::llm::Role;
    use crate::publisher::compose_configuration;
    use crate::tools::{contact_tool_registry, DisabledEmailSender};

    #[test]
    fn limits_follow_configuration() {
        let mut config = AppConfig::default();
        config.memory.retrieval_top_k = 3;
        config.llm.timeout_secs = 7;

        let limits = RuntimeLimits::from_config(&config);
        assert_eq!(limits.top_k, 3);
        assert_eq!(limits.completion_timeout.as_secs(), 7);
    }

    #[test]
    fn history_keeps_the_most_recent_messages() {
        let config = AppConfig::default();
        let registry = contact_tool_registry("Steve", Arc::new(DisabledEmailSender)).expect("registry");
        let sources = Manifest::portfolio("docs", "private").sources();
        let configuration = compose_configuration(&config, &sources, &registry).expect("valid");
        let mut session = ConversationSession {
            id: "s-1".to_string(),
            configuration: Arc::new(configuration),
            state: Default::default(),
            context: Default::default(),
            history: Vec::new(),
            started_at: chrono::Utc::now(),
            in_flight: None,
        };
        for turn in 0..15 {
            session.record(&format!("question {turn}"), "answer");
        }

        assert_eq!(session.history().len(), 20);
        assert_eq!(session.history()[0].role, Role::User);
        assert_eq!(session.history()[0].content, "question 5");
    }
}
