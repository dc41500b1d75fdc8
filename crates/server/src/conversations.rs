use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use advocado_agent::runtime::{AgentAssembly, AgentRuntime, ConversationSession, TurnReply};
use advocado_core::domain::pipe::AgentConfiguration;
use advocado_core::errors::InterfaceError;
use advocado_core::flows::FlowState;

use crate::health;

const MAX_MESSAGE_CHARS: usize = 4_000;

/// A conversation plus the time its last turn finished.
struct LiveSession {
    session: ConversationSession,
    last_active: Instant,
}

type SessionSlot = Arc<Mutex<LiveSession>>;

/// Shared by every request. Sessions are independent; each has its own lock.
#[derive(Clone)]
pub struct AppState {
    runtime: Arc<AgentRuntime>,
    configuration: Arc<AgentConfiguration>,
    sessions: Arc<RwLock<HashMap<String, SessionSlot>>>,
    memory_name: String,
}

impl AppState {
    pub fn new(assembly: AgentAssembly, memory_name: impl Into<String>) -> Self {
        Self {
            runtime: Arc::new(assembly.runtime),
            configuration: assembly.configuration,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            memory_name: memory_name.into(),
        }
    }

    pub fn configuration(&self) -> &AgentConfiguration {
        &self.configuration
    }

    pub fn memory_name(&self) -> &str {
        &self.memory_name
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn session(&self, id: &str) -> Option<SessionSlot> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Drops conversations with no turn for at least `idle` as of `now`.
    /// A session whose turn is still running is never dropped.
    pub async fn expire_idle(&self, now: Instant, idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, slot| match slot.try_lock() {
            Ok(live) if now.saturating_duration_since(live.last_active) >= idle => {
                info!(
                    event_name = "server.conversation.expired",
                    session_id = %id,
                    idle_secs = idle.as_secs(),
                    email_sent = live.session.context().email_sent,
                    "idle conversation released"
                );
                false
            }
            _ => true,
        });
        before - sessions.len()
    }
}

/// Periodically releases conversations idle for longer than `idle`.
pub fn spawn_idle_sweep(state: AppState, idle: Duration) -> JoinHandle<()> {
    let period = (idle / 4).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(period);
        loop {
            ticks.tick().await;
            let expired = state.expire_idle(Instant::now(), idle).await;
            if expired > 0 {
                let remaining = state.session_count().await;
                info!(
                    event_name = "server.conversation.sweep",
                    expired,
                    remaining,
                    "idle sweep finished"
                );
            }
        }
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/v1/conversations", post(create_conversation))
        .route("/api/v1/conversations/{id}", delete(end_conversation))
        .route("/api/v1/conversations/{id}/messages", post(send_message))
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationCreated {
    pub conversation_id: String,
    pub state: FlowState,
    pub pipe: String,
    pub policy_version: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: &'static str,
    correlation_id: String,
}

/// Interface errors rendered with their user-safe message only.
pub struct ApiError(pub InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match &self.0 {
            InterfaceError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
            InterfaceError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            InterfaceError::ServiceUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        let body = ErrorBody {
            error,
            message: self.0.user_message(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

fn not_found(id: &str) -> ApiError {
    ApiError(InterfaceError::NotFound {
        message: format!("conversation `{id}` does not exist"),
        correlation_id: id.to_string(),
    })
}

async fn create_conversation(State(state): State<AppState>) -> (StatusCode, Json<ConversationCreated>) {
    let session = state.runtime.start_session(Arc::clone(&state.configuration));
    let created = ConversationCreated {
        conversation_id: session.id().to_string(),
        state: session.state().clone(),
        pipe: session.configuration().name.clone(),
        policy_version: session.configuration().policy_version.clone(),
        started_at: session.started_at(),
    };
    let live = LiveSession { session, last_active: Instant::now() };
    state.sessions.write().await.insert(created.conversation_id.clone(), Arc::new(Mutex::new(live)));
    info!(
        event_name = "server.conversation.created",
        session_id = %created.conversation_id,
        "conversation created"
    );
    (StatusCode::CREATED, Json(created))
}

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<TurnReply>, ApiError> {
    let text = request.text.trim();
    if text.is_empty() || text.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError(InterfaceError::BadRequest {
            message: format!("message text must be 1..={MAX_MESSAGE_CHARS} characters"),
            correlation_id: id,
        }));
    }

    let session = state.session(&id).await.ok_or_else(|| not_found(&id))?;
    // Held for the whole turn so turns within one conversation never overlap.
    let mut live = session.lock().await;
    let result = state.runtime.handle_turn(&mut live.session, text).await;
    live.last_active = Instant::now();
    match result {
        Ok(reply) => Ok(Json(reply)),
        Err(error) => {
            warn!(
                event_name = "server.conversation.turn_failed",
                session_id = %id,
                error = %error,
                "turn failed"
            );
            Err(ApiError(error.into_interface(id)))
        }
    }
}

async fn end_conversation(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    match state.sessions.write().await.remove(&id) {
        Some(_) => {
            info!(event_name = "server.conversation.ended", session_id = %id, "conversation released");
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(not_found(&id)),
    }
}
