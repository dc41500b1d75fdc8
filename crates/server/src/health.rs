use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;

use crate::conversations::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub memory_name: String,
    pub pipe_name: String,
    pub policy_version: String,
    pub model: String,
    pub active_conversations: usize,
    pub checked_at: String,
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let configuration = state.configuration();
    let payload = HealthResponse {
        status: "ready",
        memory_name: state.memory_name().to_string(),
        pipe_name: configuration.name.clone(),
        policy_version: configuration.policy_version.clone(),
        model: configuration.model.clone(),
        active_conversations: state.session_count().await,
        checked_at: Utc::now().to_rfc3339(),
    };
    (StatusCode::OK, Json(payload))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use crate::conversations::router;
    use crate::conversations::tests::{call, test_state};

    #[tokio::test]
    async fn health_reports_the_bound_configuration() {
        let app = router(test_state());

        let (status, payload) = call(&app, Method::GET, "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["status"], "ready");
        assert_eq!(payload["memory_name"], "advocado-memory");
        assert_eq!(payload["pipe_name"], "advocado");
        assert_eq!(payload["policy_version"], "advocate-v2");
        assert_eq!(payload["active_conversations"], 0);
    }
}
