// src/control/routes.rs

//! Administrative routes served on the control endpoint.
//!
//! Every action only posts into the [`SupervisorHandle`], exactly like a
//! signal would; `/stats` reads the runner's snapshot.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::any,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower::limit::GlobalConcurrencyLimitLayer;
use tracing::{debug, info, warn};

use crate::errors::LaunchError;
use crate::launcher::state::SupervisorHandle;
use crate::runner::Runner;

const BEARER_PREFIX: &str = "Bearer ";

/// Requests handled at once on the control endpoint.
pub const MAX_ACTIVE_HANDLERS: usize = 1;

/// Shared state handed to every control handler.
#[derive(Clone)]
pub struct ControlState {
    supervisor: SupervisorHandle,
    runner: Arc<dyn Runner>,
    auth_token: Option<Arc<str>>,
}

impl ControlState {
    /// An empty token or the literal `none` disables authentication.
    pub fn new(
        supervisor: SupervisorHandle,
        runner: Arc<dyn Runner>,
        auth_token: Option<String>,
    ) -> Self {
        let auth_token = auth_token
            .filter(|t| !t.is_empty() && t != "none")
            .map(Arc::from);
        Self {
            supervisor,
            runner,
            auth_token,
        }
    }

    pub fn requires_auth(&self) -> bool {
        self.auth_token.is_some()
    }
}

pub fn router(state: ControlState) -> Router {
    Router::new()
        .route("/stop", any(stop))
        .route("/halt", any(halt))
        .route("/restart", any(restart))
        .route("/phased-restart", any(phased_restart))
        .route("/reload-worker-directory", any(reload_worker_directory))
        .route("/reopen-logs", any(reopen_logs))
        .route("/stats", any(stats))
        .fallback(unsupported)
        .layer(middleware::from_fn_with_state(state.clone(), require_token))
        .layer(GlobalConcurrencyLimitLayer::new(MAX_ACTIVE_HANDLERS))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Accepts the token as `?token=` or as a bearer `Authorization` header.
async fn require_token(
    State(state): State<ControlState>,
    Query(query): Query<TokenQuery>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if let Some(expected) = state.auth_token.as_deref() {
        let presented = query.token.or_else(|| {
            request
                .headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|h| h.strip_prefix(BEARER_PREFIX))
                .map(|t| t.trim().to_string())
        });
        if presented.as_deref() != Some(expected) {
            let err = LaunchError::AuthenticationFailure;
            warn!(path = %path, "control request rejected: {err}");
            return (StatusCode::FORBIDDEN, Json(json!({ "error": err.to_string() })))
                .into_response();
        }
    }

    info!(path = %path, "control command");
    let response = next.run(request).await;
    debug!(path = %path, status = %response.status(), "control response");
    response
}

fn accepted(message: &str) -> Json<Value> {
    Json(json!({ "message": message }))
}

async fn stop(State(state): State<ControlState>) -> Json<Value> {
    state.supervisor.stop();
    accepted("stopping")
}

async fn halt(State(state): State<ControlState>) -> Json<Value> {
    state.supervisor.halt();
    accepted("halting")
}

async fn restart(State(state): State<ControlState>) -> Json<Value> {
    state.supervisor.restart();
    accepted("restarting")
}

async fn phased_restart(State(state): State<ControlState>) -> Json<Value> {
    state.supervisor.phased_restart();
    accepted("phased restart requested")
}

async fn reload_worker_directory(State(state): State<ControlState>) -> Json<Value> {
    state.supervisor.reload_worker_directory();
    accepted("worker directory reload requested")
}

async fn reopen_logs(State(state): State<ControlState>) -> Json<Value> {
    state.supervisor.reopen_logs();
    accepted("reopening logs")
}

async fn stats(State(state): State<ControlState>) -> Json<Value> {
    let mut stats = state.runner.stats();
    if let Some(obj) = stats.as_object_mut() {
        obj.insert(
            "state".to_string(),
            json!(state.supervisor.state().to_string()),
        );
    }
    Json(stats)
}

async fn unsupported() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Unsupported action" })),
    )
}
