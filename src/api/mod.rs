pub mod chat;
pub mod repo;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::models::HealthResponse;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/load-repo", post(repo::load_repo))
        .route("/files", post(repo::files))
        .route("/chat", post(chat::chat))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        store: state.store.kind().to_string(),
        sessions: state.sessions.len(),
        last_load: state.sessions.latest_load(),
    })
}

/// Unwrap a JSON body, reporting any rejection as a missing body.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(rejection) => {
            tracing::debug!("Rejected request body: {rejection}");
            Err(AppError::validation("No JSON data provided"))
        }
    }
}

/// A present, non-blank field.
fn required(field: Option<String>) -> Option<String> {
    field.filter(|v| !v.trim().is_empty())
}
