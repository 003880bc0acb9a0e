//! Invalidation endpoint for hosts that run outside this process.
//!
//! Content-mutation hooks are forwarded as `POST /hooks/{name}`; operators drive activation and
//! purges through the `/cache/*` routes.

mod middleware;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware as axum_middleware,
    routing::{get, post},
};
use serde::Serialize;
use tracing::debug;

use crate::application::error::AppError;
use crate::cache::InvalidationListener;

pub use middleware::log_responses;

#[derive(Clone)]
pub struct HookState {
    pub listener: InvalidationListener,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub active: bool,
    pub store: &'static str,
}

pub fn build_hook_router(state: HookState) -> Router {
    Router::new()
        .route("/hooks/{name}", post(forward_hook))
        .route("/cache/purge", post(purge_cache))
        .route("/cache/activate", post(activate_cache))
        .route("/cache/deactivate", post(deactivate_cache))
        .route("/health", get(health))
        .layer(axum_middleware::from_fn(log_responses))
        .with_state(state)
}

async fn forward_hook(
    State(state): State<HookState>,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    match state.listener.on_hook(&name).await? {
        Some(event) => {
            debug!(hook = %name, event = %event, "hook forwarded");
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(AppError::NotFound),
    }
}

async fn purge_cache(State(state): State<HookState>) -> Result<StatusCode, AppError> {
    state.listener.purge("manual").await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn activate_cache(State(state): State<HookState>) -> StatusCode {
    state.listener.activate();
    StatusCode::NO_CONTENT
}

async fn deactivate_cache(State(state): State<HookState>) -> Result<StatusCode, AppError> {
    state.listener.deactivate().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn health(State(state): State<HookState>) -> Json<HealthReport> {
    Json(HealthReport {
        active: state.listener.is_active(),
        store: state.listener.store_name(),
    })
}
