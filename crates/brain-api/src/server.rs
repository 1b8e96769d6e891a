//! Turn API server: the HTTP surface over the Turn Pipeline.
//!
//! One process may host multiple tenants; `AppState::pipelines` holds
//! one `TurnPipeline` per `(brand_id, instance_id)`, matching P8's
//! structural tenant isolation — a request is routed to its tenant's
//! pipeline and can never reach another's.

use crate::auth::{AuthService, AuthenticatedCaller};
use crate::error::ApiError;
use crate::rate_limit::SessionLimiter;
use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use brain_cognitive::{TurnInput, TurnOutput, TurnPipeline};
use brain_core::{DlqEntry, DlqStore, QueueStore};
use brain_types::{BrainError, BrandId, InstanceId};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pipelines: Arc<HashMap<(BrandId, InstanceId), Arc<TurnPipeline>>>,
    pub dlq: Arc<dyn DlqStore>,
    pub queue: Arc<dyn QueueStore>,
    pub auth: Arc<AuthService>,
    pub limiter: Arc<SessionLimiter>,
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl FromRef<AppState> for Arc<SessionLimiter> {
    fn from_ref(state: &AppState) -> Self {
        state.limiter.clone()
    }
}

pub fn router(state: AppState) -> Router {
    let turns = Router::new()
        .route("/v1/sessions/:session_id/turns", post(submit_turn))
        .layer(middleware::from_fn_with_state(state.limiter.clone(), crate::rate_limit::limit_by_session));

    Router::new()
        .route("/health", get(health))
        .route("/v1/dlq", get(list_dlq))
        .route("/v1/dlq/:dlq_id/resolve", post(resolve_dlq))
        .merge(turns)
        .layer(middleware::from_fn(crate::logging::trace_requests))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

async fn submit_turn(
    State(state): State<AppState>,
    caller: AuthenticatedCaller,
    Path(session_id): Path<String>,
    Json(mut input): Json<TurnInput>,
) -> std::result::Result<Json<TurnOutput>, ApiError> {
    if input.session_id.as_str() != session_id {
        return Err(BrainError::Validation("session_id in path and body must match".to_string()).into());
    }
    input.session_id = brain_types::SessionId::from(session_id.as_str());

    let pipeline = state
        .pipelines
        .get(&(caller.brand_id.clone(), caller.instance_id.clone()))
        .ok_or_else(|| BrainError::NotFound(format!("no pipeline for {}/{}", caller.brand_id, caller.instance_id)))?;

    let output = pipeline.process_turn(input, &caller.user, &HashMap::new()).await?;
    Ok(Json(output))
}

async fn list_dlq(State(state): State<AppState>, _caller: AuthenticatedCaller) -> std::result::Result<Json<Vec<DlqEntry>>, ApiError> {
    let entries = state.dlq.list_unresolved().await?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
struct ResolveDlqRequest {
    notes: String,
    #[serde(default)]
    retry: bool,
}

async fn resolve_dlq(
    State(state): State<AppState>,
    _caller: AuthenticatedCaller,
    Path(dlq_id): Path<String>,
    Json(body): Json<ResolveDlqRequest>,
) -> std::result::Result<StatusCode, ApiError> {
    let dlq_id: brain_types::DlqId = dlq_id
        .parse()
        .map_err(|_| BrainError::Validation("invalid dlq_id".to_string()))?;
    let mut entry = state
        .dlq
        .get(&dlq_id)
        .await?
        .ok_or_else(|| BrainError::NotFound(format!("dlq entry {dlq_id} not found")))?;

    // §4.9: `retry=true` requeues a fresh entry off the original before
    // the dlq entry itself is marked resolved, so the original's
    // queue_id stays a pointer to what was actually dead-lettered.
    if body.retry {
        if let Some(original) = state.queue.get(&entry.original_queue_id).await? {
            let retry_entry = entry.build_retry_entry(&original);
            state.queue.insert(&retry_entry).await?;
        }
    }

    entry.resolve(body.notes);
    state.dlq.update(&entry).await?;
    Ok(StatusCode::NO_CONTENT)
}
