//! HTTP Interface
//!
//! axum handlers for event ingestion, batch builds, anchoring, and
//! verification. Handlers stay thin: validation and lifecycle logic live in
//! the components they call.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::anchor::AnchorClient;
use crate::batch::BatchBuilder;
use crate::config::AppConfig;
use crate::error::AuditError;
use crate::event::NewEvent;
use crate::merkle::MerkleTree;
use crate::store::Store;
use crate::verify::VerificationEngine;

pub struct AppState {
    pub config: AppConfig,
    pub store: Store,
    pub batcher: BatchBuilder,
    pub anchors: AnchorClient,
    pub verifier: VerificationEngine,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/events", post(create_event).get(list_events))
        .route("/events/:id", get(get_event))
        .route("/batches", post(build_batch).get(list_batches))
        .route("/batches/:id", get(get_batch))
        .route("/batches/:id/proofs/:event_id", get(get_proof))
        .route("/anchors", post(submit_anchor))
        .route("/anchors/:batch_id", get(get_anchor))
        .route("/anchors/:batch_id/await", post(await_anchor))
        .route("/verify", post(verify))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        )
        .with_state(state)
}

/// Error envelope: HTTP status per error class, structured detail for audit.
pub struct ApiError(AuditError);

impl From<AuditError> for ApiError {
    fn from(err: AuditError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            AuditError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            AuditError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AuditError::NoEligibleEvents => (StatusCode::CONFLICT, "no_eligible_events"),
            AuditError::LedgerUnavailable(_) => (StatusCode::BAD_GATEWAY, "ledger_unavailable"),
            AuditError::IntegrityMismatch { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "integrity_mismatch")
            }
            AuditError::Database(_) | AuditError::Config(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        let body = Json(serde_json::json!({
            "error": kind,
            "detail": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "auditchain",
        "timestamp": chrono::Utc::now(),
    }))
}

async fn create_event(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewEvent>,
) -> Result<impl IntoResponse, ApiError> {
    let fields = payload.into_fields()?;
    let event = state.store.insert_event(&fields).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

#[derive(Deserialize)]
struct Pagination {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    100
}

async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(page): Query<Pagination>,
) -> Result<impl IntoResponse, ApiError> {
    let events = state.store.list_events(page.limit, page.offset).await?;
    Ok(Json(events))
}

async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let event = state
        .store
        .get_event(id)
        .await?
        .ok_or_else(|| AuditError::not_found(format!("Event {}", id)))?;
    Ok(Json(event))
}

#[derive(Deserialize, Default)]
struct BuildBatchRequest {
    #[serde(default)]
    event_ids: Option<Vec<i64>>,
}

async fn build_batch(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BuildBatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let batch = state.batcher.build(payload.event_ids).await?;
    Ok((StatusCode::CREATED, Json(batch)))
}

async fn list_batches(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.list_batches().await?))
}

async fn get_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let batch = state
        .store
        .get_batch(&id)
        .await?
        .ok_or_else(|| AuditError::not_found(format!("Batch {}", id)))?;
    Ok(Json(batch))
}

async fn get_proof(
    State(state): State<Arc<AppState>>,
    Path((batch_id, event_id)): Path<(String, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let members = state.store.batch_leaves(&batch_id).await?;
    let index = members
        .iter()
        .position(|(id, _)| *id == event_id)
        .ok_or_else(|| {
            AuditError::not_found(format!("Event {} in batch {}", event_id, batch_id))
        })?;

    let leaves: Vec<String> = members.into_iter().map(|(_, leaf)| leaf).collect();
    let proof = MerkleTree::build(&leaves)?.prove(index)?;

    Ok(Json(serde_json::json!({
        "batch_id": batch_id,
        "event_id": event_id,
        "proof": proof,
    })))
}

#[derive(Deserialize)]
struct AnchorRequest {
    batch_id: String,
    merkle_root: String,
}

async fn submit_anchor(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AnchorRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let anchor = state
        .anchors
        .submit(&payload.batch_id, &payload.merkle_root)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(anchor)))
}

async fn get_anchor(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let anchor = state
        .store
        .get_anchor_for_batch(&batch_id)
        .await?
        .ok_or_else(|| AuditError::not_found(format!("Anchor for batch {}", batch_id)))?;
    Ok(Json(anchor))
}

async fn await_anchor(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let anchor = state.anchors.await_confirmation(&batch_id).await?;
    Ok(Json(anchor))
}

#[derive(Deserialize)]
struct VerifyRequest {
    event_id: Option<i64>,
    metadata: Option<NewEvent>,
    metadata_hash: Option<String>,
}

async fn verify(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VerifyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let report = match (payload.event_id, payload.metadata) {
        (Some(event_id), None) => state.verifier.verify_event(event_id).await?,
        (None, Some(metadata)) => {
            let claimed = payload.metadata_hash.ok_or_else(|| {
                AuditError::validation("metadata verification requires metadata_hash")
            })?;
            state.verifier.verify_metadata(metadata, &claimed).await?
        }
        _ => {
            return Err(AuditError::validation(
                "Provide either event_id or metadata with metadata_hash",
            )
            .into())
        }
    };
    Ok(Json(report))
}
