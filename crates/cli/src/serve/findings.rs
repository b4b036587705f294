//! Finding curation routes: candidate promotion and relabeling, hand-written
//! root causes, action items and their progress.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use rcaflow_engine::{ActionItemDraft, ActionItemEdit, FinalDraft, FinalEdit, ItemProgress};
use rcaflow_model::{
    ActionItemCandidateId, ActionItemId, Actor, Confidence, Priority, RecordId,
    RootCauseCandidateId, RootCauseFinalId,
};
use serde::Deserialize;

use super::error::ApiError;
use super::handlers::parse_id;
use super::state::AppState;

// ── Candidates ───────────────────────────────────────────────────────────────

/// POST /root-cause-candidates/{id}/promote
pub(crate) async fn handle_promote_root_cause(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let candidate_id: RootCauseCandidateId = parse_id(&id, "root cause candidate")?;
    let final_ = state
        .engine
        .promotion()
        .promote_root_cause(candidate_id, &actor)
        .await?;
    Ok((StatusCode::CREATED, Json(final_)))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConfidenceRequest {
    confidence: Confidence,
}

/// PATCH /root-cause-candidates/{id}
pub(crate) async fn handle_relabel_root_cause(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    body: Result<Json<ConfidenceRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let candidate_id: RootCauseCandidateId = parse_id(&id, "root cause candidate")?;
    let Json(request) = body?;
    state
        .engine
        .promotion()
        .relabel_root_cause_candidate(candidate_id, &actor, request.confidence)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /action-item-candidates/{id}/promote
pub(crate) async fn handle_promote_action_item(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let candidate_id: ActionItemCandidateId = parse_id(&id, "action item candidate")?;
    let item = state
        .engine
        .promotion()
        .promote_action_item(candidate_id, &actor)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

#[derive(Debug, Deserialize)]
pub(crate) struct PriorityRequest {
    priority: Priority,
}

/// PATCH /action-item-candidates/{id}
pub(crate) async fn handle_relabel_action_item(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    body: Result<Json<PriorityRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let candidate_id: ActionItemCandidateId = parse_id(&id, "action item candidate")?;
    let Json(request) = body?;
    state
        .engine
        .promotion()
        .relabel_action_item_candidate(candidate_id, &actor, request.priority)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Root-cause finals ────────────────────────────────────────────────────────

/// POST /records/{id}/root-causes
pub(crate) async fn handle_create_final(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    body: Result<Json<FinalDraft>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let record_id: RecordId = parse_id(&id, "record")?;
    let Json(draft) = body?;
    let final_ = state
        .engine
        .promotion()
        .create_final(record_id, &actor, draft)
        .await?;
    Ok((StatusCode::CREATED, Json(final_)))
}

/// PATCH /root-causes/{id}
pub(crate) async fn handle_update_final(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    body: Result<Json<FinalEdit>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let final_id: RootCauseFinalId = parse_id(&id, "root cause")?;
    let Json(edit) = body?;
    let final_ = state
        .engine
        .promotion()
        .update_final(final_id, &actor, edit)
        .await?;
    Ok(Json(final_))
}

/// DELETE /root-causes/{id}
pub(crate) async fn handle_delete_final(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let final_id: RootCauseFinalId = parse_id(&id, "root cause")?;
    state.engine.promotion().delete_final(final_id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Action items ─────────────────────────────────────────────────────────────

/// POST /records/{id}/action-items
pub(crate) async fn handle_create_action_item(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    body: Result<Json<ActionItemDraft>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let record_id: RecordId = parse_id(&id, "record")?;
    let Json(draft) = body?;
    let item = state
        .engine
        .promotion()
        .create_action_item(record_id, &actor, draft)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// PATCH /action-items/{id}
pub(crate) async fn handle_update_action_item(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    body: Result<Json<ActionItemEdit>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let item_id: ActionItemId = parse_id(&id, "action item")?;
    let Json(edit) = body?;
    let item = state
        .engine
        .promotion()
        .update_action_item(item_id, &actor, edit)
        .await?;
    Ok(Json(item))
}

/// DELETE /action-items/{id}
pub(crate) async fn handle_delete_action_item(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let item_id: ActionItemId = parse_id(&id, "action item")?;
    state
        .engine
        .promotion()
        .delete_action_item(item_id, &actor)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /action-items/{id}/progress
pub(crate) async fn handle_update_progress(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    body: Result<Json<ItemProgress>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let item_id: ActionItemId = parse_id(&id, "action item")?;
    let Json(progress) = body?;
    let item = state
        .engine
        .promotion()
        .update_action_item_progress(item_id, &actor, progress)
        .await?;
    Ok(Json(item))
}
