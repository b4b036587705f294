//! Core HTTP route handlers: health, users, records and record lifecycle.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use rcaflow_engine::{RecordEdit, WorkflowError};
use rcaflow_model::{Actor, QuestionId, RecordId, RecordIntake, UserId};
use serde::Deserialize;

use super::error::ApiError;
use super::state::AppState;

/// Parse an id from a path segment. An id that cannot exist is reported
/// the same way as one that does not.
pub(crate) fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError(WorkflowError::NotFound(format!("{what} {raw}"))))
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    ApiError(WorkflowError::NotFound("route".to_string()))
}

/// GET /health
pub(crate) async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "analysis_provider": state.analysis_provider,
    });
    (StatusCode::OK, Json(response))
}

/// GET /users
pub(crate) async fn handle_list_users(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let users = state.engine.list_users().await?;
    Ok(Json(serde_json::json!({ "users": users })))
}

// ── Records ──────────────────────────────────────────────────────────────────

/// GET /records
pub(crate) async fn handle_list_records(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let records = state.engine.list_records().await?;
    Ok(Json(serde_json::json!({ "records": records })))
}

/// POST /records
pub(crate) async fn handle_create_record(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    body: Result<Json<RecordIntake>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(intake) = body?;
    let record = state.engine.workflow().create_record(&actor, intake).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /records/{id}
pub(crate) async fn handle_get_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record_id: RecordId = parse_id(&id, "record")?;
    let view = state.engine.record_view(record_id).await?;
    Ok(Json(view))
}

/// PATCH /records/{id}
pub(crate) async fn handle_update_record(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    body: Result<Json<RecordEdit>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let record_id: RecordId = parse_id(&id, "record")?;
    let Json(edit) = body?;
    let record = state
        .engine
        .workflow()
        .update_record_details(record_id, &actor, edit)
        .await?;
    Ok(Json(record))
}

/// DELETE /records/{id}
pub(crate) async fn handle_delete_record(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record_id: RecordId = parse_id(&id, "record")?;
    state.engine.workflow().delete_record(record_id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /records/{id}/audit
pub(crate) async fn handle_audit_trail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record_id: RecordId = parse_id(&id, "record")?;
    // Deleted records keep their trail but are not visible here either.
    state.engine.record_view(record_id).await?;
    let events = state.engine.audit_trail(record_id).await?;
    Ok(Json(serde_json::json!({ "events": events })))
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

/// POST /records/{id}/start
pub(crate) async fn handle_start(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record_id: RecordId = parse_id(&id, "record")?;
    let record = state
        .engine
        .workflow()
        .start_investigation(record_id, &actor)
        .await?;
    Ok(Json(record))
}

/// POST /records/{id}/start-ai
pub(crate) async fn handle_start_with_ai(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record_id: RecordId = parse_id(&id, "record")?;
    state.engine.workflow().start_with_ai(record_id, &actor).await?;
    let view = state.engine.record_view(record_id).await?;
    Ok(Json(view))
}

/// POST /records/{id}/reanalyze
pub(crate) async fn handle_reanalyze(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record_id: RecordId = parse_id(&id, "record")?;
    let summary = state.engine.workflow().reanalyze(record_id, &actor).await?;
    Ok(Json(summary))
}

/// POST /records/{id}/finalize
pub(crate) async fn handle_finalize(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record_id: RecordId = parse_id(&id, "record")?;
    let record = state.engine.workflow().finalize(record_id, &actor).await?;
    Ok(Json(record))
}

/// POST /records/{id}/return-to-investigation
pub(crate) async fn handle_return_to_investigation(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record_id: RecordId = parse_id(&id, "record")?;
    let record = state
        .engine
        .workflow()
        .return_to_investigation(record_id, &actor)
        .await?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
pub(crate) struct CloseRequest {
    closing_notes: String,
}

/// POST /records/{id}/close
pub(crate) async fn handle_close(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    body: Result<Json<CloseRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let record_id: RecordId = parse_id(&id, "record")?;
    let Json(request) = body?;
    let record = state
        .engine
        .workflow()
        .close(record_id, &actor, &request.closing_notes)
        .await?;
    Ok(Json(record))
}

/// POST /records/{id}/reopen
pub(crate) async fn handle_reopen(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record_id: RecordId = parse_id(&id, "record")?;
    let record = state.engine.workflow().reopen(record_id, &actor).await?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
pub(crate) struct OwnerRequest {
    owner_user_id: UserId,
}

/// POST /records/{id}/owner
pub(crate) async fn handle_reassign_owner(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    body: Result<Json<OwnerRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let record_id: RecordId = parse_id(&id, "record")?;
    let Json(request) = body?;
    let record = state
        .engine
        .workflow()
        .reassign_owner(record_id, &actor, request.owner_user_id)
        .await?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnswerRequest {
    answer_text: String,
}

/// POST /questions/{id}/answer
pub(crate) async fn handle_answer_question(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    body: Result<Json<AnswerRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let question_id: QuestionId = parse_id(&id, "question")?;
    let Json(request) = body?;
    let question = state
        .engine
        .workflow()
        .answer_question(question_id, &actor, &request.answer_text)
        .await?;
    Ok(Json(question))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_ids_are_not_found() {
        let err = parse_id::<RecordId>("not-a-uuid", "record").unwrap_err();
        assert_eq!(err.0.to_string(), "record not-a-uuid not found");

        let id = RecordId::new();
        let parsed: RecordId = parse_id(&id.to_string(), "record").unwrap();
        assert_eq!(parsed, id);
    }
}
