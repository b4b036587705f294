//! HTTP middleware: actor context.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use rcaflow_engine::WorkflowError;
use rcaflow_model::{Actor, Role, UserId};

use super::error::ApiError;
use super::state::AppState;

pub(crate) const ACTOR_ID_HEADER: &str = "x-actor-id";
pub(crate) const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Resolve the caller from `X-Actor-Id` / `X-Actor-Role` and attach it as
/// a request extension.
///
/// The auth collaborator in front of this service is trusted to set both
/// headers. Missing or malformed context is `401`; /health is exempt.
pub(crate) async fn actor_middleware(
    State(_state): State<Arc<AppState>>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    match actor_from_headers(request.headers()) {
        Some(actor) => {
            request.extensions_mut().insert(actor);
            next.run(request).await
        }
        None => ApiError::from(WorkflowError::Unauthorized).into_response(),
    }
}

fn actor_from_headers(headers: &HeaderMap) -> Option<Actor> {
    let id: UserId = headers
        .get(ACTOR_ID_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()?;
    let role: Role = match headers.get(ACTOR_ROLE_HEADER) {
        Some(value) => value.to_str().ok()?.trim().parse().ok()?,
        None => Role::User,
    };
    Some(Actor::new(id, role))
}
