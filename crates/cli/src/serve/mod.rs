//! `rcaflow serve` -- HTTP JSON API over the investigation engine.
//!
//! The caller's identity arrives in `X-Actor-Id` / `X-Actor-Role`, set by
//! the auth collaborator in front of this service. Every route except
//! /health requires it.
//!
//! Endpoints:
//! - GET    /health
//! - GET    /users
//! - GET    /records                          POST /records
//! - GET    /records/{id}                     PATCH/DELETE /records/{id}
//! - GET    /records/{id}/audit
//! - POST   /records/{id}/start | start-ai | reanalyze | finalize
//! - POST   /records/{id}/return-to-investigation | close | reopen | owner
//! - POST   /records/{id}/root-causes         POST /records/{id}/action-items
//! - POST   /questions/{id}/answer
//! - POST   /root-cause-candidates/{id}/promote, PATCH /root-cause-candidates/{id}
//! - POST   /action-item-candidates/{id}/promote, PATCH /action-item-candidates/{id}
//! - PATCH  /root-causes/{id}                 DELETE /root-causes/{id}
//! - PATCH  /action-items/{id}                DELETE /action-items/{id}
//! - PATCH  /action-items/{id}/progress
//!
//! Failures use `{"error", "kind", "detail"}` bodies.

mod error;
mod findings;
mod handlers;
mod middleware;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::routing::{get, patch, post};
use axum::{middleware as axum_middleware, Router};
use rcaflow_engine::analysis::{AnalysisClient, DisabledAnalysis};
use rcaflow_engine::Engine;
use rcaflow_storage::MemoryStorage;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use self::findings::{
    handle_create_action_item, handle_create_final, handle_delete_action_item,
    handle_delete_final, handle_promote_action_item, handle_promote_root_cause,
    handle_relabel_action_item, handle_relabel_root_cause, handle_update_action_item,
    handle_update_final, handle_update_progress,
};
use self::handlers::{
    handle_answer_question, handle_audit_trail, handle_close, handle_create_record,
    handle_delete_record, handle_finalize, handle_get_record, handle_health, handle_list_records,
    handle_list_users, handle_not_found, handle_reanalyze, handle_reassign_owner, handle_reopen,
    handle_return_to_investigation, handle_start, handle_start_with_ai, handle_update_record,
};
use self::middleware::actor_middleware;
use self::state::AppState;
use crate::config::{AnalysisConfig, AnalysisProvider, Config};

/// Maximum request body size: 1 MB.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Build the analysis client named by the configuration.
///
/// A provider that cannot be constructed (e.g. no API key) degrades to the
/// disabled client so the manual workflow stays available.
fn analysis_client(config: &AnalysisConfig) -> (Arc<dyn AnalysisClient>, &'static str) {
    match config.provider {
        AnalysisProvider::Disabled => (Arc::new(DisabledAnalysis), "disabled"),
        #[cfg(feature = "anthropic")]
        AnalysisProvider::Anthropic => {
            match rcaflow_engine::analysis::AnthropicAnalysisClient::from_env(config.model.clone())
            {
                Ok(client) => (
                    Arc::new(client.with_max_tokens(config.max_tokens)),
                    "anthropic",
                ),
                Err(e) => {
                    warn!(error = %e, "analysis provider unavailable, AI-guided starts will fail");
                    (Arc::new(DisabledAnalysis), "disabled")
                }
            }
        }
        #[cfg(not(feature = "anthropic"))]
        AnalysisProvider::Anthropic => {
            warn!("built without the anthropic feature, AI-guided starts will fail");
            (Arc::new(DisabledAnalysis), "disabled")
        }
    }
}

pub(crate) fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/users", get(handle_list_users))
        .route(
            "/records",
            get(handle_list_records).post(handle_create_record),
        )
        .route(
            "/records/{id}",
            get(handle_get_record)
                .patch(handle_update_record)
                .delete(handle_delete_record),
        )
        .route("/records/{id}/audit", get(handle_audit_trail))
        .route("/records/{id}/start", post(handle_start))
        .route("/records/{id}/start-ai", post(handle_start_with_ai))
        .route("/records/{id}/reanalyze", post(handle_reanalyze))
        .route("/records/{id}/finalize", post(handle_finalize))
        .route(
            "/records/{id}/return-to-investigation",
            post(handle_return_to_investigation),
        )
        .route("/records/{id}/close", post(handle_close))
        .route("/records/{id}/reopen", post(handle_reopen))
        .route("/records/{id}/owner", post(handle_reassign_owner))
        .route("/records/{id}/root-causes", post(handle_create_final))
        .route("/records/{id}/action-items", post(handle_create_action_item))
        .route("/questions/{id}/answer", post(handle_answer_question))
        .route(
            "/root-cause-candidates/{id}",
            patch(handle_relabel_root_cause),
        )
        .route(
            "/root-cause-candidates/{id}/promote",
            post(handle_promote_root_cause),
        )
        .route(
            "/action-item-candidates/{id}",
            patch(handle_relabel_action_item),
        )
        .route(
            "/action-item-candidates/{id}/promote",
            post(handle_promote_action_item),
        )
        .route(
            "/root-causes/{id}",
            patch(handle_update_final).delete(handle_delete_final),
        )
        .route(
            "/action-items/{id}",
            patch(handle_update_action_item).delete(handle_delete_action_item),
        )
        .route("/action-items/{id}/progress", patch(handle_update_progress))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            actor_middleware,
        ))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Start the HTTP server and run until Ctrl+C.
pub async fn start_server(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let storage = Arc::new(MemoryStorage::with_users(config.seed_users()));
    let (analysis, analysis_provider) = analysis_client(&config.analysis);

    let state = Arc::new(AppState {
        engine: Engine::new(storage, analysis),
        analysis_provider,
    });
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        %addr,
        users = config.users.len(),
        analysis = analysis_provider,
        "rcaflow listening"
    );
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("received shutdown signal");
}
