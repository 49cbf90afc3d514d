use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::{Request, header::HeaderName},
    middleware,
    routing::get,
};
use serde::Serialize;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::{DefaultOnFailure, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, field};
use utils::build_info::BUILD_INFO;

use crate::{
    AppState,
    auth::{require_admin, require_manager, require_session},
};

mod access;
mod comments;
mod departments;
pub mod error;
mod identity;
mod notifications;
mod projects;
mod schedule;
mod tags;
mod tasks;

pub fn router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            let request_id = request
                .extensions()
                .get::<RequestId>()
                .and_then(|id| id.header_value().to_str().ok());
            let span = tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = field::Empty
            );
            if let Some(request_id) = request_id {
                span.record("request_id", field::display(request_id));
            }
            span
        })
        .on_response(DefaultOnResponse::new().level(Level::INFO))
        .on_failure(DefaultOnFailure::new().level(Level::ERROR));

    let v1_public = Router::<AppState>::new().route("/health", get(health));

    let manager_only = Router::<AppState>::new()
        .merge(projects::manager_router())
        .merge(tasks::manager_router())
        .merge(departments::manager_router())
        .route_layer(middleware::from_fn(require_manager));

    let admin_only = Router::<AppState>::new()
        .merge(departments::admin_router())
        .route_layer(middleware::from_fn(require_admin));

    let v1_protected = Router::<AppState>::new()
        .merge(identity::router())
        .merge(departments::router())
        .merge(projects::router())
        .merge(tasks::router())
        .merge(comments::router())
        .merge(tags::router())
        .merge(notifications::router())
        .merge(schedule::router())
        .merge(manager_only)
        .merge(admin_only)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::<AppState>::new()
        .nest("/v1", v1_public)
        .nest("/v1", v1_protected)
        .layer(CorsLayer::permissive())
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            "x-request-id",
        )))
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static("x-request-id"),
            MakeRequestUuid {},
        ))
        .with_state(state)
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub git_commit: &'static str,
    pub git_branch: &'static str,
    pub build_timestamp: &'static str,
    pub database_ready: bool,
}

/// Past this the database counts as unavailable.
const HEALTH_DB_TIMEOUT: Duration = Duration::from_secs(2);

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let probe = sqlx::query("SELECT 1").fetch_one(state.pool());
    let database_ready = matches!(
        tokio::time::timeout(HEALTH_DB_TIMEOUT, probe).await,
        Ok(Ok(_))
    );

    Json(HealthResponse {
        status: if database_ready { "ok" } else { "degraded" },
        version: BUILD_INFO.version,
        git_commit: BUILD_INFO.git_commit,
        git_branch: BUILD_INFO.git_branch,
        build_timestamp: BUILD_INFO.build_timestamp,
        database_ready,
    })
}
