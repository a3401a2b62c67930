//! Route definitions.

use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::AppState;
use crate::auth::require_session;
use crate::handlers;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let sessions = state.sessions.clone();
    let timeout_secs = state.config.request_timeout_secs;

    // Public routes (no session)
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/login", get(handlers::login_page).post(handlers::login))
        .route("/logout", get(handlers::logout).post(handlers::logout))
        .with_state(state.clone());

    // Pages and JSON, answered from a single directory read
    let page_routes = Router::new()
        .route("/", get(handlers::index))
        .route("/browse", get(handlers::browse))
        .route("/api/list", get(handlers::api_list))
        .route("/api/roots", get(handlers::api_roots))
        .route_layer(middleware::from_fn_with_state(
            sessions.clone(),
            require_session,
        ))
        .with_state(state.clone());

    let short_routes = public_routes.merge(page_routes);
    let short_routes = if timeout_secs > 0 {
        short_routes.layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(timeout_secs),
        ))
    } else {
        short_routes
    };

    // Streaming transfers: no request timeout, per-file size limit enforced
    // while the body is written.
    let transfer_routes = Router::new()
        .route("/download", get(handlers::download))
        .route(
            "/upload",
            post(handlers::upload).layer(DefaultBodyLimit::disable()),
        )
        .route_layer(middleware::from_fn_with_state(sessions, require_session))
        .with_state(state);

    Router::new()
        .merge(short_routes)
        .merge(transfer_routes)
        .layer(trace_layer)
}
