//! Contents store server.
//!
//! Serves the contents API over a data directory. Reads go straight to
//! storage; every PUT and DELETE first passes the write gate, so a burst of
//! writers queues for a bounded time and the rest are turned away with 503.
//!
//! # Endpoints
//!
//! - `GET /health`: Health check endpoint (no auth required)
//! - `GET /me`: Returns the caller's name (auth required)
//! - `GET /contents/{path}`: File or directory listing (auth required)
//! - `PUT /contents/{path}`: Create or replace a file (auth required)
//! - `DELETE /contents/{path}`: Remove a file (auth required)

pub mod auth;
pub mod routes;
pub mod storage;

use axum::{
    http::{header, HeaderValue},
    middleware,
    routing::get,
    Router,
};
use repodoc_core::WriteGate;
use std::sync::Arc;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

pub use auth::{ApiKeyStore, AuthUser};
pub use storage::{Contents, PutOutcome, ServerStorage, ServerStorageError};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub api_keys: Arc<ApiKeyStore>,
    pub storage: Arc<ServerStorage>,
    pub gate: Arc<WriteGate>,
}

impl AppState {
    pub fn new(api_keys: ApiKeyStore, storage: ServerStorage, gate: WriteGate) -> Self {
        Self {
            api_keys: Arc::new(api_keys),
            storage: Arc::new(storage),
            gate: Arc::new(gate),
        }
    }
}

/// Builds the full application router.
pub fn router(state: AppState) -> Router {
    // Public routes (no auth)
    let public_routes = Router::new().route("/health", get(routes::health));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/me", get(routes::me))
        .route("/contents", get(routes::get_root))
        .route(
            "/contents/{*path}",
            get(routes::get_contents)
                .put(routes::put_contents)
                .delete(routes::delete_contents),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    // Responses must never be cached: a stale listing resurrects deleted documents
    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(TraceLayer::new_for_http())
}
