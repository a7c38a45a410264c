//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::jobs::Gateway;
use crate::server::routes::{health_handler, status_handler, submit_handler};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub nats: async_nats::Client,
    pub gateway: Arc<Gateway>,
}

/// Build the Axum application router
pub fn build_app(pool: PgPool, nats: async_nats::Client, gateway: Arc<Gateway>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
        .allow_origin(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/submit/:kind", post(submit_handler))
        .route("/tasks/:task_id", get(status_handler))
        .layer(Extension(AppState {
            db_pool: pool,
            nats,
            gateway,
        }))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
