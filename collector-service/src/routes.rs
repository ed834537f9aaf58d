//! 路由定义

use axum::{routing::get, Router};

use crate::handlers;
use crate::state::AppState;

/// Creates the service routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/metrics", get(handlers::latest_metrics))
}
