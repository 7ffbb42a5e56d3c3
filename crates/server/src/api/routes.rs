use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::middleware::metrics_middleware;
use super::{audit, handlers, lotteries};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        // Lotteries
        .route("/lotteries/{id}/execute", post(lotteries::execute_lottery))
        .route("/lotteries/{id}/invalidate", post(lotteries::invalidate_lottery))
        // Audit
        .route("/lotteries/{id}/audits", get(audit::query_audits))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
