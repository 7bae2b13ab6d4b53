use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{health_check, redirect_link, RedirectState};
use super::middleware::track_timing;

pub fn create_redirect_router(state: Arc<RedirectState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/{code}", get(redirect_link))
        .layer(middleware::from_fn(track_timing))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
