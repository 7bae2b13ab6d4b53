use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{optional_owner, require_owner};

use super::handlers::{
    create_link, get_analytics, health_check, list_links, logout, profile, AppState,
};

pub fn create_api_router(state: Arc<AppState>) -> Router {
    let protected_routes = Router::new()
        .route("/api/links", post(create_link).get(list_links))
        .route("/api/profile", get(profile))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.auth),
            require_owner,
        ));

    let viewer_routes = Router::new()
        .route("/api/links/{code}/analytics", get(get_analytics))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.auth),
            optional_owner,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/logout", post(logout))
        .merge(protected_routes)
        .merge(viewer_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
