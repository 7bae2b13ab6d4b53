use axum::{
    extract::{Path, State},
    http::{header::SET_COOKIE, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Extension, Json,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use super::extract::CreateLinkPayload;
use super::render::ViewRenderer;
use crate::auth::{AuthService, OwnerId, Viewer};
use crate::models::{CreateLinkResponse, LinkAnalytics, LinkSummary};
use crate::service::{LinkError, LinkService};

pub struct AppState {
    pub service: Arc<LinkService>,
    pub auth: Arc<AuthService>,
    pub renderer: Arc<dyn ViewRenderer>,
    /// Prefix for full short URLs, without a trailing slash
    pub redirect_base_url: String,
}

impl AppState {
    fn short_url(&self, code: &str) -> String {
        format!("{}/{}", self.redirect_base_url.trim_end_matches('/'), code)
    }
}

/// Create a short link owned by the caller
pub async fn create_link(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<OwnerId>,
    CreateLinkPayload(payload): CreateLinkPayload,
) -> Result<(StatusCode, Json<CreateLinkResponse>), LinkError> {
    let destination = payload.url.unwrap_or_default();
    let link = state
        .service
        .create_short_link(&destination, owner.as_str())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateLinkResponse {
            short_url: state.short_url(&link.code),
            code: link.code,
            destination: link.destination,
        }),
    ))
}

/// Render the caller's links
pub async fn list_links(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<OwnerId>,
) -> Result<Response, LinkError> {
    let links: Vec<LinkSummary> = state
        .service
        .list_links(owner.as_str())
        .await?
        .into_iter()
        .map(|link| LinkSummary {
            short_url: state.short_url(&link.code),
            code: link.code,
            destination: link.destination,
            click_count: link.click_count,
            created_at: link.created_at,
        })
        .collect();

    Ok(state.renderer.render(
        "urls",
        json!({
            "owner": owner.as_str(),
            "links": links,
        }),
    ))
}

pub async fn get_analytics(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Extension(viewer): Extension<Viewer>,
) -> Result<Json<LinkAnalytics>, LinkError> {
    let analytics = state.service.get_analytics(&code, viewer.owner()).await?;
    Ok(Json(analytics))
}

/// Render the caller's profile with their link totals
pub async fn profile(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<OwnerId>,
) -> Result<Response, LinkError> {
    let summary = state.service.owner_summary(owner.as_str()).await?;

    Ok(state.renderer.render(
        "profile",
        json!({
            "owner": owner.as_str(),
            "total_links": summary.total_links,
            "total_clicks": summary.total_clicks,
        }),
    ))
}

/// Expire the auth cookie and send the caller home
pub async fn logout(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ([(SET_COOKIE, state.auth.clear_cookie())], Redirect::to("/"))
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "OK" })
}
