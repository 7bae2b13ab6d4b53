use axum::{
    extract::{ConnectInfo, Path, State},
    http::{
        header::{HeaderMap, HeaderValue, LOCATION, USER_AGENT},
        StatusCode,
    },
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::error;

use super::middleware::{RequestStart, TIMING_HEADER};
use crate::analytics::extract_client_ip;
use crate::config::AnalyticsConfig;
use crate::models::VisitContext;
use crate::service::{LinkError, LinkService};

pub struct RedirectState {
    pub service: Arc<LinkService>,
    pub analytics_config: AnalyticsConfig,
}

/// Redirect to the destination of `code`
pub async fn redirect_link(
    State(state): State<Arc<RedirectState>>,
    Path(code): Path<String>,
    Extension(request_start): Extension<RequestStart>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let context = VisitContext {
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default()
            .to_string(),
        ip_address: extract_client_ip(&headers, addr.ip(), &state.analytics_config).to_string(),
    };

    match state.service.resolve(&code, context).await {
        Ok(destination) => {
            let Ok(location) = HeaderValue::from_str(&destination) else {
                error!(short_code = %code, "stored destination is not a valid Location header");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
            };

            let elapsed = HeaderValue::from(request_start.elapsed_ms());
            (
                StatusCode::FOUND,
                [(LOCATION, location), (TIMING_HEADER, elapsed)],
            )
                .into_response()
        }
        Err(LinkError::NotFound) => (StatusCode::NOT_FOUND, "Short link not found").into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "OK" })
}
