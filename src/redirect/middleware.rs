use axum::{extract::Request, http::HeaderName, middleware::Next, response::Response};
use std::time::Instant;

/// Reports milliseconds spent serving a redirect
pub const TIMING_HEADER: HeaderName = HeaderName::from_static("x-snaplink-timing-ms");

/// When the redirect listener first saw the request.
#[derive(Copy, Clone, Debug)]
pub struct RequestStart(pub Instant);

impl RequestStart {
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.0.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Stamp the request on arrival; handlers read it back as `Extension<RequestStart>`.
pub async fn track_timing(mut request: Request, next: Next) -> Response {
    request
        .extensions_mut()
        .insert(RequestStart(Instant::now()));
    next.run(request).await
}
