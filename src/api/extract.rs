use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::header::CONTENT_TYPE,
    Form,
};
use tracing::debug;

use crate::models::CreateLinkRequest;
use crate::service::LinkError;

/// Create request posted either as JSON or as an HTML form.
///
/// Bodies are dispatched on `Content-Type`; anything that is not form encoded
/// is read as JSON. An empty body is a request without a destination, so it
/// fails destination validation rather than body parsing.
pub struct CreateLinkPayload(pub CreateLinkRequest);

impl<S> FromRequest<S> for CreateLinkPayload
where
    S: Send + Sync,
{
    type Rejection = LinkError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_form_encoded(&req) {
            let Form(payload) = Form::<CreateLinkRequest>::from_request(req, state)
                .await
                .map_err(|rejection| malformed_body(rejection.body_text()))?;
            return Ok(Self(payload));
        }

        let body = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| malformed_body(rejection.body_text()))?;

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(CreateLinkRequest::default()));
        }

        serde_json::from_slice(&body)
            .map(Self)
            .map_err(|err| malformed_body(err.to_string()))
    }
}

fn is_form_encoded(req: &Request) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| {
            mime.trim()
                .eq_ignore_ascii_case("application/x-www-form-urlencoded")
        })
}

fn malformed_body(reason: String) -> LinkError {
    debug!(reason = %reason, "unreadable create request body");
    LinkError::validation(
        "url",
        "Request body must be JSON or form data with a url field",
    )
}
