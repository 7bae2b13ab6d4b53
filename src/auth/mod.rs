//! Owner identity gate
//!
//! Owners authenticate with an HS256 token carrying only an opaque subject.
//! The token travels in the auth cookie or an `Authorization: Bearer` header.

use anyhow::Context;
use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, COOKIE},
        HeaderMap,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::AuthConfig;
use crate::service::LinkError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Opaque owner identifier
    pub sub: String,
    pub iat: u64,
    pub exp: u64,
}

/// Authenticated owner attached to the request by the auth middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identity of the caller on routes that also serve anonymous visitors.
#[derive(Debug, Clone, Default)]
pub struct Viewer(pub Option<OwnerId>);

impl Viewer {
    pub fn owner(&self) -> Option<&str> {
        self.0.as_ref().map(OwnerId::as_str)
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no token presented")]
    Missing,
    #[error("token rejected: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
}

pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_ttl_secs: u64,
    cookie_name: String,
    login_url: String,
}

impl AuthService {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.token_secret.as_bytes();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            token_ttl_secs: config.token_ttl_secs,
            cookie_name: config.cookie_name.clone(),
            login_url: config.login_url.clone(),
        }
    }

    pub fn login_url(&self) -> &str {
        &self.login_url
    }

    /// Sign a token for `owner` valid for the configured window.
    pub fn issue_token(&self, owner: &str) -> anyhow::Result<String> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let claims = Claims {
            sub: owner.to_string(),
            iat: now,
            exp: now + self.token_ttl_secs,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("failed to sign owner token")
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }

    /// Resolve the owner from request headers, cookie first.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<OwnerId, AuthError> {
        let token = token_from_cookie(headers, &self.cookie_name)
            .or_else(|| token_from_bearer(headers))
            .ok_or(AuthError::Missing)?;

        let claims = self.verify_token(&token)?;
        if claims.sub.is_empty() {
            return Err(AuthError::Missing);
        }
        Ok(OwnerId(claims.sub))
    }

    /// `Set-Cookie` value that expires the auth cookie.
    pub fn clear_cookie(&self) -> String {
        format!(
            "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
            self.cookie_name
        )
    }
}

fn token_from_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

fn token_from_bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Reject unauthenticated requests with a redirect to the login page.
pub async fn require_owner(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    match auth.authenticate(request.headers()) {
        Ok(owner) => {
            request.extensions_mut().insert(owner);
            next.run(request).await
        }
        Err(err) => {
            debug!(path = %request.uri().path(), reason = %err, "authentication required");
            LinkError::AuthRequired {
                login_url: auth.login_url().to_string(),
            }
            .into_response()
        }
    }
}

/// Attach a [`Viewer`], anonymous unless a valid token is present.
pub async fn optional_owner(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    let viewer = match auth.authenticate(request.headers()) {
        Ok(owner) => Viewer(Some(owner)),
        Err(AuthError::Missing) => Viewer(None),
        Err(err) => {
            debug!(reason = %err, "ignoring invalid token");
            Viewer(None)
        }
    };
    request.extensions_mut().insert(viewer);
    next.run(request).await
}
