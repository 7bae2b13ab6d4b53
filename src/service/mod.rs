//! Link resolution service
//!
//! Orchestrates the generator, the link store and the visit recorder. Owner
//! identity is always passed in explicitly by the caller.

mod error;

pub use error::{ErrorResponse, LinkError};

use std::sync::Arc;
use tracing::{debug, error, info};
use url::Url;

use crate::analytics::{summarize_owner, OwnerSummary, VisitRecorder};
use crate::models::{Link, LinkAnalytics, Visit, VisitContext};
use crate::shortener::{is_valid_code, CodeGenerator};
use crate::storage::{now_millis, LinkStore, StorageError};

/// Default bound on create attempts when generated codes collide
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Outcome of a single insert attempt
enum CreateAttempt {
    Created(Link),
    Duplicate,
}

pub struct LinkService {
    store: Arc<dyn LinkStore>,
    generator: Arc<dyn CodeGenerator>,
    recorder: Arc<VisitRecorder>,
    max_attempts: u32,
    owner_only_analytics: bool,
}

impl LinkService {
    pub fn new(
        store: Arc<dyn LinkStore>,
        generator: Arc<dyn CodeGenerator>,
        recorder: Arc<VisitRecorder>,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            generator,
            recorder,
            max_attempts: max_attempts.max(1),
            owner_only_analytics: false,
        }
    }

    /// Restrict [`get_analytics`](Self::get_analytics) to the link's owner.
    pub fn with_owner_only_analytics(mut self, enabled: bool) -> Self {
        self.owner_only_analytics = enabled;
        self
    }

    pub fn recorder(&self) -> &Arc<VisitRecorder> {
        &self.recorder
    }

    /// Create a link for `owner` under a freshly generated code.
    pub async fn create_short_link(&self, destination: &str, owner: &str) -> Result<Link, LinkError> {
        let destination = validate_destination(destination)?;
        if owner.trim().is_empty() {
            return Err(LinkError::validation("owner", "owner identity is required"));
        }

        for attempt in 1..=self.max_attempts {
            let code = self.generator.generate();

            match self.try_create(&code, &destination, owner).await? {
                CreateAttempt::Created(link) => {
                    info!(short_code = %link.code, owner = %owner, attempt, "short link created");
                    return Ok(link);
                }
                CreateAttempt::Duplicate => {
                    debug!(short_code = %code, attempt, "short code already taken, retrying");
                }
            }
        }

        error!(
            owner = %owner,
            attempts = self.max_attempts,
            "exhausted short code attempts, check generator length and store health"
        );
        Err(LinkError::ExhaustedRetries {
            attempts: self.max_attempts,
        })
    }

    async fn try_create(
        &self,
        code: &str,
        destination: &str,
        owner: &str,
    ) -> Result<CreateAttempt, LinkError> {
        match self.store.create_with_code(code, destination, owner).await {
            Ok(link) => Ok(CreateAttempt::Created(link)),
            Err(StorageError::Conflict) => Ok(CreateAttempt::Duplicate),
            Err(StorageError::NotFound) => Err(store_failure(
                "create",
                code,
                anyhow::anyhow!("store reported missing link on insert"),
            )),
            Err(StorageError::Other(err)) => Err(store_failure("create", code, err)),
        }
    }

    /// Look up the destination for `code` and enqueue the visit.
    ///
    /// The visit is recorded in the background; its outcome never affects the
    /// returned destination.
    pub async fn resolve(&self, code: &str, context: VisitContext) -> Result<String, LinkError> {
        if !is_valid_code(code) {
            return Err(LinkError::NotFound);
        }

        let link = self
            .store
            .get(code)
            .await
            .map_err(|err| store_failure("resolve", code, err))?
            .ok_or(LinkError::NotFound)?;

        self.recorder.record(
            &link.code,
            Visit {
                visited_at: now_millis(),
                user_agent: context.user_agent,
                ip_address: context.ip_address,
            },
        );

        Ok(link.destination)
    }

    /// Click totals and visit history for `code`.
    ///
    /// `viewer` is only consulted when owner-only analytics is enabled; any
    /// other viewer then gets `NotFound` so link existence is not leaked.
    pub async fn get_analytics(
        &self,
        code: &str,
        viewer: Option<&str>,
    ) -> Result<LinkAnalytics, LinkError> {
        if !is_valid_code(code) {
            return Err(LinkError::NotFound);
        }

        let (link, visit_history) = self
            .store
            .analytics(code)
            .await
            .map_err(|err| store_failure("analytics", code, err))?
            .ok_or(LinkError::NotFound)?;

        if self.owner_only_analytics && viewer != Some(link.owner.as_str()) {
            debug!(short_code = %code, "analytics requested by non-owner");
            return Err(LinkError::NotFound);
        }

        Ok(LinkAnalytics {
            code: link.code,
            destination: link.destination,
            total_clicks: link.click_count,
            visit_history,
        })
    }

    pub async fn list_links(&self, owner: &str) -> Result<Vec<Link>, LinkError> {
        self.store.list_by_owner(owner).await.map_err(|err| {
            error!(owner = %owner, error = %err, "failed to list links");
            LinkError::StoreUnavailable(err)
        })
    }

    pub async fn owner_summary(&self, owner: &str) -> Result<OwnerSummary, LinkError> {
        summarize_owner(self.store.as_ref(), owner)
            .await
            .map_err(|err| {
                error!(owner = %owner, error = %err, "failed to summarize owner");
                LinkError::StoreUnavailable(err)
            })
    }
}

fn store_failure(operation: &'static str, code: &str, err: anyhow::Error) -> LinkError {
    error!(operation, short_code = %code, error = %err, "link store failure");
    LinkError::StoreUnavailable(err)
}

/// Trim and check a destination. Only absolute http(s) URLs are accepted.
pub fn validate_destination(raw: &str) -> Result<String, LinkError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(LinkError::validation("url", "URL is required"));
    }

    let parsed = Url::parse(trimmed)
        .map_err(|_| LinkError::validation("url", "URL must be absolute, e.g. https://example.com"))?;

    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(LinkError::validation(
            "url",
            "URL must use http or https and include a host",
        ));
    }

    // Stored verbatim and later sent as a Location header
    if !trimmed.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(LinkError::validation(
            "url",
            "URL contains characters that must be percent-encoded",
        ));
    }

    Ok(trimmed.to_string())
}
