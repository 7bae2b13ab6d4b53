use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A stored short link. Destination and owner never change after creation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Link {
    pub id: i64,
    pub code: String,
    pub destination: String,
    pub owner: String,
    pub click_count: i64,
    /// Unix milliseconds
    pub created_at: i64,
    /// Unix milliseconds of the last appended visit, or of creation
    pub updated_at: i64,
}

/// One appended visit. Rows are never updated once written.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Visit {
    pub visited_at: i64,
    pub user_agent: String,
    pub ip_address: String,
}

/// Caller-supplied details attached to a resolve.
#[derive(Debug, Clone, Default)]
pub struct VisitContext {
    pub user_agent: String,
    pub ip_address: String,
}

impl VisitContext {
    pub fn new(user_agent: impl Into<String>, ip_address: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            ip_address: ip_address.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LinkAnalytics {
    pub code: String,
    pub destination: String,
    pub total_clicks: i64,
    pub visit_history: Vec<Visit>,
}

/// Listing row for an owner's links page.
#[derive(Debug, Clone, Serialize)]
pub struct LinkSummary {
    pub code: String,
    pub short_url: String,
    pub destination: String,
    pub click_count: i64,
    pub created_at: i64,
}

/// `url` is optional so a missing or null destination reaches validation.
#[derive(Debug, Default, Deserialize)]
pub struct CreateLinkRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateLinkResponse {
    pub code: String,
    pub short_url: String,
    pub destination: String,
}
