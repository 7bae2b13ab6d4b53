use crate::models::{Link, Visit};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("short code already exists")]
    Conflict,
    #[error("short code not found")]
    NotFound,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Other(err.into())
    }
}

/// Durable home for links and their visit history.
///
/// Every mutation is a single atomic statement against the backend; callers
/// never read-modify-write counters.
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Create tables, indices and triggers if they are missing
    async fn init(&self) -> Result<()>;

    /// Insert a link under `code`. Fails with [`StorageError::Conflict`] when the code is taken.
    async fn create_with_code(
        &self,
        code: &str,
        destination: &str,
        owner: &str,
    ) -> StorageResult<Link>;

    /// Point lookup, no side effects
    async fn get(&self, code: &str) -> Result<Option<Link>>;

    /// Append one visit and bump the click counter in one statement.
    /// Unknown codes return [`StorageError::NotFound`] and change nothing.
    async fn record_visit(&self, code: &str, visit: &Visit) -> StorageResult<Link>;

    /// All links created by `owner`, oldest first
    async fn list_by_owner(&self, owner: &str) -> Result<Vec<Link>>;

    /// Visit history of `code` in append order
    async fn visits(&self, code: &str) -> Result<Vec<Visit>>;

    /// The link and its visit history read from one snapshot, so
    /// `click_count` always equals the number of visits returned.
    async fn analytics(&self, code: &str) -> Result<Option<(Link, Vec<Visit>)>>;
}

/// Current time in Unix milliseconds, the resolution used for every stored timestamp.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
