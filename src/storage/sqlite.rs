use crate::models::{Link, Visit};
use crate::storage::{now_millis, LinkStore, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

const LINK_COLUMNS: &str = "id, code, destination, owner, click_count, created_at, updated_at";

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    async fn fetch_link(&self, code: &str) -> Result<Option<Link>> {
        let link = sqlx::query_as::<_, Link>(&format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE code = ?"
        ))
        .bind(code)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(link)
    }
}

#[async_trait]
impl LinkStore for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL UNIQUE,
                destination TEXT NOT NULL,
                owner TEXT NOT NULL,
                click_count INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_links_owner ON links(owner)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS visits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL REFERENCES links(code),
                visited_at INTEGER NOT NULL,
                user_agent TEXT NOT NULL,
                ip_address TEXT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_visits_code ON visits(code, id)")
            .execute(self.pool.as_ref())
            .await?;

        // click_count always equals the number of visit rows
        sqlx::query(
            r#"
            CREATE TRIGGER IF NOT EXISTS trg_visits_bump_click_count
            AFTER INSERT ON visits
            BEGIN
                UPDATE links
                SET click_count = click_count + 1,
                    updated_at = NEW.visited_at
                WHERE code = NEW.code;
            END
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn create_with_code(
        &self,
        code: &str,
        destination: &str,
        owner: &str,
    ) -> StorageResult<Link> {
        let created_at = now_millis();

        let result = sqlx::query(
            r#"
            INSERT INTO links (code, destination, owner, click_count, created_at, updated_at)
            VALUES (?, ?, ?, 0, ?, ?)
            ON CONFLICT(code) DO NOTHING
            "#,
        )
        .bind(code)
        .bind(destination)
        .bind(owner)
        .bind(created_at)
        .bind(created_at)
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }

        self.fetch_link(code)
            .await?
            .ok_or_else(|| StorageError::Other(anyhow::anyhow!("link {code} vanished after insert")))
    }

    async fn get(&self, code: &str) -> Result<Option<Link>> {
        self.fetch_link(code).await
    }

    async fn record_visit(&self, code: &str, visit: &Visit) -> StorageResult<Link> {
        let result = sqlx::query(
            r#"
            INSERT INTO visits (code, visited_at, user_agent, ip_address)
            SELECT code, ?, ?, ? FROM links WHERE code = ?
            "#,
        )
        .bind(visit.visited_at)
        .bind(&visit.user_agent)
        .bind(&visit.ip_address)
        .bind(code)
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        self.fetch_link(code).await?.ok_or(StorageError::NotFound)
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<Link>> {
        let links = sqlx::query_as::<_, Link>(&format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE owner = ? ORDER BY id"
        ))
        .bind(owner)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(links)
    }

    async fn visits(&self, code: &str) -> Result<Vec<Visit>> {
        let visits = sqlx::query_as::<_, Visit>(
            r#"
            SELECT visited_at, user_agent, ip_address
            FROM visits
            WHERE code = ?
            ORDER BY id
            "#,
        )
        .bind(code)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(visits)
    }

    async fn analytics(&self, code: &str) -> Result<Option<(Link, Vec<Visit>)>> {
        // The read lock taken by the first SELECT is held until commit
        let mut tx = self.pool.begin().await?;

        let link = sqlx::query_as::<_, Link>(&format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE code = ?"
        ))
        .bind(code)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(link) = link else {
            tx.commit().await?;
            return Ok(None);
        };

        let visits = sqlx::query_as::<_, Visit>(
            r#"
            SELECT visited_at, user_agent, ip_address
            FROM visits
            WHERE code = ?
            ORDER BY id
            "#,
        )
        .bind(code)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some((link, visits)))
    }
}
