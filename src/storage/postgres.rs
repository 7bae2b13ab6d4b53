use crate::models::{Link, Visit};
use crate::storage::{now_millis, LinkStore, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

const LINK_COLUMNS: &str = "id, code, destination, owner, click_count, created_at, updated_at";

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl LinkStore for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                id BIGSERIAL PRIMARY KEY,
                code TEXT NOT NULL UNIQUE,
                destination TEXT NOT NULL,
                owner TEXT NOT NULL,
                click_count BIGINT NOT NULL DEFAULT 0,
                created_at BIGINT NOT NULL,
                updated_at BIGINT NOT NULL
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
                id BIGSERIAL PRIMARY KEY,
                code TEXT NOT NULL REFERENCES links(code),
                visited_at BIGINT NOT NULL,
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

        Ok(())
    }

    async fn create_with_code(
        &self,
        code: &str,
        destination: &str,
        owner: &str,
    ) -> StorageResult<Link> {
        let created_at = now_millis();

        let link = sqlx::query_as::<_, Link>(&format!(
            r#"
            INSERT INTO links (code, destination, owner, click_count, created_at, updated_at)
            VALUES ($1, $2, $3, 0, $4, $4)
            ON CONFLICT (code) DO NOTHING
            RETURNING {LINK_COLUMNS}
            "#
        ))
        .bind(code)
        .bind(destination)
        .bind(owner)
        .bind(created_at)
        .fetch_optional(self.pool.as_ref())
        .await?;

        link.ok_or(StorageError::Conflict)
    }

    async fn get(&self, code: &str) -> Result<Option<Link>> {
        let link = sqlx::query_as::<_, Link>(&format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(link)
    }

    async fn record_visit(&self, code: &str, visit: &Visit) -> StorageResult<Link> {
        // The row lock taken by the UPDATE serialises concurrent visits to one code.
        let link = sqlx::query_as::<_, Link>(&format!(
            r#"
            WITH bumped AS (
                UPDATE links
                SET click_count = click_count + 1,
                    updated_at = $4
                WHERE code = $1
                RETURNING {LINK_COLUMNS}
            ),
            appended AS (
                INSERT INTO visits (code, visited_at, user_agent, ip_address)
                SELECT code, $4, $2, $3 FROM bumped
            )
            SELECT {LINK_COLUMNS} FROM bumped
            "#
        ))
        .bind(code)
        .bind(&visit.user_agent)
        .bind(&visit.ip_address)
        .bind(visit.visited_at)
        .fetch_optional(self.pool.as_ref())
        .await?;

        link.ok_or(StorageError::NotFound)
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<Link>> {
        let links = sqlx::query_as::<_, Link>(&format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE owner = $1 ORDER BY id"
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
            WHERE code = $1
            ORDER BY id
            "#,
        )
        .bind(code)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(visits)
    }

    async fn analytics(&self, code: &str) -> Result<Option<(Link, Vec<Visit>)>> {
        let mut tx = self.pool.begin().await?;

        // Both SELECTs must see the same snapshot; READ COMMITTED takes a new one per statement
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let link = sqlx::query_as::<_, Link>(&format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE code = $1"
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
            WHERE code = $1
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
