use serde::Serialize;

use crate::storage::LinkStore;

/// Per-owner rollup shown on the profile page.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct OwnerSummary {
    pub total_links: i64,
    pub total_clicks: i64,
}

/// Recompute an owner's totals from the store. Nothing is cached.
pub async fn summarize_owner(store: &dyn LinkStore, owner: &str) -> anyhow::Result<OwnerSummary> {
    let links = store.list_by_owner(owner).await?;

    Ok(OwnerSummary {
        total_links: links.len() as i64,
        total_clicks: links.iter().map(|link| link.click_count).sum(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Visit;
    use crate::storage::SqliteStorage;

    #[tokio::test]
    async fn test_summary_sums_clicks_of_owned_links_only() {
        let store = SqliteStorage::new("sqlite::memory:", 5).await.unwrap();
        store.init().await.unwrap();

        for (code, owner) in [("aaaa1111", "alice"), ("bbbb2222", "alice"), ("cccc3333", "bob")] {
            store
                .create_with_code(code, "https://example.com", owner)
                .await
                .unwrap();
        }

        let visit = Visit {
            visited_at: 1,
            user_agent: String::new(),
            ip_address: "127.0.0.1".to_string(),
        };
        for (code, clicks) in [("aaaa1111", 2), ("bbbb2222", 3), ("cccc3333", 7)] {
            for _ in 0..clicks {
                store.record_visit(code, &visit).await.unwrap();
            }
        }

        let summary = summarize_owner(&store, "alice").await.unwrap();
        assert_eq!(
            summary,
            OwnerSummary {
                total_links: 2,
                total_clicks: 5
            }
        );
    }

    #[tokio::test]
    async fn test_summary_for_owner_without_links_is_zero() {
        let store = SqliteStorage::new("sqlite::memory:", 5).await.unwrap();
        store.init().await.unwrap();

        let summary = summarize_owner(&store, "nobody").await.unwrap();
        assert_eq!(summary, OwnerSummary::default());
    }
}
