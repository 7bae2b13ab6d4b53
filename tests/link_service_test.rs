//! Resolution service tests
//!
//! Exercise code allocation, resolve with background visit recording, analytics
//! reads and owner rollups against SQLite stores.

use async_trait::async_trait;
use snaplink::analytics::{OwnerSummary, VisitRecorder};
use snaplink::models::{Link, Visit, VisitContext};
use snaplink::service::{LinkError, LinkService};
use snaplink::shortener::{CodeGenerator, RandomCodeGenerator};
use snaplink::storage::{LinkStore, SqliteStorage, StorageError, StorageResult};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

async fn create_test_storage() -> Arc<dyn LinkStore> {
    let storage = SqliteStorage::new("sqlite::memory:", 5).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

/// Hands out scripted codes first, then random ones
struct ScriptedGenerator {
    script: Mutex<VecDeque<String>>,
    fallback: RandomCodeGenerator,
}

impl ScriptedGenerator {
    fn new(codes: &[&str]) -> Self {
        Self {
            script: Mutex::new(codes.iter().map(|c| c.to_string()).collect()),
            fallback: RandomCodeGenerator::default(),
        }
    }
}

impl CodeGenerator for ScriptedGenerator {
    fn generate(&self) -> String {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.generate())
    }
}

/// Always returns the same code
struct FixedGenerator(&'static str);

impl CodeGenerator for FixedGenerator {
    fn generate(&self) -> String {
        self.0.to_string()
    }
}

/// Delegates to an inner store but refuses every visit write
struct FailingVisitStore {
    inner: Arc<dyn LinkStore>,
}

#[async_trait]
impl LinkStore for FailingVisitStore {
    async fn init(&self) -> anyhow::Result<()> {
        self.inner.init().await
    }

    async fn create_with_code(
        &self,
        code: &str,
        destination: &str,
        owner: &str,
    ) -> StorageResult<Link> {
        self.inner.create_with_code(code, destination, owner).await
    }

    async fn get(&self, code: &str) -> anyhow::Result<Option<Link>> {
        self.inner.get(code).await
    }

    async fn record_visit(&self, _code: &str, _visit: &Visit) -> StorageResult<Link> {
        Err(StorageError::Other(anyhow::anyhow!("simulated write failure")))
    }

    async fn list_by_owner(&self, owner: &str) -> anyhow::Result<Vec<Link>> {
        self.inner.list_by_owner(owner).await
    }

    async fn visits(&self, code: &str) -> anyhow::Result<Vec<Visit>> {
        self.inner.visits(code).await
    }

    async fn analytics(&self, code: &str) -> anyhow::Result<Option<(Link, Vec<Visit>)>> {
        self.inner.analytics(code).await
    }
}

fn build_service(
    store: Arc<dyn LinkStore>,
    generator: Arc<dyn CodeGenerator>,
    max_attempts: u32,
) -> LinkService {
    let recorder = Arc::new(VisitRecorder::new(Arc::clone(&store), 4, 1_000));
    LinkService::new(store, generator, recorder, max_attempts)
}

fn visitor(ip: &str) -> VisitContext {
    VisitContext::new("Mozilla/5.0 (test)", ip)
}

#[tokio::test]
async fn test_resolve_records_visits_in_call_order() {
    let store = create_test_storage().await;
    let service = build_service(
        Arc::clone(&store),
        Arc::new(RandomCodeGenerator::default()),
        5,
    );

    let link = service
        .create_short_link("https://example.com", "alice")
        .await
        .unwrap();
    assert_eq!(link.code.len(), 8);

    for ip in ["198.51.100.1", "198.51.100.2", "198.51.100.3"] {
        let destination = service.resolve(&link.code, visitor(ip)).await.unwrap();
        assert_eq!(destination, "https://example.com");
    }

    service.recorder().flush().await;

    let stored = store.get(&link.code).await.unwrap().unwrap();
    assert_eq!(stored.click_count, 3);

    let analytics = service.get_analytics(&link.code, None).await.unwrap();
    assert_eq!(analytics.code, link.code);
    assert_eq!(analytics.destination, "https://example.com");
    assert_eq!(analytics.total_clicks, 3);
    let ips: Vec<&str> = analytics
        .visit_history
        .iter()
        .map(|v| v.ip_address.as_str())
        .collect();
    assert_eq!(ips, vec!["198.51.100.1", "198.51.100.2", "198.51.100.3"]);
    assert!(analytics
        .visit_history
        .iter()
        .all(|v| v.user_agent == "Mozilla/5.0 (test)"));
}

#[tokio::test]
async fn test_forced_collision_is_retried_for_concurrent_creates() {
    let store = create_test_storage().await;
    let generator = Arc::new(ScriptedGenerator::new(&["ab12cd34", "ab12cd34"]));
    let service = build_service(Arc::clone(&store), generator, 5);

    let (first, second) = tokio::join!(
        service.create_short_link("https://example.com/one", "alice"),
        service.create_short_link("https://example.com/two", "bob"),
    );
    let first = first.unwrap();
    let second = second.unwrap();

    assert_ne!(first.code, second.code);
    assert!(
        first.code == "ab12cd34" || second.code == "ab12cd34",
        "one caller should keep the contested code"
    );

    // Each link keeps its own destination
    let a = store.get(&first.code).await.unwrap().unwrap();
    let b = store.get(&second.code).await.unwrap().unwrap();
    assert_eq!(a.destination, "https://example.com/one");
    assert_eq!(b.destination, "https://example.com/two");
}

#[tokio::test]
async fn test_exhausted_retries_when_every_code_is_taken() {
    let store = create_test_storage().await;
    store
        .create_with_code("fixed001", "https://example.com/taken", "mallory")
        .await
        .unwrap();

    let service = build_service(Arc::clone(&store), Arc::new(FixedGenerator("fixed001")), 3);

    let err = service
        .create_short_link("https://example.com/new", "alice")
        .await
        .unwrap_err();
    assert!(
        matches!(err, LinkError::ExhaustedRetries { attempts: 3 }),
        "got {err:?}"
    );
    assert!(store.list_by_owner("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_destination_is_rejected_without_writes() {
    let store = create_test_storage().await;
    let service = build_service(
        Arc::clone(&store),
        Arc::new(RandomCodeGenerator::default()),
        5,
    );

    for raw in ["", "   ", "not a url", "mailto:someone@example.com"] {
        let err = service.create_short_link(raw, "alice").await.unwrap_err();
        assert!(
            matches!(err, LinkError::Validation { field: "url", .. }),
            "{raw:?} gave {err:?}"
        );
    }

    assert!(store.list_by_owner("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_destination_is_trimmed() {
    let store = create_test_storage().await;
    let service = build_service(store, Arc::new(RandomCodeGenerator::default()), 5);

    let link = service
        .create_short_link("  https://example.com/path  ", "alice")
        .await
        .unwrap();
    assert_eq!(link.destination, "https://example.com/path");
}

#[tokio::test]
async fn test_resolve_unknown_code_is_not_found_and_writes_nothing() {
    let store = create_test_storage().await;
    let service = build_service(
        Arc::clone(&store),
        Arc::new(RandomCodeGenerator::default()),
        5,
    );

    let err = service
        .resolve("doesnotexist", visitor("198.51.100.1"))
        .await
        .unwrap_err();
    assert!(matches!(err, LinkError::NotFound));

    service.recorder().flush().await;
    assert_eq!(service.recorder().dropped(), 0);
    assert_eq!(service.recorder().failed(), 0);
    assert!(store.get("doesnotexist").await.unwrap().is_none());
    assert!(store.visits("doesnotexist").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_code_is_not_found() {
    let store = create_test_storage().await;
    let service = build_service(store, Arc::new(RandomCodeGenerator::default()), 5);

    let err = service
        .resolve("../etc/passwd", visitor("198.51.100.1"))
        .await
        .unwrap_err();
    assert!(matches!(err, LinkError::NotFound));
}

#[tokio::test]
async fn test_failed_visit_write_does_not_affect_resolve() {
    let inner = create_test_storage().await;
    let store: Arc<dyn LinkStore> = Arc::new(FailingVisitStore {
        inner: Arc::clone(&inner),
    });
    let service = build_service(store, Arc::new(RandomCodeGenerator::default()), 5);

    let link = service
        .create_short_link("https://example.com/resilient", "alice")
        .await
        .unwrap();

    for i in 0..5 {
        let destination = service
            .resolve(&link.code, visitor(&format!("203.0.113.{i}")))
            .await
            .unwrap();
        assert_eq!(destination, "https://example.com/resilient");
    }

    service.recorder().flush().await;
    assert_eq!(service.recorder().failed(), 5);

    let stored = inner.get(&link.code).await.unwrap().unwrap();
    assert_eq!(stored.click_count, 0);
}

#[tokio::test]
async fn test_owner_summary_matches_click_counts() {
    let store = create_test_storage().await;
    let service = build_service(
        Arc::clone(&store),
        Arc::new(RandomCodeGenerator::default()),
        5,
    );

    let mut codes = vec![];
    for i in 0..3 {
        let link = service
            .create_short_link(&format!("https://example.com/{i}"), "alice")
            .await
            .unwrap();
        codes.push(link.code);
    }
    let foreign = service
        .create_short_link("https://example.com/bob", "bob")
        .await
        .unwrap();

    for (code, clicks) in codes.iter().zip([4, 0, 2]) {
        for _ in 0..clicks {
            service.resolve(code, visitor("192.0.2.10")).await.unwrap();
        }
    }
    service
        .resolve(&foreign.code, visitor("192.0.2.10"))
        .await
        .unwrap();
    service.recorder().flush().await;

    let summary = service.owner_summary("alice").await.unwrap();
    assert_eq!(
        summary,
        OwnerSummary {
            total_links: 3,
            total_clicks: 6
        }
    );

    let listed = service.list_links("alice").await.unwrap();
    assert_eq!(
        listed.iter().map(|l| l.code.clone()).collect::<Vec<_>>(),
        codes
    );
}

#[tokio::test]
async fn test_owner_only_analytics_hides_links_from_others() {
    let store = create_test_storage().await;
    let service = build_service(store, Arc::new(RandomCodeGenerator::default()), 5)
        .with_owner_only_analytics(true);

    let link = service
        .create_short_link("https://example.com/private", "alice")
        .await
        .unwrap();

    assert!(matches!(
        service.get_analytics(&link.code, None).await,
        Err(LinkError::NotFound)
    ));
    assert!(matches!(
        service.get_analytics(&link.code, Some("bob")).await,
        Err(LinkError::NotFound)
    ));

    let analytics = service
        .get_analytics(&link.code, Some("alice"))
        .await
        .unwrap();
    assert_eq!(analytics.total_clicks, 0);
    assert!(analytics.visit_history.is_empty());
}

/// File-backed store so the recorder and readers use separate connections
async fn create_file_storage(name: &str) -> (Arc<dyn LinkStore>, std::path::PathBuf) {
    let path = std::env::temp_dir().join(format!(
        "snaplink-{name}-{}-{}.db",
        std::process::id(),
        snaplink::storage::now_millis()
    ));
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let storage = SqliteStorage::new(&url, 8).await.unwrap();
    storage.init().await.unwrap();
    (Arc::new(storage), path)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_analytics_reads_stay_consistent_during_visit_writes() {
    const VISITS: usize = 600;

    let (store, path) = create_file_storage("analytics-consistency").await;
    let recorder = Arc::new(VisitRecorder::new(Arc::clone(&store), 4, 10_000));
    let service = Arc::new(LinkService::new(
        Arc::clone(&store),
        Arc::new(RandomCodeGenerator::default()),
        recorder,
        5,
    ));

    let link = service
        .create_short_link("https://example.com/busy", "alice")
        .await
        .unwrap();

    let writer = {
        let service = Arc::clone(&service);
        let code = link.code.clone();
        tokio::spawn(async move {
            for i in 0..VISITS {
                service
                    .resolve(&code, visitor(&format!("198.51.100.{}", i % 250)))
                    .await
                    .unwrap();
                if i % 50 == 0 {
                    tokio::task::yield_now().await;
                }
            }
            service.recorder().flush().await;
        })
    };

    let mut reads = 0;
    while !writer.is_finished() {
        let analytics = service.get_analytics(&link.code, None).await.unwrap();
        assert_eq!(
            analytics.total_clicks as usize,
            analytics.visit_history.len(),
            "torn analytics read after {reads} reads"
        );
        reads += 1;
    }
    writer.await.unwrap();

    let analytics = service.get_analytics(&link.code, None).await.unwrap();
    assert_eq!(service.recorder().dropped(), 0);
    assert_eq!(analytics.total_clicks as usize, VISITS);
    assert_eq!(analytics.visit_history.len(), VISITS);

    service.recorder().shutdown().await;
    drop(service);
    drop(store);
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }
}
