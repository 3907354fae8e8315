use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use diesel::{Connection, sqlite::SqliteConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

use curata_service::audit::CsvAuditLedger;
use curata_service::evaluator::{GenerativeModel, LinkEvaluator, ModelError, RetryPolicy};
use curata_service::pipeline::IngestPipeline;
use curata_service::poller::{FeedError, FeedPoller, FetchFeed, ParsedFeed, parse_feed_bytes};
use curata_service::preview::{FetchPreview, Preview};
use curata_service::repositories::{
    SqliteFeedRepository, SqliteLinkRepository, SqliteQueueRepository,
};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub fn establish_test_connection() -> SqliteConnection {
    let mut connection =
        SqliteConnection::establish(":memory:").expect("Failed to create in-memory database");

    connection
        .run_pending_migrations(MIGRATIONS)
        .expect("Failed to run migrations");

    connection
}

/// Preview fetcher that never touches the network.
pub struct StubPreview {
    pub title: Option<String>,
}

#[async_trait]
impl FetchPreview for StubPreview {
    async fn fetch_preview(&self, _url: &str) -> Preview {
        Preview {
            title: self.title.clone(),
            image: "/previews/placeholder.svg".to_string(),
        }
    }
}

/// Model stub that replays a queue of canned responses, one per call.
/// Panics when called more times than it was scripted for.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<String, ModelError>>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Result<String, ModelError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
        }
    }

    pub fn always(response: &str) -> Self {
        Self::new((0..64).map(|_| Ok(response.to_string())).collect())
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    async fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedModel ran out of responses")
    }
}

/// Model stub that answers every call with the same response after a
/// short delay, counting how often it was actually invoked. The delay
/// widens the window in which overlapping submissions could race.
pub struct CountingModel {
    response: String,
    delay: std::time::Duration,
    pub calls: Arc<std::sync::atomic::AtomicUsize>,
}

impl CountingModel {
    pub fn new(response: &str, delay: std::time::Duration) -> Self {
        Self {
            response: response.to_string(),
            delay,
            calls: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl GenerativeModel for CountingModel {
    async fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.response.clone())
    }
}

/// Feed fetcher backed by in-memory documents keyed by URL.
pub struct StaticFeedFetcher {
    documents: HashMap<String, Vec<u8>>,
}

impl StaticFeedFetcher {
    pub fn empty() -> Self {
        Self {
            documents: HashMap::new(),
        }
    }

    pub fn with_feed(url: &str, document: &str) -> Self {
        let mut documents = HashMap::new();
        documents.insert(url.to_string(), document.as_bytes().to_vec());
        Self { documents }
    }
}

#[async_trait]
impl FetchFeed for StaticFeedFetcher {
    async fn fetch_feed(&self, url: &str) -> Result<ParsedFeed, FeedError> {
        match self.documents.get(url) {
            Some(bytes) => parse_feed_bytes(bytes),
            None => Err(FeedError::Status(404)),
        }
    }
}

pub const ACCEPT_RESPONSE: &str = r#"{"coherent": true, "category": "Digital Democracy", "reason": "Relevant civic article", "category_reason": "Matches the category", "title": "Model Title"}"#;

pub const REJECT_RESPONSE: &str = r#"{"coherent": false, "category": "Rejected", "reason": "Off topic", "category_reason": "", "title": ""}"#;

pub fn transient_error() -> ModelError {
    ModelError::Api {
        status: 429,
        body: "quota exceeded".to_string(),
    }
}

pub fn permanent_error() -> ModelError {
    ModelError::Api {
        status: 400,
        body: "bad request".to_string(),
    }
}

/// Fully wired application over an in-memory database, stub model and
/// stub preview fetcher. The tempdir keeps the audit ledger alive for
/// the duration of the test.
pub struct TestHarness {
    pub links: Arc<SqliteLinkRepository>,
    pub queue: Arc<SqliteQueueRepository>,
    pub feeds: Arc<SqliteFeedRepository>,
    pub pipeline: Arc<IngestPipeline>,
    pub poller: Arc<FeedPoller>,
    pub audit_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn audit_rows(&self) -> Vec<csv::StringRecord> {
        let path = self.audit_dir.path().join("links.csv");
        if !path.exists() {
            return Vec::new();
        }
        let mut reader = csv::Reader::from_path(&path).expect("Failed to open audit ledger");
        reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .expect("Failed to read audit ledger")
    }
}

pub fn build_harness(model: ScriptedModel, fetcher: StaticFeedFetcher) -> TestHarness {
    build_harness_with_model(Arc::new(model), fetcher)
}

pub fn build_harness_with_model(
    model: Arc<dyn GenerativeModel>,
    fetcher: StaticFeedFetcher,
) -> TestHarness {
    let db = Arc::new(Mutex::new(establish_test_connection()));
    let links = Arc::new(SqliteLinkRepository::new(db.clone()));
    let queue = Arc::new(SqliteQueueRepository::new(db.clone()));
    let feeds = Arc::new(SqliteFeedRepository::new(db));

    let audit_dir = tempfile::tempdir().expect("Failed to create tempdir");
    let audit = Arc::new(CsvAuditLedger::new(audit_dir.path().join("links.csv")));

    let evaluator = Arc::new(LinkEvaluator::new(
        model,
        None,
        RetryPolicy {
            max_attempts: 3,
            base_delay: std::time::Duration::ZERO,
        },
    ));
    let preview = Arc::new(StubPreview {
        title: Some("Preview Title".to_string()),
    });

    let pipeline = Arc::new(IngestPipeline::new(
        links.clone(),
        audit,
        preview,
        evaluator,
    ));
    let poller = Arc::new(FeedPoller::new(
        feeds.clone(),
        Arc::new(fetcher),
        pipeline.clone(),
        20,
    ));

    TestHarness {
        links,
        queue,
        feeds,
        pipeline,
        poller,
        audit_dir,
    }
}

pub mod server_utils {
    use super::*;
    use axum_test::TestServer;
    use curata_service::{DefaultAppState, routes};

    pub fn create_test_server(harness: &TestHarness) -> TestServer {
        let state = DefaultAppState::new(
            harness.links.clone(),
            harness.queue.clone(),
            harness.feeds.clone(),
            harness.pipeline.clone(),
            harness.poller.clone(),
        );
        let app = routes::create_router().with_state(state);
        TestServer::new(app).unwrap()
    }
}
