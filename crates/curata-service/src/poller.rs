use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::models::{Source, SourceMeta};
use crate::pipeline::{IngestPipeline, ProcessOutcome, Submission};
use crate::repositories::FeedRepository;

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
const USER_AGENT: &str = "CurataBot/1.0";

#[derive(Debug, Clone)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
}

#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub title: String,
    pub items: Vec<FeedItem>,
}

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Feed fetch failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed fetch failed: HTTP {0}")]
    Status(u16),

    #[error("Not a parseable feed: {0}")]
    Parse(String),
}

/// Seam between the poller and the network, so poll cycles are testable
/// against canned feed documents.
#[async_trait]
pub trait FetchFeed: Send + Sync {
    async fn fetch_feed(&self, url: &str) -> Result<ParsedFeed, FeedError>;
}

pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to build feed HTTP client");
        Self { client }
    }
}

impl Default for HttpFeedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchFeed for HttpFeedFetcher {
    async fn fetch_feed(&self, url: &str) -> Result<ParsedFeed, FeedError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::Status(response.status().as_u16()));
        }
        let bytes = response.bytes().await?;
        parse_feed_bytes(&bytes)
    }
}

/// Parse an RSS/Atom document into title + linked items, dropping
/// entries without a usable link.
pub fn parse_feed_bytes(bytes: &[u8]) -> Result<ParsedFeed, FeedError> {
    let feed = feed_rs::parser::parse(bytes).map_err(|err| FeedError::Parse(err.to_string()))?;

    let title = feed.title.map(|t| t.content).unwrap_or_default();
    let items = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let link = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))?;
            if link.is_empty() {
                return None;
            }
            Some(FeedItem {
                title: entry.title.map(|t| t.content).unwrap_or_default(),
                link,
            })
        })
        .collect();

    Ok(ParsedFeed { title, items })
}

/// Result of on-demand feed ingestion, in the feed's item order.
#[derive(Debug)]
pub struct FeedIngest {
    pub feed_title: String,
    pub outcomes: Vec<ProcessOutcome>,
}

/// Reads registered feeds on a timer and pushes every item through the
/// same pipeline as a live submission.
pub struct FeedPoller {
    feeds: Arc<dyn FeedRepository>,
    fetcher: Arc<dyn FetchFeed>,
    pipeline: Arc<IngestPipeline>,
    max_items: usize,
}

impl FeedPoller {
    pub fn new(
        feeds: Arc<dyn FeedRepository>,
        fetcher: Arc<dyn FetchFeed>,
        pipeline: Arc<IngestPipeline>,
        max_items: usize,
    ) -> Self {
        Self {
            feeds,
            fetcher,
            pipeline,
            max_items,
        }
    }

    /// One cycle over every registered feed. A feed that fails to fetch
    /// or parse is skipped without affecting the others.
    pub async fn poll(&self) {
        let feeds = match self.feeds.list().await {
            Ok(feeds) => feeds,
            Err(err) => {
                warn!(error = %err, "Could not read feed registry");
                return;
            }
        };

        for feed in feeds {
            match self.fetcher.fetch_feed(&feed.url).await {
                Ok(parsed) => {
                    // Picks up feed title drift in place.
                    if let Err(err) = self.feeds.upsert(&feed.url, &parsed.title).await {
                        warn!(url = %feed.url, error = %err, "Feed registry update failed");
                    }
                    self.fan_out(&feed.url, &parsed).await;
                }
                Err(err) => {
                    warn!(url = %feed.url, error = %err, "Feed skipped for this cycle");
                }
            }
        }
    }

    /// Sequentially process a feed's items; item order is preserved and
    /// no two items are ever in flight at once.
    pub async fn fan_out(&self, feed_url: &str, parsed: &ParsedFeed) -> Vec<ProcessOutcome> {
        let meta = SourceMeta::for_feed(&parsed.title);
        let mut outcomes = Vec::new();

        for item in parsed.items.iter().take(self.max_items) {
            let submission = Submission {
                url: item.link.clone(),
                source: Source::Rss,
                source_meta: meta.clone(),
            };
            match self.pipeline.process(submission).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    warn!(url = %item.link, feed = %feed_url, error = %err, "Feed item failed evaluation");
                }
            }
        }
        outcomes
    }

    /// On-demand ingestion: when a submitted URL turns out to be a feed,
    /// register it for future polls and fan out its items now. Returns
    /// None when the URL is not a feed with items.
    pub async fn ingest_feed(&self, url: &str) -> Option<FeedIngest> {
        let parsed = match self.fetcher.fetch_feed(url).await {
            Ok(parsed) if !parsed.items.is_empty() => parsed,
            _ => return None,
        };

        if let Err(err) = self.feeds.upsert(url, &parsed.title).await {
            warn!(url, error = %err, "Feed registration failed");
        }

        let outcomes = self.fan_out(url, &parsed).await;
        Some(FeedIngest {
            feed_title: parsed.title,
            outcomes,
        })
    }

    /// Timer loop driving scheduled polls until the task is aborted at
    /// shutdown.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup does not
        // hammer every feed at once with the web server still binding.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            info!("Polling registered feeds");
            self.poll().await;
        }
    }
}
