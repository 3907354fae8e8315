use std::sync::Arc;

use axum::Router;

pub mod audit;
pub mod config;
pub mod errors;
pub mod evaluator;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod poller;
pub mod preview;
pub mod repositories;
pub mod routes;
pub mod schema;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

use pipeline::IngestPipeline;
use poller::FeedPoller;
use repositories::{FeedRepository, LinkRepository, QueueRepository};

/// Everything the HTTP handlers need from the application. Handlers are
/// generic over this so tests can swap in states with stubbed ports.
pub trait AppState: Clone + Send + Sync + 'static {
    fn links(&self) -> Arc<dyn LinkRepository>;
    fn queue(&self) -> Arc<dyn QueueRepository>;
    fn feeds(&self) -> Arc<dyn FeedRepository>;
    fn pipeline(&self) -> Arc<IngestPipeline>;
    fn poller(&self) -> Arc<FeedPoller>;
}

#[derive(Clone)]
pub struct DefaultAppState {
    links: Arc<dyn LinkRepository>,
    queue: Arc<dyn QueueRepository>,
    feeds: Arc<dyn FeedRepository>,
    pipeline: Arc<IngestPipeline>,
    poller: Arc<FeedPoller>,
}

impl DefaultAppState {
    pub fn new(
        links: Arc<dyn LinkRepository>,
        queue: Arc<dyn QueueRepository>,
        feeds: Arc<dyn FeedRepository>,
        pipeline: Arc<IngestPipeline>,
        poller: Arc<FeedPoller>,
    ) -> Self {
        Self {
            links,
            queue,
            feeds,
            pipeline,
            poller,
        }
    }
}

impl AppState for DefaultAppState {
    fn links(&self) -> Arc<dyn LinkRepository> {
        self.links.clone()
    }

    fn queue(&self) -> Arc<dyn QueueRepository> {
        self.queue.clone()
    }

    fn feeds(&self) -> Arc<dyn FeedRepository> {
        self.feeds.clone()
    }

    fn pipeline(&self) -> Arc<IngestPipeline> {
        self.pipeline.clone()
    }

    fn poller(&self) -> Arc<FeedPoller> {
        self.poller.clone()
    }
}

pub fn create_app<S: AppState>(state: S) -> Router {
    routes::create_router().with_state(state)
}
