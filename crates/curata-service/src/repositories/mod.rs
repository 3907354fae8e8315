pub mod feeds;
pub mod links;
pub mod queue;
pub mod traits;

pub use feeds::SqliteFeedRepository;
pub use links::SqliteLinkRepository;
pub use queue::SqliteQueueRepository;
pub use traits::{
    EnqueueOutcome, FeedRepository, InsertOutcome, LinkRepository, QueueRepository,
};
