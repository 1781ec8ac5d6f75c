//! Background workers for killboard sync.
//!
//! - Entity sync (queue → upstream fetch → upsert), one per entity kind
//! - Sync producer (enumerate IDs → queue)
//! - Killmail ingestion (queue → upstream fetch → transactional write)
//! - Feed listener (RedisQ → killmail queue)
//! - Projection refresh scheduler
//!
//! Every long-running task takes a `watch::Receiver<bool>` and returns
//! once it flips to true.

pub mod backoff;
pub mod config;
pub mod consume;
pub mod entity_sync;
pub mod feed;
pub mod killmail_ingest;
pub mod producer;
pub mod projection_refresh;
pub mod scheduler;

pub use backoff::{retry_with_backoff, BackoffPolicy};
pub use config::{Role, WorkerConfig};
pub use consume::{disposition, MessageHandler, Outcome, QueueWorker, Settle};
pub use entity_sync::EntitySyncHandler;
pub use feed::FeedListener;
pub use killmail_ingest::KillmailIngestHandler;
pub use producer::{PublishSummary, SyncProducer};
pub use projection_refresh::ProjectionRefresher;
pub use scheduler::*;
