//! Application state shared across handlers.

use redpanda::QueuePublisher;
use std::sync::Arc;
use sync_core::Store;

use crate::query::QueryService;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub publisher: Arc<dyn QueuePublisher>,
    pub queries: QueryService,
    pub topic_prefix: String,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        publisher: Arc<dyn QueuePublisher>,
        queries: QueryService,
        topic_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            publisher,
            queries,
            topic_prefix: topic_prefix.into(),
        }
    }
}
