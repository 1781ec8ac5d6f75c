//! Durable work queues over Redpanda.
//!
//! Each queue is a single-partition topic. Consumers hold a prefetch
//! window of deliveries, settle each one with an ack or nack, and only
//! advance their committed offset past a contiguous run of settled
//! records. A nack re-publishes the payload (requeue) or moves it to the
//! queue's dead-letter topic.

pub mod config;
pub mod connection;
pub mod consumer;
pub mod health;
pub mod producer;
pub mod queue;
pub mod topics;

pub use config::*;
pub use consumer::*;
pub use producer::*;
pub use queue::*;
pub use topics::*;
