//! Core types, error taxonomy, store contract and filter compiler for killboard sync.

pub mod entity;
pub mod error;
pub mod filter;
pub mod killmail;
pub mod message;
pub mod store;

pub use entity::*;
pub use error::{
    DbErrorCode, Error, ErrorClass, QueueErrorCode, Result, UpstreamErrorCode, ValidationErrorCode,
};
pub use filter::{KillFilter, KillmailQuery, Page, QueryMode};
pub use killmail::*;
pub use message::{source, KillmailRef, QueueMessage};
pub use store::{InsertOutcome, ProjectionCounts, Store};
