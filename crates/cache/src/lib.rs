//! Read-through cache in front of expensive store queries.
//!
//! Entries are keyed `<domain>:<kind>:<fingerprint>` and hold the
//! serialized result. Each entry carries its own TTL, picked per query
//! kind. Refresh cooldowns live in the same cache under their own domain.

pub mod config;
pub mod key;
pub mod store;

pub use config::*;
pub use key::*;
pub use store::*;
