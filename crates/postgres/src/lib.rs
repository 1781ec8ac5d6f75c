//! Postgres store for killboard sync.
//!
//! Implements [`sync_core::Store`] over a sqlx connection pool. Killmails
//! and their sub-records are written in one transaction; the filter
//! projection and the daily aggregate are materialized views refreshed
//! concurrently so readers keep the previous snapshot until the swap.

pub mod client;
pub mod config;
pub mod entity;
pub mod health;
pub mod killmail;
pub mod projection;
pub mod schema;

mod store;

pub use client::*;
pub use config::*;
