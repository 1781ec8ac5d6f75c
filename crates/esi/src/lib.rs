//! Upstream clients for killboard sync.
//!
//! Every ESI call goes through a shared [`RateLimiter`]. Upstream JSON is
//! mapped onto the typed records in `sync_core` here and nowhere else.

pub mod client;
pub mod config;
pub mod dto;
pub mod limiter;
pub mod redisq;

pub use client::*;
pub use config::*;
pub use limiter::*;
pub use redisq::*;
