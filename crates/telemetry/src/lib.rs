//! Tracing setup, in-process metrics, and health/heartbeat registry for
//! killboard sync.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
