//! Operational HTTP surface and the cached query service.

pub mod query;
pub mod response;
pub mod routes;
pub mod state;

pub use query::{QueryService, RefreshRequest};
pub use routes::router;
pub use state::AppState;
