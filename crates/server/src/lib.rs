//! HTTP surface for the observed invoker.

pub mod errors;
pub mod models;
pub mod routes;

pub use errors::{ApiError, ErrorBody};
pub use models::{ConverseBody, HealthResponse};
pub use routes::{create_app, AppState};
