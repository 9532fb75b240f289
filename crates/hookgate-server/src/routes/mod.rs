//! Routes served by the server itself.

pub mod health;

pub use health::{HealthResponse, health, health_routes, readiness};
