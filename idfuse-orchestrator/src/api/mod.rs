//! HTTP API handlers

pub mod health;
pub mod identify;
pub mod metrics;

pub use health::health_routes;
pub use identify::identify_routes;
pub use metrics::metrics_routes;
