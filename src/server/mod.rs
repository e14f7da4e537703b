//! HTTP surface
//!
//! Thin routing layer over the orchestrator; all decision logic lives
//! below it.

pub mod routes;

pub use routes::router;
