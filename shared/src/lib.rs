//! Shared types and models for the Cannabis Cultivation Compliance Platform
//!
//! This crate contains the pure domain logic shared between the backend and
//! other components: batch lifecycle rules, the traceability event taxonomy,
//! reconciliation arithmetic, loss/theft thresholds, and the regulatory
//! report schema. Nothing in here touches a database or the network.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
