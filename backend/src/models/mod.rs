//! Database models for the Cannabis Cultivation Compliance Platform
//!
//! Re-exports models from the shared crate and adds backend-specific models

pub use shared::models::*;
