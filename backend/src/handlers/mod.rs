//! HTTP handlers for the Cannabis Cultivation Compliance Platform

pub mod batch;
pub mod facility;
pub mod health;
pub mod loss_theft;
pub mod reconciliation;
pub mod report;
pub mod traceability;

pub use batch::*;
pub use facility::*;
pub use health::*;
pub use loss_theft::*;
pub use reconciliation::*;
pub use report::*;
pub use traceability::*;
