//! Domain models for the Cannabis Cultivation Compliance Platform

mod batch;
mod event;
mod facility;
mod loss_theft;
mod product;
mod reconciliation;
mod report;

pub use batch::*;
pub use event::*;
pub use facility::*;
pub use loss_theft::*;
pub use product::*;
pub use reconciliation::*;
pub use report::*;
