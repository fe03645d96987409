//! Business logic services for the Cannabis Compliance Platform

pub mod batch;
pub mod compliance_report;
pub mod facility;
pub mod loss_theft;
pub mod reconciliation;
pub mod traceability;

pub use batch::BatchService;
pub use compliance_report::ComplianceReportService;
pub use facility::FacilityService;
pub use loss_theft::LossTheftService;
pub use reconciliation::ReconciliationService;
pub use traceability::TraceabilityService;
