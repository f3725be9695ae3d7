//! Epidemiological surveillance over laboratory suspect cases.

pub mod domain;
pub mod export;
pub mod filters;
pub mod intake;
pub mod report;
pub mod router;
pub mod scope;
pub mod store;
pub mod submission;
pub mod window;

#[cfg(test)]
mod tests;

pub use export::{CaseTracingTable, ExportError, EXPORT_FILE_NAME};
pub use intake::{IntakeError, IntakeOutcome, LabResultIntake, LabResultMessage};
pub use report::{EvolutionSeries, ReportError, SurveillanceReports};
pub use router::{surveillance_router, Clock, MinistryLink, Operator, SurveillanceState};
pub use scope::{OperatorScope, OriginClasses, SurveillanceScope};
pub use store::{InMemoryStore, StoreError, SurveillanceSnapshot, SurveillanceStore};
pub use window::ReportWindow;
