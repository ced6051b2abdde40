//! Service layer for business logic and orchestration.
//!
//! Services sit between the repository traits and the HTTP handlers. They
//! validate requests, enforce status guards, write the audit trail and run the
//! long-lived work (imports, calculations) off the request path.

pub mod calc_controller;
pub mod coverage;
pub mod error;
pub mod fact_import;
pub mod progress;
pub mod reference;
pub mod seasonal;
pub mod tou;

#[cfg(feature = "http-server")]
pub mod import_processor;
#[cfg(feature = "http-server")]
pub mod job_tracker;

pub use calc_controller::CalculationView;
pub use error::{ErrorKind, ServiceError, ServiceResult};
pub use fact_import::{ImportBatch, ImportEvent, ImportOutcome, UploadedFile};
pub use progress::ProgressLog;
pub use reference::ReferenceLoadOutcome;
pub use tou::{EngineOptions, EngineOutcome};
