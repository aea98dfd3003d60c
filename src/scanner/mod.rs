//! Scan orchestration: the batch stepper and the trigger dispatcher.

mod dispatcher;
mod stepper;

pub use dispatcher::{ScanDispatcher, ScanStatusReport, StartScanOutcome};
pub use stepper::{BatchStepper, StepOutcome, StepSummary};
