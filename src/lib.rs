pub mod api;
pub mod bot;
pub mod config;
pub mod domain;
pub mod error;
pub mod evaluator;
pub mod notify;
pub mod scanner;
pub mod store;
pub mod universe;

pub use config::AppConfig;
pub use domain::{
    CompletedScan, ScanSession, ScanStatus, ScreeningOutcome, ScreeningResult, SymbolReport,
};
pub use error::{Result, ScanError};
pub use evaluator::{
    CandleSource, DailySeries, Evaluator, TrendTemplateEvaluator, YahooCandleSource,
};
pub use notify::{CompletionNotifier, Notifier, TelegramNotifier};
pub use scanner::{BatchStepper, ScanDispatcher, StartScanOutcome, StepOutcome, StepSummary};
pub use store::{
    ClaimOutcome, CommitOutcome, CommitRequest, MemorySessionStore, PostgresSessionStore,
    SessionStore, StartOutcome,
};
pub use universe::UniverseProvider;
