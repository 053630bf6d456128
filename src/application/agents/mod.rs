pub mod lifecycle_tracker;
pub mod scanner;
pub mod session_filter;
pub mod trailing_stops;

pub use lifecycle_tracker::{LifecycleReport, LifecycleTracker};
pub use scanner::{ScanOutcome, SkipReason, SymbolScanner};
pub use trailing_stops::TrailingStopManager;
