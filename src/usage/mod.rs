//! Usage tracking: download logging, per-user history and the stats read path

mod history;
mod logger;
mod stats;

pub use history::{DownloadHistory, HistoryEntry};
pub use logger::{LogDownloadOutcome, LogDownloadReport, StepReport, UsageLogger};
pub use stats::StatsCache;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
