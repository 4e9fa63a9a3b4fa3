//! Failure reporting for indexes that exhaust their retry budget.
//!
//! A [`FailureReport`] is write-once: built when a record goes `failed`,
//! carried into the batch summary, and optionally serialized into the
//! machine-readable run report. It carries the full attempt history so an
//! operator can see what happened without scraping logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::retry::ErrorKind;

/// One failed create attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryAttempt {
    /// 1-based attempt number.
    pub attempt: u32,
    pub at: DateTime<Utc>,
    /// Raw error text as rendered at failure time.
    pub error: String,
    /// Classified kind, or `None` when unrecognized.
    pub kind: Option<ErrorKind>,
}

/// Why one index could not be created, with everything tried along the way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReport {
    pub table: String,
    pub index_name: String,
    /// Total attempts made before giving up.
    pub attempts: u32,
    pub history: Vec<RetryAttempt>,
    pub remediations: Vec<String>,
}

impl FailureReport {
    /// Build a report from the accumulated attempt history. Remediations are
    /// derived from the final attempt's classification.
    pub fn new(
        table: impl Into<String>,
        index_name: impl Into<String>,
        history: Vec<RetryAttempt>,
    ) -> Self {
        let final_kind = history.last().and_then(|a| a.kind);
        FailureReport {
            table: table.into(),
            index_name: index_name.into(),
            attempts: history.len() as u32,
            remediations: remediations_for(final_kind),
            history,
        }
    }

    /// The error text of the last attempt.
    pub fn last_error(&self) -> Option<&str> {
        self.history.last().map(|a| a.error.as_str())
    }

    /// One-line rendering for the end-of-run summary.
    pub fn summary_line(&self) -> String {
        format!(
            "{}/{}: failed after {} attempt(s): {}",
            self.table,
            self.index_name,
            self.attempts,
            self.last_error().unwrap_or("no error recorded"),
        )
    }
}

/// Recommended operator actions for each terminal failure kind.
pub fn remediations_for(kind: Option<ErrorKind>) -> Vec<String> {
    let lines: &[&str] = match kind {
        Some(ErrorKind::LimitExceeded) => &[
            "Wait for the account's index-creation quota window to reset (several minutes).",
            "Re-run with --resume to pick up the remaining indexes.",
            "Check provider account limits if the condition persists.",
        ],
        Some(ErrorKind::ResourceInUse) => &[
            "Another update is in flight on this table; let it settle.",
            "Re-run with --resume once the table leaves the UPDATING state.",
        ],
        Some(ErrorKind::Validation) => &[
            "Compare the index key schema against the table's attribute definitions.",
            "Correct the plan entry for this index and re-run with --resume.",
        ],
        Some(ErrorKind::Throttling) | Some(ErrorKind::InternalServerError) => &[
            "Transient provider backpressure; re-run with --resume.",
            "Consider a larger --max-attempts for heavily loaded accounts.",
        ],
        None => &[
            "Inspect the raw error text; the condition was not recognized.",
            "Re-run with --resume once the underlying cause is addressed.",
        ],
    };
    lines.iter().map(|s| s.to_string()).collect()
}

/// The machine-readable run report written by `--report`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub script_name: String,
    pub failures: Vec<FailureReport>,
}

impl RunReport {
    pub fn new(script_name: impl Into<String>, failures: Vec<FailureReport>) -> Self {
        RunReport {
            generated_at: Utc::now(),
            script_name: script_name.into(),
            failures,
        }
    }
}
