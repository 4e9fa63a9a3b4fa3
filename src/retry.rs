//! Error classification and retry scheduling for index creation.
//!
//! DynamoDB resolves every failure mode of `UpdateTable` by waiting or
//! resubmitting, so the policy never treats a classified error as fatal.
//! What differs per condition is how long to wait:
//! - `ResourceInUseException` - another update holds the table, short fixed wait
//! - `LimitExceededException` - account-level index-creation quota, long fixed wait
//! - `ValidationException` - attribute-definition conflict, resubmit immediately
//!   after the caller merges definitions
//! - throttling, server errors, and anything unrecognized - exponential schedule

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default per-index attempt budget.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Seconds to wait while another update holds the table.
const RESOURCE_IN_USE_DELAY_SECS: u64 = 5;

/// Seconds to wait for the account's index-creation quota window to reset.
const LIMIT_EXCEEDED_DELAY_SECS: u64 = 300;

/// Backoff schedule for throttling, server-side, and unclassified failures.
/// Attempts past the end of the schedule reuse the last entry.
const TRANSIENT_BACKOFF_SECS: [u64; 5] = [30, 60, 120, 240, 480];

// ========== CLASSIFICATION ==========

/// Provider failure families the create loop reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The table is mid-update and cannot accept another index yet.
    #[serde(rename = "ResourceInUseException")]
    ResourceInUse,
    /// The account's concurrent index-creation limit is exhausted.
    #[serde(rename = "LimitExceededException")]
    LimitExceeded,
    /// The request conflicts with the table's declared attribute definitions.
    #[serde(rename = "ValidationException")]
    Validation,
    /// Request rate backpressure.
    #[serde(rename = "ThrottlingException")]
    Throttling,
    /// Server-side failure inside the service.
    #[serde(rename = "InternalServerError")]
    InternalServerError,
}

impl ErrorKind {
    /// The exception name as it appears on the wire and in error text.
    pub fn wire_name(&self) -> &'static str {
        match self {
            ErrorKind::ResourceInUse => "ResourceInUseException",
            ErrorKind::LimitExceeded => "LimitExceededException",
            ErrorKind::Validation => "ValidationException",
            ErrorKind::Throttling => "ThrottlingException",
            ErrorKind::InternalServerError => "InternalServerError",
        }
    }

    /// Classify a structured service error code.
    ///
    /// This is the primary path: the provider adapter extracts the code from
    /// the SDK's error metadata, so no message text is parsed. Codes in the
    /// throttling family all map to [`ErrorKind::Throttling`] since the
    /// remediation is identical.
    pub fn from_code(code: &str) -> Option<ErrorKind> {
        match code {
            "ResourceInUseException" => Some(ErrorKind::ResourceInUse),
            "LimitExceededException" => Some(ErrorKind::LimitExceeded),
            "ValidationException" => Some(ErrorKind::Validation),
            "ThrottlingException"
            | "Throttling"
            | "ProvisionedThroughputExceededException"
            | "RequestLimitExceeded"
            | "TooManyRequestsException" => Some(ErrorKind::Throttling),
            "InternalServerError" => Some(ErrorKind::InternalServerError),
            _ => None,
        }
    }

    /// Classify raw error text by substring match.
    ///
    /// Fallback for errors that only exist as text, such as a `last_error`
    /// loaded from a previous run's state file. Returns `None` for
    /// unrecognized text, which callers treat as a generic transient failure.
    pub fn classify(text: &str) -> Option<ErrorKind> {
        [
            ErrorKind::ResourceInUse,
            ErrorKind::LimitExceeded,
            ErrorKind::Validation,
            ErrorKind::Throttling,
            ErrorKind::InternalServerError,
        ]
        .into_iter()
        .find(|kind| text.contains(kind.wire_name()))
    }

    /// Every classified condition is resolvable by waiting or resubmitting.
    pub fn is_retryable(&self) -> bool {
        true
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

// ========== POLICY ==========

/// Per-error-kind delay schedule plus the attempt budget.
///
/// Delays are data, not constants baked into the loop, so tests can run the
/// full retry machinery with zeroed waits via [`RetryPolicy::immediate`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    resource_in_use_delay: Duration,
    limit_exceeded_delay: Duration,
    transient_backoff: Vec<Duration>,
}

impl RetryPolicy {
    /// Production schedule with the given attempt budget.
    pub fn new(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts,
            resource_in_use_delay: Duration::from_secs(RESOURCE_IN_USE_DELAY_SECS),
            limit_exceeded_delay: Duration::from_secs(LIMIT_EXCEEDED_DELAY_SECS),
            transient_backoff: TRANSIENT_BACKOFF_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        }
    }

    /// Zero-delay schedule for tests exercising the retry loop.
    pub fn immediate(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts,
            resource_in_use_delay: Duration::ZERO,
            limit_exceeded_delay: Duration::ZERO,
            transient_backoff: vec![Duration::ZERO],
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    pub fn should_retry(&self, kind: Option<ErrorKind>, attempts: u32) -> bool {
        if attempts >= self.max_attempts {
            return false;
        }
        kind.is_none_or(|k| k.is_retryable())
    }

    /// Delay before the next attempt. `attempt_index` is zero-based: the
    /// first retry sleeps `delay_for(kind, 0)`. Unclassified errors follow
    /// the transient schedule, clamped to its last entry.
    pub fn delay_for(&self, kind: Option<ErrorKind>, attempt_index: u32) -> Duration {
        match kind {
            Some(ErrorKind::ResourceInUse) => self.resource_in_use_delay,
            Some(ErrorKind::LimitExceeded) => self.limit_exceeded_delay,
            Some(ErrorKind::Validation) => Duration::ZERO,
            Some(ErrorKind::Throttling) | Some(ErrorKind::InternalServerError) | None => {
                let last = self.transient_backoff.len() - 1;
                self.transient_backoff[(attempt_index as usize).min(last)]
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(DEFAULT_MAX_ATTEMPTS)
    }
}
