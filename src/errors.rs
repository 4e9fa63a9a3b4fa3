//! Error types for dynogsi.
//!
//! [`Error`] covers local failures (plan parsing, state-file I/O, client
//! construction). [`ProviderError`] is the thin adapter over the AWS SDK's
//! errors: it keeps the structured service error code when one exists so
//! classification is a type switch, not debug-string parsing.

use std::path::PathBuf;

use aws_sdk_dynamodb::error::SdkError;
use thiserror::Error;

use crate::retry::ErrorKind;

/// Failures outside the provider boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// The plan file is unreadable or structurally invalid.
    #[error("invalid plan: {0}")]
    Plan(String),

    /// The state file could not be read or written.
    #[error("state file {path}: {source}")]
    StateIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The state file exists but is not a valid run state document.
    #[error("state file {path} is not a valid run state: {source}")]
    StateFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The state file was written by a different driver.
    #[error("state file {path} belongs to '{found}', expected '{expected}'")]
    ScriptMismatch {
        path: PathBuf,
        found: String,
        expected: String,
    },

    /// `--resume` was given but there is nothing to resume.
    #[error("cannot resume: state file {0} does not exist")]
    NothingToResume(PathBuf),

    /// An update targeted a (table, index) pair the state store never saw.
    #[error("no state record for index '{index}' on table '{table}'")]
    UnknownRecord { table: String, index: String },

    /// The AWS client could not be constructed.
    #[error("failed to build DynamoDB client: {0}")]
    Client(String),

    /// A per-table task panicked or was cancelled.
    #[error("table task failed: {0}")]
    Task(String),
}

// ========== PROVIDER ERRORS ==========

/// A failed control-plane call, reduced to what the retry loop needs.
///
/// `Service` carries the structured error code from the SDK's metadata;
/// everything that never produced a service response stays `Transport` with
/// text only. Rendering a `Service` error yields `"<code>: <message>"`, the
/// same shape the raw exception text has, so the substring classifier works
/// on stored copies of these messages.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The service rejected the call with a coded error.
    #[error("{code}: {message}")]
    Service { code: String, message: String },

    /// The call never reached the service or the response was unusable.
    #[error("{message}")]
    Transport { message: String },
}

impl ProviderError {
    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError::Service {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        ProviderError::Transport {
            message: message.into(),
        }
    }

    /// The structured error code, when the service reported one.
    pub fn code(&self) -> Option<&str> {
        match self {
            ProviderError::Service { code, .. } => Some(code),
            ProviderError::Transport { .. } => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ProviderError::Service { message, .. } => message,
            ProviderError::Transport { message } => message,
        }
    }

    /// Classify this error: typed code first, text fallback second.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self.code() {
            Some(code) => ErrorKind::from_code(code),
            None => ErrorKind::classify(self.message()),
        }
    }

    /// Reduce any `SdkError` to a [`ProviderError`].
    ///
    /// Non-service variants (dispatch, timeout, construction) become
    /// `Transport` with a hint about the likely cause. `ServiceError` keeps
    /// the code and message from `ProvideErrorMetadata`.
    pub fn from_sdk<E, R>(err: SdkError<E, R>) -> Self
    where
        E: aws_sdk_dynamodb::error::ProvideErrorMetadata + std::fmt::Debug + std::fmt::Display,
        R: std::fmt::Debug,
    {
        match &err {
            SdkError::DispatchFailure(dispatch) => {
                if dispatch.is_timeout() {
                    ProviderError::transport(
                        "connection to DynamoDB timed out. Check your network or endpoint.",
                    )
                } else if dispatch.is_io() {
                    ProviderError::transport(
                        "connection to DynamoDB failed (I/O error). Check if the endpoint \
                        is reachable.",
                    )
                } else {
                    ProviderError::transport(
                        "connection to DynamoDB failed. Check if the endpoint is reachable.",
                    )
                }
            }
            SdkError::TimeoutError(_) => ProviderError::transport(
                "connection to DynamoDB timed out. Check your network or endpoint.",
            ),
            SdkError::ConstructionFailure(inner) => {
                let msg = format!("{:?}", inner);
                if msg.contains("credentials")
                    || msg.contains("Credentials")
                    || msg.contains("NoCredentialsError")
                {
                    ProviderError::transport(
                        "no AWS credentials found. Configure credentials via environment \
                        variables (AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY), an AWS \
                        profile, or an IAM role.",
                    )
                } else {
                    ProviderError::transport(format!("failed to build request: {}", msg))
                }
            }
            SdkError::ResponseError(inner) => {
                ProviderError::transport(format!("invalid response from DynamoDB: {:?}", inner))
            }
            SdkError::ServiceError(_) => {
                if let Some(service_err) = err.as_service_error() {
                    let meta = aws_sdk_dynamodb::error::ProvideErrorMetadata::meta(service_err);
                    let message = meta
                        .message()
                        .map(str::to_string)
                        .unwrap_or_else(|| service_err.to_string());
                    match meta.code() {
                        Some(code) => ProviderError::service(code, message),
                        None => ProviderError::transport(message),
                    }
                } else {
                    ProviderError::transport(format!("unexpected DynamoDB error: {:?}", err))
                }
            }
            _ => ProviderError::transport(format!("unknown error from DynamoDB: {:?}", err)),
        }
    }
}
