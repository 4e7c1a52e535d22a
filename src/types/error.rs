use anyhow::Error;
use thiserror::Error;

use crate::types::FailedKey;

/// Application-level error types for s3browse-rs.
///
/// Every variant renders as a short human-readable message that a UI can show
/// as-is.
///
/// ## Exit Codes
///
/// Each variant maps to an exit code (via `exit_code()`):
/// - 0: Non-error conditions (UploadCancelled)
/// - 1: General errors (ListingFailed, TransportTimeout, UploadFailed, Io)
/// - 2: Configuration errors (InvalidConfig, InvalidReference, UnknownTreePath, NotAFolder)
/// - 3: Partial failure (DeletionFailed)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum S3BrowseError {
    /// Listing a prefix failed (transport or authorization error).
    #[error("Failed to list s3 prefix '{prefix}': {message}")]
    ListingFailed { prefix: String, message: String },

    /// A listing call or upload round-trip exceeded its deadline.
    #[error("{operation} timed out after {timeout_milliseconds}ms")]
    TransportTimeout {
        operation: String,
        timeout_milliseconds: u64,
    },

    /// Transport error while uploading an object.
    #[error("Upload of '{key}' failed: {message}")]
    UploadFailed { key: String, message: String },

    /// Upload aborted by the user.
    #[error("Upload of '{key}' was cancelled")]
    UploadCancelled { key: String },

    /// Some or all objects could not be deleted.
    #[error("Failed to delete {} object(s): {}", failed.len(), failed_key_list(failed))]
    DeletionFailed { failed: Vec<FailedKey> },

    /// A URL or key that cannot be normalized to an object key.
    #[error("Invalid object reference: {0}")]
    InvalidReference(String),

    /// Configuration error (non-retryable).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The folder tree has no node at this path.
    #[error("No such path in folder tree: '{0}'")]
    UnknownTreePath(String),

    /// Expansion requested on a file node.
    #[error("'{0}' is a file, not a folder")]
    NotAFolder(String),

    /// I/O error while reading an upload source.
    #[error("I/O error: {0}")]
    Io(String),
}

fn failed_key_list(failed: &[FailedKey]) -> String {
    failed
        .iter()
        .map(|f| f.key.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl S3BrowseError {
    /// Get the appropriate process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            S3BrowseError::UploadCancelled { .. } => 0,
            S3BrowseError::InvalidConfig(_)
            | S3BrowseError::InvalidReference(_)
            | S3BrowseError::UnknownTreePath(_)
            | S3BrowseError::NotAFolder(_) => 2,
            S3BrowseError::DeletionFailed { .. } => 3,
            _ => 1,
        }
    }

    /// Check if this error is retryable.
    ///
    /// Timeouts and upload transport errors are transient. Listing failures
    /// are retried by the AWS SDK's own policy before they surface here.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            S3BrowseError::TransportTimeout { .. } | S3BrowseError::UploadFailed { .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, S3BrowseError::UploadCancelled { .. })
    }

    /// Recover the typed error carried by an `anyhow::Error`, or wrap it with `fallback`.
    pub fn from_anyhow(e: Error, fallback: impl FnOnce(String) -> S3BrowseError) -> Self {
        match e.downcast::<S3BrowseError>() {
            Ok(err) => err,
            Err(other) => fallback(format!("{other:#}")),
        }
    }
}

impl From<std::io::Error> for S3BrowseError {
    fn from(e: std::io::Error) -> Self {
        S3BrowseError::Io(e.to_string())
    }
}

/// Check if an anyhow::Error wraps an upload cancellation.
pub fn is_cancelled_error(e: &Error) -> bool {
    if let Some(err) = e.downcast_ref::<S3BrowseError>() {
        return err.is_cancelled();
    }
    false
}

/// Extract the exit code from an anyhow::Error, defaulting to 1.
pub fn exit_code_from_error(e: &Error) -> i32 {
    if let Some(err) = e.downcast_ref::<S3BrowseError>() {
        return err.exit_code();
    }
    1
}
