//! Error taxonomy for cleanup runs.
//!
//! Only two kinds of error ever escape a service run: an invalid policy
//! (caught before any remote call) and a failed top-level listing. Everything
//! that happens to a single resource is absorbed into its report instead.

use crate::resource::ResourceKind;
use thiserror::Error;

/// A single failed call against the remote resource API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed: {message}")]
pub struct RemoteError {
    /// Remote operation name (e.g. `DeleteObjects`).
    pub operation: &'static str,
    /// Service error code when the remote side supplied one (e.g. `AccessDenied`).
    pub code: Option<String>,
    /// Human readable failure description.
    pub message: String,
}

impl RemoteError {
    /// Create an error without a service error code.
    pub fn new(operation: &'static str, message: impl std::fmt::Display) -> Self {
        Self {
            operation,
            code: None,
            message: message.to_string(),
        }
    }

    /// Create an error carrying a service error code.
    pub fn with_code(
        operation: &'static str,
        code: impl Into<String>,
        message: impl std::fmt::Display,
    ) -> Self {
        Self {
            operation,
            code: Some(code.into()),
            message: message.to_string(),
        }
    }

    /// Returns `true` if the remote side reported the entity as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.code.as_deref(),
            Some("NoSuchEntity" | "NoSuchBucket" | "ResourceNotFoundException" | "NotFound")
        )
    }
}

/// Errors raised while validating a policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// A name pattern is not a valid glob.
    #[error("Invalid name pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why it failed to compile.
        reason: String,
    },

    /// `require_tag` was given without a usable key.
    #[error("require_tag must have a non-empty 'key'")]
    EmptyTagKey,

    /// Bulk delete batch size outside the accepted range.
    #[error("max_delete_batch must be between 1 and {max}, got {got}")]
    BatchSize {
        /// Configured value.
        got: usize,
        /// Largest accepted value.
        max: usize,
    },

    /// A lifecycle state filter was configured but left empty.
    #[error("{field} must list at least one state")]
    EmptyStates {
        /// Name of the policy field.
        field: &'static str,
    },
}

/// Run-level failure of one service cleanup.
#[derive(Error, Debug)]
pub enum CleanupError {
    /// The policy was rejected before any resource was touched.
    #[error("Invalid policy: {0}")]
    Policy(#[from] PolicyError),

    /// Candidate resources could not be enumerated.
    #[error("Failed to list {kind} resources: {source}")]
    Listing {
        /// What was being listed.
        kind: ResourceKind,
        /// The underlying remote failure.
        #[source]
        source: RemoteError,
    },
}

impl CleanupError {
    /// Wrap a listing failure for `kind`.
    pub fn listing(kind: ResourceKind, source: RemoteError) -> Self {
        Self::Listing { kind, source }
    }
}
