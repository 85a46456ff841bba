//! Step-level error types.

use thiserror::Error;

/// Errors returned by a host capability (action handler, webhook delivery,
/// notification sink).
///
/// The variant decides whether a step's own retry policy applies:
/// - `Retryable`: the call may be attempted again if the step's config
///   asks for retries.
/// - `Fatal`: the step fails immediately.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// Transient failure; the step may re-try the call.
    #[error("retryable capability error: {0}")]
    Retryable(String),

    /// Permanent failure; no retry should be attempted.
    #[error("fatal capability error: {0}")]
    Fatal(String),
}

impl CapabilityError {
    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(msg) | Self::Fatal(msg) => msg,
        }
    }
}

/// The executor observed the execution's cancellation signal before the
/// step produced an outcome. Nothing is recorded for the interrupted step.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("step interrupted by cancellation")]
pub struct Interrupted;
