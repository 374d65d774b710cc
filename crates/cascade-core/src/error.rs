//! Error types for the selection core
//!
//! Three layers, matching the retrieval path:
//! - [`SourceError`]: failures reported by a candidate source
//! - [`RetryError`]: the outcome of running a source call through the
//!   retry executor
//! - [`SelectError`]: the crate-level taxonomy surfaced to owners of a
//!   selector or cascade

/// Failures reported by a candidate source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The backing source could not be reached at all
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The source was reached but the fetch itself failed
    #[error("fetch failed: {0}")]
    Fetch(String),
}

/// Outcome of running an operation through [`crate::retry::RetryPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetryError {
    /// Every attempt failed; carries the final failure
    #[error("retries exhausted after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: SourceError,
    },

    /// The cancellation token fired before an attempt succeeded
    #[error("operation cancelled")]
    Cancelled,
}

/// Crate-level error taxonomy.
///
/// `Cancelled` is expected control flow: an epoch was superseded and the
/// completion must be discarded. It is never surfaced to a user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectError {
    /// Retrieval failed after the retry policy was exhausted
    #[error("retrieval failed: {0}")]
    Retrieval(#[source] SourceError),

    /// The operation's epoch was superseded
    #[error("superseded by a newer epoch")]
    Cancelled,

    /// `validate` was invoked with no highlighted candidate
    #[error("no candidate is highlighted")]
    NoHighlight,

    /// A pointer commit referenced a value outside the candidate set
    #[error("value is not a current candidate")]
    UnknownCandidate,
}

impl SelectError {
    /// True for the epoch-superseded outcome, which callers swallow.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// True for caller-discipline bugs rather than runtime conditions.
    #[inline]
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::NoHighlight | Self::UnknownCandidate)
    }
}

impl From<RetryError> for SelectError {
    fn from(value: RetryError) -> Self {
        match value {
            RetryError::Exhausted { source, .. } => Self::Retrieval(source),
            RetryError::Cancelled => Self::Cancelled,
        }
    }
}
