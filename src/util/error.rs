//! Error types for the SPM library.
//!
//! Everything in [`Error`] is fatal: the operation that produced it is
//! aborted and no output is written. Recoverable problems are reported as
//! [`Diagnostic`](super::Diagnostic)s instead.

use thiserror::Error;

/// Main error type for SPM operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad magic, unknown version, truncated data or inconsistent section.
    #[error("Malformed SPM container: {0}")]
    MalformedContainer(String),

    /// A sub-mesh declares a vertex attribute bitmask this reader does not know.
    #[error("Unsupported vertex attribute combination: {0:#04x}")]
    UnsupportedAttributeCombination(u8),

    /// The joint parent graph contains a cycle.
    #[error("Joint hierarchy contains a cycle through joint {joint}")]
    JointHierarchyCycle { joint: usize },

    /// A joint transform or keyframe time is NaN or infinite.
    #[error("Non-finite transform on joint {joint}{}", .time.map(|t| format!(" at time {t}")).unwrap_or_default())]
    NonFiniteTransform { joint: usize, time: Option<f32> },

    /// Data handed over by the scene adapter violates a model invariant.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The caller cancelled the operation between two stages.
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a malformed container error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedContainer(msg.into())
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Result type alias for SPM operations.
pub type Result<T> = std::result::Result<T, Error>;
