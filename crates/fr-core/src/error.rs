//! Unified error type for the recorder.
//!
//! All crates funnel their failures into [`Error`]. Only
//! [`Error::Persistence`] and [`Error::Poisoned`] describe a session that
//! must be discarded; see [`Error::is_fatal`].

use crate::ids::TrackId;

/// Unified error type covering all failure modes of a recording session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The container collaborator failed to initialize, write, or close a segment.
    #[error("Persistence error in segment {segment}: {source}")]
    Persistence {
        /// Sequence number of the segment being written.
        segment: u64,
        /// The underlying collaborator error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The session already failed fatally or was finished.
    #[error("Session is no longer accepting samples")]
    Poisoned,

    /// A sample was offered for a track the session was not configured with.
    #[error("Unknown track: {0}")]
    UnknownTrack(TrackId),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Configuration failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A line of a sample trace could not be parsed.
    #[error("Trace error at line {line}: {message}")]
    Trace {
        /// 1-based line number.
        line: usize,
        /// Human-readable error description.
        message: String,
    },
}

impl Error {
    /// Whether the session that produced this error must be discarded.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Persistence { .. } | Error::Poisoned)
    }

    /// Convenience constructor for [`Error::Persistence`].
    pub fn persistence(
        segment: u64,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Error::Persistence {
            segment,
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::Trace`].
    pub fn trace(line: usize, message: impl Into<String>) -> Self {
        Error::Trace {
            line,
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
