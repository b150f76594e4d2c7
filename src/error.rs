//! Error types for the Claude session relay

use thiserror::Error;

/// Coarse classification of a [`RelayError`]
///
/// Attached to `error` events so subscribers can route on the kind without
/// matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or unrecognized line from subprocess output
    Protocol,
    /// Spawn failure, subprocess-level fault, or stray stderr output
    Process,
    /// Registry is at its configured maximum
    Capacity,
    /// Unknown session id
    NotFound,
    /// Session input pipe is not writable
    InactiveSession,
    /// Session id is already registered
    AlreadyActive,
    /// Invalid configuration
    Config,
    /// History store could not be read
    History,
    /// Underlying I/O failure
    Io,
    /// JSON serialization failure
    Json,
}

/// Main error type for the relay
#[derive(Error, Debug)]
pub enum RelayError {
    /// Line from the subprocess could not be decoded
    #[error("Protocol error: {message}")]
    Protocol {
        /// What was wrong with the line
        message: String,
        /// The offending line, trimmed
        raw_line: String,
    },

    /// Subprocess spawn or runtime fault
    #[error("Process error: {0}")]
    Process(String),

    /// Maximum active sessions limit reached
    #[error("Maximum sessions reached ({0}). Stop a session first.")]
    Capacity(usize),

    /// Session not registered
    #[error("Session not found: {0}")]
    NotFound(String),

    /// Session cannot accept input
    #[error("Session is not active: {0}")]
    InactiveSession(String),

    /// Resume target is already running
    #[error("Session is already active: {0}")]
    AlreadyActive(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// History store error
    #[error("History error: {0}")]
    History(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error outside of protocol decoding
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Create a protocol error carrying the raw line
    pub fn protocol(msg: impl Into<String>, raw_line: impl Into<String>) -> Self {
        Self::Protocol {
            message: msg.into(),
            raw_line: raw_line.into(),
        }
    }

    /// Create a process error
    pub fn process(msg: impl Into<String>) -> Self {
        Self::Process(msg.into())
    }

    /// Create a not found error
    pub fn not_found(session_id: impl Into<String>) -> Self {
        Self::NotFound(session_id.into())
    }

    /// Create an inactive session error
    pub fn inactive_session(session_id: impl Into<String>) -> Self {
        Self::InactiveSession(session_id.into())
    }

    /// Create an invalid configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a history error
    pub fn history(msg: impl Into<String>) -> Self {
        Self::History(msg.into())
    }

    /// Classify this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::Process(_) => ErrorKind::Process,
            Self::Capacity(_) => ErrorKind::Capacity,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InactiveSession(_) => ErrorKind::InactiveSession,
            Self::AlreadyActive(_) => ErrorKind::AlreadyActive,
            Self::Config(_) => ErrorKind::Config,
            Self::History(_) => ErrorKind::History,
            Self::Io(_) => ErrorKind::Io,
            Self::Json(_) => ErrorKind::Json,
        }
    }

    /// The raw line for protocol errors
    #[must_use]
    pub fn raw_line(&self) -> Option<&str> {
        match self {
            Self::Protocol { raw_line, .. } => Some(raw_line),
            _ => None,
        }
    }
}
