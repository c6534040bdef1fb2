//! Error types for the PostgreSQL wire and literal decoding layer.

use std::fmt;
use std::io;

/// Result type for PostgreSQL decoding operations.
pub type PgResult<T> = Result<T, PgError>;

/// Errors that can occur while talking to the server or decoding what it sent.
#[derive(Debug)]
pub enum PgError {
    /// I/O error during communication.
    Io(io::Error),

    /// Protocol error (unexpected message, bad COPY signature, etc.).
    Protocol(String),

    /// The stream ended in the middle of a fixed-width read.
    Truncated { context: &'static str },

    /// A COPY tuple carried a different number of fields than were bound.
    FieldCountMismatch { expected: usize, actual: usize },

    /// Server returned an error.
    Server {
        severity: String,
        code: String,
        message: String,
        detail: Option<String>,
        hint: Option<String>,
    },

    /// A textual array/composite/row-id/blob literal could not be parsed.
    MalformedLiteral { value: String, reason: String },

    /// A numeric value does not fit the requested fixed-point target.
    NumericOutOfRange(String),

    /// Connection is closed or in invalid state.
    ConnectionClosed,
}

impl PgError {
    pub(crate) fn malformed(value: &str, reason: impl Into<String>) -> Self {
        PgError::MalformedLiteral {
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error means the byte stream can no longer be trusted.
    pub fn is_desync(&self) -> bool {
        matches!(
            self,
            PgError::Protocol(_) | PgError::Truncated { .. } | PgError::FieldCountMismatch { .. }
        )
    }
}

impl fmt::Display for PgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PgError::Io(e) => write!(f, "I/O error: {}", e),
            PgError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            PgError::Truncated { context } => {
                write!(f, "Protocol error: out of buffer while reading {}", context)
            }
            PgError::FieldCountMismatch { expected, actual } => write!(
                f,
                "Protocol error: tuple has {} fields but {} columns are bound",
                actual, expected
            ),
            PgError::Server {
                severity,
                code,
                message,
                detail,
                hint,
            } => {
                write!(f, "{}: {} ({})", severity, message, code)?;
                if let Some(d) = detail {
                    write!(f, "\nDetail: {}", d)?;
                }
                if let Some(h) = hint {
                    write!(f, "\nHint: {}", h)?;
                }
                Ok(())
            }
            PgError::MalformedLiteral { value, reason } => {
                write!(f, "Malformed literal \"{}\": {}", value, reason)
            }
            PgError::NumericOutOfRange(msg) => write!(f, "Numeric out of range: {}", msg),
            PgError::ConnectionClosed => write!(f, "Connection is closed"),
        }
    }
}

impl std::error::Error for PgError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PgError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PgError {
    fn from(e: io::Error) -> Self {
        PgError::Io(e)
    }
}
