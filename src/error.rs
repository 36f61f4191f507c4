// src/error.rs
use thiserror::Error;

/// Codec-level failures, all detectable without touching a tag.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NdefError {
    #[error("invalid TNF value {0}")]
    InvalidTnf(u8),

    #[error("invalid mime type: {0}")]
    InvalidMimeType(String),

    #[error("invalid type field for TNF {tnf}: {reason}")]
    InvalidRecordType { tnf: u8, reason: &'static str },

    #[error("{field} field is {len} bytes, longer than the record format allows")]
    FieldTooLong { field: &'static str, len: usize },

    #[error("record at offset {offset} needs {needed} bytes but only {available} remain")]
    TruncatedRecord {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("malformed record header 0x{header:02X} at offset {offset}: {reason}")]
    MalformedHeader {
        offset: usize,
        header: u8,
        reason: &'static str,
    },

    #[error("an NDEF message needs at least one record")]
    EmptyMessage,

    #[error("no record marked as message end")]
    MissingMessageEnd,

    #[error("record {index} has an unexpected message-begin flag")]
    UnexpectedRecord { index: usize },

    #[error("message is {size} bytes, limit is {max}")]
    MessageTooLarge { size: usize, max: usize },
}

/// Failure signal delivered to a caller's pending request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session canceled by user")]
    Canceled,

    #[error("no tag detected before timeout")]
    TimedOut,

    #[error("session ended")]
    Ended,

    #[error("session failed: {0}")]
    Failed(String),

    #[error("encode error: {0}")]
    Encode(#[from] NdefError),
}

impl SessionError {
    /// Caller-visible signal name.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Canceled => "CANCELED",
            SessionError::TimedOut => "TIMED_OUT",
            SessionError::Ended => "ENDED",
            SessionError::Failed(_) | SessionError::Encode(_) => "FAILED",
        }
    }

    pub fn detail(&self) -> Option<String> {
        match self {
            SessionError::Failed(detail) => Some(detail.clone()),
            SessionError::Encode(err) => Some(err.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has invalid value {value:?}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}
