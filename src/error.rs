//! Crate-wide error type.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Every failure this crate can surface, from wire-level framing problems
/// through handshake authentication failures to request/reply protocol
/// violations.
#[derive(Debug, Error)]
pub enum CurveZmqError {
    #[error("peer disconnected")]
    Disconnected,

    #[error("invalid greeting: {0}")]
    InvalidGreeting(String),

    #[error("unexpected protocol version: {major}.{minor}")]
    UnexpectedVersion { major: u8, minor: u8 },

    #[error("unexpected security mechanism: {0}")]
    UnexpectedMechanism(String),

    #[error("invalid frame flags: {0:#x}")]
    InvalidFlag(u8),

    #[error("invalid metadata record")]
    InvalidMetadata,

    #[error("invalid frame or message length: {0}")]
    InvalidLength(usize),

    #[error("invalid character in Z85 input")]
    InvalidChar,

    #[error("box decryption failed")]
    DecryptionError,

    #[error("vouch verification failed")]
    InvalidVouch,

    #[error("peer identity does not match the expected long-term key")]
    IdentityMismatch,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("missing reqId on request")]
    MissingReqId,

    #[error("duplicate reqId: {0}")]
    DuplicateReqId(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("invalid key encoding: {0}")]
    InvalidKey(String),

    #[error("directional nonce counter exhausted")]
    NonceExhausted,

    #[error("message truncated before a complete frame was read")]
    TruncatedMessage,

    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, CurveZmqError>;

impl CurveZmqError {
    /// Whether the underlying transport is no longer usable and the caller
    /// should treat the session as gone rather than retry a single call.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            CurveZmqError::Disconnected
                | CurveZmqError::Io(_)
                | CurveZmqError::TruncatedMessage
                | CurveZmqError::HandshakeTimeout(_)
        )
    }

    /// Whether retrying the same operation (e.g. a fresh dial) might succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            CurveZmqError::IdentityMismatch
                | CurveZmqError::InvalidVouch
                | CurveZmqError::DecryptionError
        )
    }
}

impl From<serde_json::Error> for CurveZmqError {
    fn from(err: serde_json::Error) -> Self {
        CurveZmqError::InvalidResponse(err.to_string())
    }
}
