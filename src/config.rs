//! Ambient tunables the protocol leaves as implementation-defined.

use std::time::Duration;

/// Upper bound on a single decoded frame body. The reference implementation
/// imposes no limit at all; this crate rejects anything past this ceiling
/// with [`crate::error::CurveZmqError::InvalidLength`] rather than buffering
/// an attacker-controlled amount of memory.
pub const MAX_FRAME_BODY_LEN: usize = 1 << 20; // 1 MiB

/// Default timeout for each blocking step of the handshake (greeting,
/// HELLO/WELCOME/INITIATE/READY exchange).
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_READ_BUF_SIZE: usize = 8192;
pub const DEFAULT_WRITE_BUF_SIZE: usize = 8192;

/// Buffer and timeout configuration for a [`crate::client::Client`] or
/// [`crate::server::Server`].
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub read_buf_size: usize,
    pub write_buf_size: usize,
    pub max_frame_body_len: usize,
    pub handshake_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            read_buf_size: DEFAULT_READ_BUF_SIZE,
            write_buf_size: DEFAULT_WRITE_BUF_SIZE,
            max_frame_body_len: MAX_FRAME_BODY_LEN,
            handshake_timeout: Some(DEFAULT_HANDSHAKE_TIMEOUT),
        }
    }
}

impl Config {
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_frame_body_len(mut self, max: usize) -> Self {
        self.max_frame_body_len = max;
        self
    }
}
