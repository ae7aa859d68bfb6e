//! # curvezmq
//!
//! A CurveZMQ (ZeroMQ RFC 26) secure transport for a `DEALER`/`ROUTER` pair
//! speaking a JSON request/reply protocol over ZMTP 3.0 (RFC 23).
//!
//! This crate implements exactly one mechanism (CURVE) and one socket
//! pairing: a [`client::Client`] dials a [`server::run`] accept loop, the
//! two sides authenticate each other's long-term Curve25519 keys via the
//! HELLO/WELCOME/INITIATE/READY handshake, and every `MESSAGE` frame after
//! that point is encrypted and authenticated under the resulting shared key.
//!
//! ## Layers
//!
//! - [`z85`] / [`frame`]: wire-level codecs (Z85 text encoding, ZMTP framing
//!   and metadata records).
//! - [`crypto`] / [`keys`] / [`greeting`]: Curve25519 box primitives, verkey
//!   management, and the ZMTP greeting exchange.
//! - [`handshake`]: the four-message CURVE handshake, client and server
//!   sides.
//! - [`session`]: the encrypted `MESSAGE` framing used once a handshake
//!   completes.
//! - [`correlator`]: matches outgoing `reqId`-keyed JSON requests against
//!   `REQACK`/`REQNACK`/`REPLY` responses.
//! - [`client`] / [`server`]: the two socket roles built on top of the above.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::future_not_send)]

pub mod client;
pub mod config;
pub mod correlator;
pub mod crypto;
pub mod error;
pub mod frame;
pub mod greeting;
pub mod handshake;
pub mod keys;
pub mod server;
pub mod session;
pub mod z85;

pub use client::Client;
pub use config::Config;
pub use correlator::PendingHandle;
pub use crypto::{CurveKeyPair, CurvePublicKey, CurveSecretKey};
pub use error::{CurveZmqError, Result};
pub use keys::{LongTermKeyPair, Verkey};
pub use session::Session;

/// Re-exports covering the common client/server setup path.
pub mod prelude {
    pub use crate::client::Client;
    pub use crate::config::Config;
    pub use crate::crypto::CurveKeyPair;
    pub use crate::error::{CurveZmqError, Result};
    pub use crate::keys::{LongTermKeyPair, Verkey};
    pub use crate::session::Session;
}
