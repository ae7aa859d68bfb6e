//! The `DEALER`-role connection: dials a server, drives the handshake, then
//! hands the session to a background connection task so `request` can be
//! called concurrently with an in-flight reply.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use compio::net::TcpStream;
use serde_json::Value;
use tracing::warn;

use crate::config::Config;
use crate::correlator::{canonical_req_id, Correlator, PendingHandle};
use crate::crypto::CurveKeyPair;
use crate::error::{CurveZmqError, Result};
use crate::frame::{self, FLAG_COMMAND};
use crate::handshake;
use crate::keys::Verkey;
use crate::session::Session;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A connected CURVE client. Cloning shares the same background connection
/// task and correlator table; the connection closes once every clone (and
/// every outstanding [`PendingHandle`]) has been dropped.
#[derive(Clone)]
pub struct Client {
    cmd_tx: flume::Sender<Vec<u8>>,
    correlator: Arc<Correlator>,
    server_identity: crate::crypto::CurvePublicKey,
}

impl Client {
    /// Dials `addr`, performs the CURVE handshake against `server_verkey`,
    /// and spawns the background task that drives the connection.
    ///
    /// `identity` is this client's own long-term CURVE keypair; pass
    /// `CurveKeyPair::generate()` for an anonymous client with no persistent
    /// identity. The `Identity` metadata value advertised to the server
    /// during the handshake is always this keypair's own public key,
    /// Z85-encoded (the same thing `server::handle_connection` announces),
    /// so a peer that already knows this client's verkey can confirm the
    /// handshake landed on the right client.
    ///
    /// # Errors
    /// Returns a connection error if the TCP dial fails, or any handshake
    /// error (vouch mismatch, identity mismatch, decryption failure, ...).
    pub async fn connect(addr: &str, identity: &CurveKeyPair, server_verkey: &Verkey) -> Result<Self> {
        Self::connect_with_config(addr, identity, server_verkey, &Config::default()).await
    }

    /// As [`Client::connect`], with an explicit [`Config`] controlling the
    /// handshake timeout and frame size ceiling.
    ///
    /// # Errors
    /// See [`Client::connect`].
    pub async fn connect_with_config(
        addr: &str,
        identity: &CurveKeyPair,
        server_verkey: &Verkey,
        config: &Config,
    ) -> Result<Self> {
        let mut stream = TcpStream::connect(addr).await.map_err(CurveZmqError::Io)?;
        let server_pk = server_verkey.to_curve_public()?;
        let identity_property = crate::z85::encode(identity.public.as_ref())?.into_bytes();

        let outcome = match config.handshake_timeout {
            Some(timeout) => compio::time::timeout(
                timeout,
                handshake::client::perform(&mut stream, identity, &server_pk, "DEALER", &identity_property),
            )
            .await
            .map_err(|_| CurveZmqError::HandshakeTimeout(timeout))??,
            None => {
                handshake::client::perform(&mut stream, identity, &server_pk, "DEALER", &identity_property).await?
            }
        };

        let server_identity = outcome.peer_identity_pk;
        let session = Session::with_read_buf_size(stream, outcome, false, config.max_frame_body_len, config.read_buf_size);

        let (cmd_tx, cmd_rx) = flume::unbounded();
        let correlator = Arc::new(Correlator::new());
        let task_correlator = Arc::clone(&correlator);
        let max_frame_body_len = config.max_frame_body_len;
        compio::runtime::spawn(async move {
            run_connection(session, cmd_rx, task_correlator, max_frame_body_len).await;
        })
        .detach();

        Ok(Self {
            cmd_tx,
            correlator,
            server_identity,
        })
    }

    #[must_use]
    pub fn server_identity(&self) -> &crate::crypto::CurvePublicKey {
        &self.server_identity
    }

    /// Serializes and sends a JSON request, registering its `reqId` for
    /// correlation. Awaiting the returned handle resolves once a matching
    /// `REPLY` (or `REQNACK`) arrives.
    ///
    /// # Errors
    /// Returns [`CurveZmqError::MissingReqId`] if `message` has no `reqId`
    /// field, [`CurveZmqError::DuplicateReqId`] if one is already in
    /// flight, or [`CurveZmqError::Disconnected`] if the connection is
    /// already gone.
    pub fn request(&self, message: &Value) -> Result<PendingHandle> {
        let req_id = message
            .get("reqId")
            .ok_or(CurveZmqError::MissingReqId)
            .and_then(canonical_req_id)?;
        let handle = self.correlator.register(req_id)?;
        let payload = serde_json::to_vec(message)?;
        self.cmd_tx
            .send(payload)
            .map_err(|_| CurveZmqError::Disconnected)?;
        Ok(handle)
    }

    /// Resolves every request still awaiting a reply with
    /// [`CurveZmqError::Disconnected`]. The underlying socket is torn down
    /// once every clone of this `Client` has been dropped.
    pub fn close(&self) {
        self.correlator.fail_all();
    }
}

async fn run_connection<S>(
    mut session: Session<S>,
    cmd_rx: flume::Receiver<Vec<u8>>,
    correlator: Arc<Correlator>,
    max_frame_body_len: usize,
) where
    S: compio::io::AsyncRead + compio::io::AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(4096);
    let mut parts: Vec<Bytes> = Vec::new();

    'outer: loop {
        while let Ok(payload) = cmd_rx.try_recv() {
            if let Err(e) = session.send(&payload).await {
                warn!(error = %e, "failed to send queued request, closing connection");
                break 'outer;
            }
        }
        if cmd_rx.is_disconnected() {
            break;
        }

        match compio::time::timeout(POLL_INTERVAL, session.read_some(&mut buf)).await {
            Err(_) => continue, // no inbound data within the poll window, go drain outgoing again
            Ok(Err(e)) => {
                warn!(error = %e, "read failed, closing connection");
                break;
            }
            Ok(Ok(0)) => break, // orderly close
            Ok(Ok(_)) => loop {
                match frame::try_decode_frame(&mut buf, max_frame_body_len) {
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "malformed frame, closing connection");
                        break 'outer;
                    }
                    Ok(Some((flags, body))) => {
                        if flags & FLAG_COMMAND != 0 {
                            continue;
                        }
                        match session.decode_message_body(&body) {
                            Err(e) => {
                                warn!(error = %e, "failed to decrypt MESSAGE frame, closing connection");
                                break 'outer;
                            }
                            Ok((more, part)) => {
                                parts.push(part);
                                if more {
                                    continue;
                                }
                                let message = join_parts(&mut parts);
                                match serde_json::from_slice::<Value>(&message) {
                                    Err(e) => {
                                        let e = CurveZmqError::from(e);
                                        warn!(error = %e, "reply was not valid JSON, closing connection");
                                        break 'outer;
                                    }
                                    Ok(value) => {
                                        if let Err(e) = correlator.dispatch(&value) {
                                            warn!(error = %e, "protocol error dispatching reply, closing connection");
                                            break 'outer;
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            },
        }
    }

    correlator.fail_all();
    let _ = session.close().await;
}

fn join_parts(parts: &mut Vec<Bytes>) -> Bytes {
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        let mut joined = BytesMut::new();
        for part in parts.drain(..) {
            joined.extend_from_slice(&part);
        }
        joined.freeze()
    }
}
