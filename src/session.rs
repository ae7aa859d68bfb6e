//! The post-handshake CURVE session: encrypted `MESSAGE` framing with
//! independent, monotonically increasing nonce counters per direction.

use bytes::{Bytes, BytesMut};
use compio::buf::BufResult;
use compio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::crypto::{CurvePublicKey, PrecomputedKey};
use crate::error::{CurveZmqError, Result};
use crate::frame::{self, FLAG_COMMAND, FLAG_MORE};
use crate::handshake::HandshakeOutcome;
use crate::z85;

const CLIENT_MESSAGE_NONCE_PREFIX: &[u8; 16] = b"CurveZMQMESSAGEC";
const SERVER_MESSAGE_NONCE_PREFIX: &[u8; 16] = b"CurveZMQMESSAGES";

/// Directional message nonces start at 2: the handshake's own INITIATE and
/// READY nonces already used counter value 1 in each respective namespace.
const SESSION_NONCE_ORIGIN: u64 = 2;

fn nonce24(prefix: &[u8; 16], counter: u64) -> [u8; 24] {
    let mut nonce = [0u8; 24];
    nonce[..16].copy_from_slice(prefix);
    nonce[16..].copy_from_slice(&counter.to_be_bytes());
    nonce
}

/// An established, encrypted CURVE connection.
pub struct Session<S> {
    stream: S,
    xkey: PrecomputedKey,
    send_nonce: u64,
    is_server: bool,
    peer_identity_pk: CurvePublicKey,
    peer_metadata: Vec<(String, Bytes)>,
    max_frame_body_len: usize,
    read_buf_size: usize,
    closed: bool,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(stream: S, outcome: HandshakeOutcome, is_server: bool, max_frame_body_len: usize) -> Self {
        Self::with_read_buf_size(stream, outcome, is_server, max_frame_body_len, crate::config::DEFAULT_READ_BUF_SIZE)
    }

    pub(crate) fn with_read_buf_size(
        stream: S,
        outcome: HandshakeOutcome,
        is_server: bool,
        max_frame_body_len: usize,
        read_buf_size: usize,
    ) -> Self {
        Self {
            stream,
            xkey: outcome.xkey,
            send_nonce: SESSION_NONCE_ORIGIN,
            is_server,
            peer_identity_pk: outcome.peer_identity_pk,
            peer_metadata: outcome.peer_metadata,
            max_frame_body_len,
            read_buf_size,
            closed: false,
        }
    }

    #[must_use]
    pub fn peer_identity_pk(&self) -> &CurvePublicKey {
        &self.peer_identity_pk
    }

    /// The peer's `Identity` metadata property, Z85-decoded, if it sent one.
    #[must_use]
    pub fn remote_identity(&self) -> Option<Vec<u8>> {
        let value = frame::metadata_get(&self.peer_metadata, "Identity")?;
        z85::decode(std::str::from_utf8(value).ok()?).ok()
    }

    /// The peer's `Socket-Type` metadata property.
    #[must_use]
    pub fn remote_socket_type(&self) -> Option<&[u8]> {
        frame::metadata_get(&self.peer_metadata, "Socket-Type").map(|b| b.as_ref())
    }

    #[must_use]
    pub fn remote_metadata(&self) -> &[(String, Bytes)] {
        &self.peer_metadata
    }

    /// Encrypts and sends a single-part message. This design never
    /// fragments outbound payloads across multiple ZMTP frames.
    ///
    /// # Errors
    /// Returns [`CurveZmqError::NonceExhausted`] once the 64-bit directional
    /// counter would wrap, or a connection/encryption error otherwise.
    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        if self.closed {
            return Err(CurveZmqError::Disconnected);
        }
        if self.send_nonce == u64::MAX {
            return Err(CurveZmqError::NonceExhausted);
        }
        let prefix = if self.is_server {
            SERVER_MESSAGE_NONCE_PREFIX
        } else {
            CLIENT_MESSAGE_NONCE_PREFIX
        };
        let nonce = nonce24(prefix, self.send_nonce);

        let mut plaintext = Vec::with_capacity(payload.len() + 1);
        plaintext.push(0u8); // flags: single-part, no "more" bit
        plaintext.extend_from_slice(payload);
        let ciphertext = self.xkey.encrypt(&nonce, &plaintext)?;
        self.send_nonce += 1;

        let mut body = Vec::with_capacity(16 + ciphertext.len());
        body.push(7);
        body.extend_from_slice(b"MESSAGE");
        body.extend_from_slice(&(self.send_nonce - 1).to_be_bytes());
        body.extend_from_slice(&ciphertext);

        let BufResult(res, _) = self
            .stream
            .write_all(frame::encode_frame(0, &body))
            .await;
        res.map_err(CurveZmqError::Io)?;
        trace!("sent encrypted message ({} bytes plaintext)", payload.len());
        Ok(())
    }

    /// Receives one application message, reassembling multi-part input if
    /// the peer sent it that way. Returns `Ok(None)` on an orderly close
    /// with no partial message buffered.
    ///
    /// # Errors
    /// Returns [`CurveZmqError::DecryptionError`] if a MESSAGE frame fails
    /// authentication, or [`CurveZmqError::TruncatedMessage`] if the stream
    /// closes mid-message.
    pub async fn receive(&mut self) -> Result<Option<Bytes>> {
        if self.closed {
            return Ok(None);
        }
        let mut parts: Vec<Bytes> = Vec::new();
        loop {
            let frame = frame::read_frame(&mut self.stream, self.max_frame_body_len).await?;
            let (flags, body) = match frame {
                Some(f) => f,
                None if parts.is_empty() => return Ok(None),
                None => return Err(CurveZmqError::TruncatedMessage),
            };
            if flags & FLAG_COMMAND != 0 {
                // Unexpected post-handshake command frame; ignore per RFC 23.
                continue;
            }
            let (more, part) = self.decode_message_body(&body)?;
            parts.push(part);

            if !more {
                break;
            }
        }

        if parts.len() == 1 {
            Ok(Some(parts.into_iter().next().unwrap()))
        } else {
            let mut joined = bytes::BytesMut::new();
            for part in parts {
                joined.extend_from_slice(&part);
            }
            Ok(Some(joined.freeze()))
        }
    }

    /// Decrypts one `MESSAGE` frame body, returning `(more, payload)`.
    /// Factored out so the client connection task can feed frames decoded
    /// from its own accumulation buffer through the same nonce and AEAD
    /// logic `receive` uses.
    pub(crate) fn decode_message_body(&self, body: &[u8]) -> Result<(bool, Bytes)> {
        if body.len() < 33 || &body[..8] != b"\x07MESSAGE" {
            return Err(CurveZmqError::InvalidResponse("malformed MESSAGE frame".into()));
        }
        let counter = u64::from_be_bytes(body[8..16].try_into().unwrap());
        let prefix = if self.is_server {
            CLIENT_MESSAGE_NONCE_PREFIX
        } else {
            SERVER_MESSAGE_NONCE_PREFIX
        };
        let nonce = nonce24(prefix, counter);
        let plaintext = self.xkey.decrypt(&nonce, &body[16..])?;
        if plaintext.is_empty() {
            return Err(CurveZmqError::TruncatedMessage);
        }
        let more = plaintext[0] & FLAG_MORE != 0;
        Ok((more, Bytes::copy_from_slice(&plaintext[1..])))
    }

    /// Performs a single raw read into `buf`, appending whatever bytes
    /// arrived. Returns the number of bytes read (`0` means orderly close).
    /// Unlike the `read_exact`-based frame reads `receive` uses, this is one
    /// atomic I/O operation: racing it inside a `select!` against an
    /// outgoing command can never lose partially-read frame bytes, since
    /// either the read has fully completed by the time it's selected, or it
    /// hasn't produced anything yet.
    pub(crate) async fn read_some(&mut self, buf: &mut BytesMut) -> Result<usize> {
        let scratch = vec![0u8; self.read_buf_size];
        let BufResult(res, scratch) = self.stream.read(scratch).await;
        let n = res.map_err(CurveZmqError::Io)?;
        buf.extend_from_slice(&scratch[..n]);
        Ok(n)
    }

    /// Closes the underlying transport. Idempotent.
    ///
    /// # Errors
    /// Returns a connection error if the transport fails to shut down
    /// cleanly. Safe to ignore for a socket that is being discarded anyway.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream.shutdown().await.map_err(CurveZmqError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_FRAME_BODY_LEN;
    use crate::crypto::{CurveKeyPair, CurveSecretKey};

    async fn loopback_pair() -> (compio::net::TcpStream, compio::net::TcpStream) {
        let listener = compio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, (server, _)) =
            futures::join!(compio::net::TcpStream::connect(addr), listener.accept());
        (client.unwrap(), server.unwrap())
    }

    fn fake_outcome(xkey: PrecomputedKey, peer_identity_pk: CurvePublicKey) -> HandshakeOutcome {
        HandshakeOutcome {
            xkey,
            peer_identity_pk,
            peer_metadata: Vec::new(),
        }
    }

    #[test]
    fn test_decode_message_body_rejects_a_tampered_ciphertext() {
        compio::runtime::Runtime::new().unwrap().block_on(async {
            let (client_stream, _server_stream) = loopback_pair().await;

            let alice = CurveKeyPair::generate();
            let bob = CurveKeyPair::generate();
            // Same derived key computed independently on each "side".
            let sender_xkey = PrecomputedKey::new(&bob.public, &alice.secret);
            let session_xkey = PrecomputedKey::new(&bob.public, &CurveSecretKey::from_bytes(alice.secret.to_bytes()));

            let session = Session::new(client_stream, fake_outcome(session_xkey, bob.public), false, MAX_FRAME_BODY_LEN);

            let nonce = nonce24(SERVER_MESSAGE_NONCE_PREFIX, SESSION_NONCE_ORIGIN);
            let mut plaintext = vec![0u8]; // no FLAG_MORE
            plaintext.extend_from_slice(b"hello there");
            let ciphertext = sender_xkey.encrypt(&nonce, &plaintext).unwrap();

            let mut body = Vec::new();
            body.push(7);
            body.extend_from_slice(b"MESSAGE");
            body.extend_from_slice(&SESSION_NONCE_ORIGIN.to_be_bytes());
            body.extend_from_slice(&ciphertext);

            let (more, decoded) = session.decode_message_body(&body).unwrap();
            assert!(!more);
            assert_eq!(&decoded[..], b"hello there");

            let last = body.len() - 1;
            body[last] ^= 0xFF;
            assert!(matches!(
                session.decode_message_body(&body),
                Err(CurveZmqError::DecryptionError)
            ));
        });
    }

    #[test]
    fn test_send_and_receive_round_trip_over_a_real_connection() {
        compio::runtime::Runtime::new().unwrap().block_on(async {
            let (client_stream, server_stream) = loopback_pair().await;

            let alice = CurveKeyPair::generate();
            let bob = CurveKeyPair::generate();
            let client_xkey = PrecomputedKey::new(&bob.public, &alice.secret);
            let server_xkey = PrecomputedKey::new(&alice.public, &bob.secret);

            let mut client = Session::new(client_stream, fake_outcome(client_xkey, bob.public), false, MAX_FRAME_BODY_LEN);
            let mut server = Session::new(server_stream, fake_outcome(server_xkey, alice.public), true, MAX_FRAME_BODY_LEN);

            client.send(b"ping").await.unwrap();
            let received = server.receive().await.unwrap().unwrap();
            assert_eq!(&received[..], b"ping");

            server.send(b"pong").await.unwrap();
            let received = client.receive().await.unwrap().unwrap();
            assert_eq!(&received[..], b"pong");
        });
    }

    #[test]
    fn test_receive_reassembles_a_multi_part_message() {
        compio::runtime::Runtime::new().unwrap().block_on(async {
            let (mut client_stream, server_stream) = loopback_pair().await;

            let alice = CurveKeyPair::generate();
            let bob = CurveKeyPair::generate();
            let sender_xkey = PrecomputedKey::new(&bob.public, &alice.secret);
            let receiver_xkey = PrecomputedKey::new(&alice.public, &bob.secret);

            let mut receiver = Session::new(server_stream, fake_outcome(receiver_xkey, alice.public), true, MAX_FRAME_BODY_LEN);

            // Craft two raw MESSAGE frames by hand, since `send` never
            // fragments outbound payloads itself.
            for (counter, (more, chunk)) in [(true, &b"foo"[..]), (false, &b"bar"[..])].into_iter().enumerate() {
                let n = SESSION_NONCE_ORIGIN + counter as u64;
                let nonce = nonce24(CLIENT_MESSAGE_NONCE_PREFIX, n);
                let mut plaintext = vec![if more { FLAG_MORE } else { 0 }];
                plaintext.extend_from_slice(chunk);
                let ciphertext = sender_xkey.encrypt(&nonce, &plaintext).unwrap();
                let mut body = Vec::new();
                body.push(7);
                body.extend_from_slice(b"MESSAGE");
                body.extend_from_slice(&n.to_be_bytes());
                body.extend_from_slice(&ciphertext);
                let BufResult(res, _) = client_stream.write_all(frame::encode_frame(0, &body)).await;
                res.unwrap();
            }

            let received = receiver.receive().await.unwrap().unwrap();
            assert_eq!(&received[..], b"foobar");
        });
    }
}
