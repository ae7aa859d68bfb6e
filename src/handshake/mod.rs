//! The CurveZMQ handshake: HELLO / WELCOME / INITIATE / READY.
//!
//! Byte layouts follow RFC 26 exactly (verified against a reference Python
//! implementation's wire traffic, not reconstructed from the abbreviated
//! version in the teacher's own CURVE mechanism, which truncates nonces and
//! skips the vouch/cookie entirely).

pub mod client;
pub mod server;

use bytes::Bytes;
use compio::buf::{IoBuf, IoBufMut};
use compio::io::{AsyncRead, AsyncWrite, AsyncReadExt, AsyncWriteExt};
use compio::buf::BufResult;

use crate::crypto::{CurvePublicKey, PrecomputedKey};
use crate::error::{CurveZmqError, Result};

pub(crate) const HELLO_NONCE_PREFIX: &[u8; 16] = b"CurveZMQHELLO---";
pub(crate) const WELCOME_NONCE_PREFIX: &[u8; 8] = b"WELCOME-";
pub(crate) const VOUCH_NONCE_PREFIX: &[u8; 8] = b"VOUCH---";
pub(crate) const INITIATE_NONCE_PREFIX: &[u8; 16] = b"CurveZMQINITIATE";
pub(crate) const READY_NONCE_PREFIX: &[u8; 16] = b"CurveZMQREADY---";

/// The handshake always uses counter value 1 for its one-shot INITIATE and
/// READY nonces; the session's directional message counters start at 2
/// afterwards, so no nonce value is ever reused.
pub(crate) const HANDSHAKE_NONCE_COUNTER: u64 = 1;

/// What a completed handshake, from either side, hands back to the session
/// layer.
pub struct HandshakeOutcome {
    pub xkey: PrecomputedKey,
    pub peer_identity_pk: CurvePublicKey,
    pub peer_metadata: Vec<(String, Bytes)>,
}

pub(crate) fn nonce24(prefix: &[u8], suffix: &[u8]) -> [u8; 24] {
    let mut nonce = [0u8; 24];
    nonce[..prefix.len()].copy_from_slice(prefix);
    nonce[prefix.len()..prefix.len() + suffix.len()].copy_from_slice(suffix);
    nonce
}

pub(crate) async fn read_exact_owned<S, B>(stream: &mut S, buf: B) -> Result<B>
where
    S: AsyncRead + Unpin,
    B: IoBufMut,
{
    let BufResult(res, buf) = stream.read_exact(buf).await;
    res.map_err(CurveZmqError::Io)?;
    Ok(buf)
}

pub(crate) async fn write_all_owned<S, B>(stream: &mut S, buf: B) -> Result<()>
where
    S: AsyncWrite + Unpin,
    B: IoBuf,
{
    let BufResult(res, _buf) = stream.write_all(buf).await;
    res.map_err(CurveZmqError::Io)
}

fn command_name(body: &[u8], name: &[u8]) -> Result<()> {
    if body.len() < 1 + name.len() || body[0] as usize != name.len() || &body[1..1 + name.len()] != name {
        return Err(CurveZmqError::InvalidResponse(format!(
            "expected {} command",
            String::from_utf8_lossy(name)
        )));
    }
    Ok(())
}

pub(crate) fn build_hello(ephemeral_pk: &CurvePublicKey, nonce_suffix: &[u8; 8], signature_box: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(200);
    body.push(5);
    body.extend_from_slice(b"HELLO");
    body.push(1);
    body.push(0);
    body.extend_from_slice(&[0u8; 72]);
    body.extend_from_slice(ephemeral_pk.as_ref());
    body.extend_from_slice(nonce_suffix);
    body.extend_from_slice(signature_box);
    debug_assert_eq!(body.len(), 200);
    body
}

pub(crate) fn parse_hello(body: &[u8]) -> Result<([u8; 32], [u8; 8], Bytes)> {
    if body.len() != 200 {
        return Err(CurveZmqError::InvalidResponse("malformed HELLO length".into()));
    }
    command_name(body, b"HELLO")?;
    if body[6] != 1 {
        return Err(CurveZmqError::UnexpectedVersion { major: body[6], minor: body[7] });
    }
    let mut eph_pk = [0u8; 32];
    eph_pk.copy_from_slice(&body[80..112]);
    let mut nonce_suffix = [0u8; 8];
    nonce_suffix.copy_from_slice(&body[112..120]);
    let signature_box = Bytes::copy_from_slice(&body[120..200]);
    Ok((eph_pk, nonce_suffix, signature_box))
}

pub(crate) fn build_welcome(nonce_suffix: &[u8; 16], welcome_box: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(168);
    body.push(7);
    body.extend_from_slice(b"WELCOME");
    body.extend_from_slice(nonce_suffix);
    body.extend_from_slice(welcome_box);
    debug_assert_eq!(body.len(), 168);
    body
}

pub(crate) fn parse_welcome(body: &[u8]) -> Result<([u8; 16], Bytes)> {
    if body.len() != 168 {
        return Err(CurveZmqError::InvalidResponse("malformed WELCOME length".into()));
    }
    command_name(body, b"WELCOME")?;
    let mut nonce_suffix = [0u8; 16];
    nonce_suffix.copy_from_slice(&body[8..24]);
    let welcome_box = Bytes::copy_from_slice(&body[24..168]);
    Ok((nonce_suffix, welcome_box))
}

pub(crate) fn build_initiate(cookie: &[u8; 96], nonce_suffix: &[u8; 8], init_box: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(113 + init_box.len());
    body.push(8);
    body.extend_from_slice(b"INITIATE");
    body.extend_from_slice(cookie);
    body.extend_from_slice(nonce_suffix);
    body.extend_from_slice(init_box);
    debug_assert_eq!(body.len(), 113 + init_box.len());
    body
}

pub(crate) fn parse_initiate(body: &[u8]) -> Result<([u8; 96], [u8; 8], Bytes)> {
    if body.len() < 113 + 16 {
        return Err(CurveZmqError::InvalidResponse("malformed INITIATE length".into()));
    }
    command_name(body, b"INITIATE")?;
    let mut cookie = [0u8; 96];
    cookie.copy_from_slice(&body[9..105]);
    let mut nonce_suffix = [0u8; 8];
    nonce_suffix.copy_from_slice(&body[105..113]);
    let init_box = Bytes::copy_from_slice(&body[113..]);
    Ok((cookie, nonce_suffix, init_box))
}

pub(crate) fn build_ready(nonce_suffix: &[u8; 8], ready_box: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(14 + ready_box.len());
    body.push(5);
    body.extend_from_slice(b"READY");
    body.extend_from_slice(nonce_suffix);
    body.extend_from_slice(ready_box);
    debug_assert_eq!(body.len(), 14 + ready_box.len());
    body
}

pub(crate) fn parse_ready(body: &[u8]) -> Result<([u8; 8], Bytes)> {
    if body.len() < 14 {
        return Err(CurveZmqError::InvalidResponse("malformed READY length".into()));
    }
    command_name(body, b"READY")?;
    let mut nonce_suffix = [0u8; 8];
    nonce_suffix.copy_from_slice(&body[6..14]);
    let ready_box = Bytes::copy_from_slice(&body[14..]);
    Ok((nonce_suffix, ready_box))
}
