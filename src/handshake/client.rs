//! Client-side (DEALER) half of the CurveZMQ handshake.

use compio::io::{AsyncRead, AsyncWrite};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;

use super::{
    build_hello, build_initiate, nonce24, parse_ready, parse_welcome, read_exact_owned,
    write_all_owned, HandshakeOutcome, HANDSHAKE_NONCE_COUNTER, HELLO_NONCE_PREFIX,
    INITIATE_NONCE_PREFIX, READY_NONCE_PREFIX, VOUCH_NONCE_PREFIX, WELCOME_NONCE_PREFIX,
};
use crate::crypto::{self, CurveKeyPair, CurvePublicKey, PrecomputedKey};
use crate::error::{CurveZmqError, Result};
use crate::frame::{self, FLAG_COMMAND};
use crate::greeting;
use crate::z85;

/// Drives a full handshake as the connecting (DEALER) side.
///
/// `identity` is this peer's own long-term CURVE keypair (anonymous clients
/// may pass a freshly generated one), `server_pk` is the target's long-term
/// CURVE public key, and `identity_property` is the Z85-encoded value sent
/// as the `Identity` metadata property (empty for anonymous clients).
pub async fn perform<S>(
    stream: &mut S,
    identity: &CurveKeyPair,
    server_pk: &CurvePublicKey,
    socket_type: &str,
    identity_property: &[u8],
) -> Result<HandshakeOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_all_owned(stream, greeting::build_greeting(false).to_vec()).await?;
    let peer_greeting: [u8; 64] = read_exact_owned(stream, [0u8; 64]).await?;
    greeting::parse_greeting(&peer_greeting)?;
    debug!("client: greeting exchanged");

    let ephemeral = CurveKeyPair::generate();
    let mut hello_nonce_suffix = [0u8; 8];
    OsRng.fill_bytes(&mut hello_nonce_suffix);
    let signature_box = crypto::seal(
        &[0u8; 64],
        &nonce24(HELLO_NONCE_PREFIX, &hello_nonce_suffix),
        server_pk,
        &ephemeral.secret,
    )?;
    let hello = build_hello(&ephemeral.public, &hello_nonce_suffix, &signature_box);
    write_all_owned(stream, frame::encode_frame(FLAG_COMMAND, &hello)).await?;
    debug!("client: sent HELLO");

    let (flags, welcome_body) = frame::read_frame(stream, 4096)
        .await?
        .ok_or(CurveZmqError::Disconnected)?;
    if flags & FLAG_COMMAND == 0 {
        return Err(CurveZmqError::InvalidFlag(flags));
    }
    let (welcome_nonce_suffix, welcome_box) = parse_welcome(&welcome_body)?;
    let welcome_plaintext = crypto::open(
        &welcome_box,
        &nonce24(WELCOME_NONCE_PREFIX, &welcome_nonce_suffix),
        server_pk,
        &ephemeral.secret,
    )?;
    if welcome_plaintext.len() != 128 {
        return Err(CurveZmqError::InvalidResponse("malformed WELCOME payload".into()));
    }
    let mut server_eph_pk_bytes = [0u8; 32];
    server_eph_pk_bytes.copy_from_slice(&welcome_plaintext[..32]);
    let server_eph_pk = CurvePublicKey::from_bytes(server_eph_pk_bytes);
    let mut cookie = [0u8; 96];
    cookie.copy_from_slice(&welcome_plaintext[32..128]);
    debug!("client: received WELCOME");

    let mut vouch_nonce_suffix = [0u8; 16];
    OsRng.fill_bytes(&mut vouch_nonce_suffix);
    let mut vouch_plaintext = Vec::with_capacity(64);
    vouch_plaintext.extend_from_slice(ephemeral.public.as_ref());
    vouch_plaintext.extend_from_slice(server_pk.as_ref());
    let vouch_box = crypto::seal(
        &vouch_plaintext,
        &nonce24(VOUCH_NONCE_PREFIX, &vouch_nonce_suffix),
        &server_eph_pk,
        &identity.secret,
    )?;
    let mut vouch = Vec::with_capacity(96);
    vouch.extend_from_slice(&vouch_nonce_suffix);
    vouch.extend_from_slice(&vouch_box);

    let metadata = frame::encode_metadata(&[
        ("Socket-Type", socket_type.as_bytes()),
        ("Identity", identity_property),
    ]);

    let xkey = PrecomputedKey::new(&server_eph_pk, &ephemeral.secret);
    let init_nonce_suffix = HANDSHAKE_NONCE_COUNTER.to_be_bytes();
    let mut init_plaintext = Vec::with_capacity(128 + metadata.len());
    init_plaintext.extend_from_slice(identity.public.as_ref());
    init_plaintext.extend_from_slice(&vouch);
    init_plaintext.extend_from_slice(&metadata);
    let init_box = xkey.encrypt(
        &nonce24(INITIATE_NONCE_PREFIX, &init_nonce_suffix),
        &init_plaintext,
    )?;
    let initiate = build_initiate(&cookie, &init_nonce_suffix, &init_box);
    write_all_owned(stream, frame::encode_frame(FLAG_COMMAND, &initiate)).await?;
    debug!("client: sent INITIATE");

    let (flags, ready_body) = frame::read_frame(stream, 4096)
        .await?
        .ok_or(CurveZmqError::Disconnected)?;
    if flags & FLAG_COMMAND == 0 {
        return Err(CurveZmqError::InvalidFlag(flags));
    }
    let (ready_nonce_suffix, ready_box) = parse_ready(&ready_body)?;
    let ready_plaintext = xkey.decrypt(
        &nonce24(READY_NONCE_PREFIX, &ready_nonce_suffix),
        &ready_box,
    )?;
    let peer_metadata = frame::decode_metadata(&ready_plaintext)?;
    debug!("client: received READY");

    verify_peer_identity(&peer_metadata, server_pk)?;

    Ok(HandshakeOutcome {
        xkey,
        peer_identity_pk: *server_pk,
        peer_metadata,
    })
}

/// Confirms the `Identity` property a server advertised in READY (its own
/// long-term key, Z85-encoded) names the same key this client dialed, if it
/// sent one at all. A server that omits the property is not checked, same as
/// the original's `if ident and ident != curve_pk: raise ...`.
///
/// # Errors
/// Returns [`CurveZmqError::IdentityMismatch`] on a mismatch, or
/// [`CurveZmqError::InvalidResponse`] if the property is present but not
/// valid Z85 text.
fn verify_peer_identity(peer_metadata: &[(String, bytes::Bytes)], expected_pk: &CurvePublicKey) -> Result<()> {
    let Some(server_identity) = frame::metadata_get(peer_metadata, "Identity") else {
        return Ok(());
    };
    let decoded = z85::decode(
        std::str::from_utf8(server_identity)
            .map_err(|_| CurveZmqError::InvalidResponse("Identity metadata is not valid Z85 text".into()))?,
    )?;
    if decoded != expected_pk.as_ref() {
        return Err(CurveZmqError::IdentityMismatch);
    }
    Ok(())
}
