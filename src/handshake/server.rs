//! Server-side (ROUTER) half of the CurveZMQ handshake.

use compio::io::{AsyncRead, AsyncWrite};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;

use super::{
    build_ready, build_welcome, nonce24, parse_hello, parse_initiate, read_exact_owned,
    write_all_owned, HandshakeOutcome, HANDSHAKE_NONCE_COUNTER, HELLO_NONCE_PREFIX,
    INITIATE_NONCE_PREFIX, READY_NONCE_PREFIX, VOUCH_NONCE_PREFIX, WELCOME_NONCE_PREFIX,
};
use crate::crypto::{self, CurveKeyPair, CurvePublicKey, PrecomputedKey};
use crate::error::{CurveZmqError, Result};
use crate::frame::{self, FLAG_COMMAND};
use crate::greeting;

/// Drives a full handshake as the accepting (ROUTER) side. `identity` is
/// this server's own long-term CURVE keypair.
pub async fn perform<S>(
    stream: &mut S,
    identity: &CurveKeyPair,
    socket_type: &str,
    identity_property: &[u8],
) -> Result<HandshakeOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_all_owned(stream, greeting::build_greeting(true).to_vec()).await?;
    let peer_greeting: [u8; 64] = read_exact_owned(stream, [0u8; 64]).await?;
    greeting::parse_greeting(&peer_greeting)?;
    debug!("server: greeting exchanged");

    let (flags, hello_body) = frame::read_frame(stream, 4096)
        .await?
        .ok_or(CurveZmqError::Disconnected)?;
    if flags & FLAG_COMMAND == 0 {
        return Err(CurveZmqError::InvalidFlag(flags));
    }
    let (client_eph_pk_bytes, hello_nonce_suffix, signature_box) = parse_hello(&hello_body)?;
    let client_eph_pk = CurvePublicKey::from_bytes(client_eph_pk_bytes);
    let signature_plaintext = crypto::open(
        &signature_box,
        &nonce24(HELLO_NONCE_PREFIX, &hello_nonce_suffix),
        &client_eph_pk,
        &identity.secret,
    )?;
    if signature_plaintext != [0u8; 64] {
        return Err(CurveZmqError::InvalidResponse("non-zero HELLO signature".into()));
    }
    debug!("server: received HELLO");

    let server_ephemeral = CurveKeyPair::generate();
    let mut welcome_nonce_suffix = [0u8; 16];
    OsRng.fill_bytes(&mut welcome_nonce_suffix);
    let mut cookie = [0u8; 96];
    OsRng.fill_bytes(&mut cookie);
    let mut welcome_plaintext = Vec::with_capacity(128);
    welcome_plaintext.extend_from_slice(server_ephemeral.public.as_ref());
    welcome_plaintext.extend_from_slice(&cookie);
    let welcome_box = crypto::seal(
        &welcome_plaintext,
        &nonce24(WELCOME_NONCE_PREFIX, &welcome_nonce_suffix),
        &client_eph_pk,
        &identity.secret,
    )?;
    let welcome = build_welcome(&welcome_nonce_suffix, &welcome_box);
    write_all_owned(stream, frame::encode_frame(FLAG_COMMAND, &welcome)).await?;
    debug!("server: sent WELCOME");

    let (flags, initiate_body) = frame::read_frame(stream, 4096)
        .await?
        .ok_or(CurveZmqError::Disconnected)?;
    if flags & FLAG_COMMAND == 0 {
        return Err(CurveZmqError::InvalidFlag(flags));
    }
    // The echoed cookie is opaque in this design (see DESIGN.md); it is not
    // decoded or compared against server-held state.
    let (_cookie_echo, init_nonce_suffix, init_box) = parse_initiate(&initiate_body)?;

    let xkey = PrecomputedKey::new(&client_eph_pk, &server_ephemeral.secret);
    let init_plaintext = xkey.decrypt(
        &nonce24(INITIATE_NONCE_PREFIX, &init_nonce_suffix),
        &init_box,
    )?;
    if init_plaintext.len() < 128 {
        return Err(CurveZmqError::InvalidResponse("malformed INITIATE payload".into()));
    }
    let mut client_pk_bytes = [0u8; 32];
    client_pk_bytes.copy_from_slice(&init_plaintext[..32]);
    let client_pk = CurvePublicKey::from_bytes(client_pk_bytes);
    let mut vouch_nonce_suffix = [0u8; 16];
    vouch_nonce_suffix.copy_from_slice(&init_plaintext[32..48]);
    let vouch_box = &init_plaintext[48..128];
    let client_metadata = frame::decode_metadata(&init_plaintext[128..])?;

    let vouch_plaintext = crypto::open(
        vouch_box,
        &nonce24(VOUCH_NONCE_PREFIX, &vouch_nonce_suffix),
        &client_pk,
        &server_ephemeral.secret,
    )?;
    verify_vouch(&vouch_plaintext, &client_eph_pk, &identity.public)?;
    debug!("server: received and verified INITIATE");

    let metadata = frame::encode_metadata(&[
        ("Socket-Type", socket_type.as_bytes()),
        ("Identity", identity_property),
    ]);
    let ready_nonce_suffix = HANDSHAKE_NONCE_COUNTER.to_be_bytes();
    let ready_box = xkey.encrypt(&nonce24(READY_NONCE_PREFIX, &ready_nonce_suffix), &metadata)?;
    let ready = build_ready(&ready_nonce_suffix, &ready_box);
    write_all_owned(stream, frame::encode_frame(FLAG_COMMAND, &ready)).await?;
    debug!("server: sent READY");

    Ok(HandshakeOutcome {
        xkey,
        peer_identity_pk: client_pk,
        peer_metadata: client_metadata,
    })
}

/// Confirms a decrypted VOUCH box actually names the client's own HELLO
/// ephemeral key and this server's long-term key, binding the two halves
/// of the handshake together so a relayed HELLO can't be vouched for by a
/// different client identity.
///
/// # Errors
/// Returns [`CurveZmqError::InvalidVouch`] on any mismatch.
fn verify_vouch(vouch_plaintext: &[u8], client_eph_pk: &CurvePublicKey, server_identity_pk: &CurvePublicKey) -> Result<()> {
    let mut expected = Vec::with_capacity(64);
    expected.extend_from_slice(client_eph_pk.as_ref());
    expected.extend_from_slice(server_identity_pk.as_ref());
    if vouch_plaintext != expected.as_slice() {
        return Err(CurveZmqError::InvalidVouch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_vouch_accepts_a_correctly_bound_vouch() {
        let client_eph = CurveKeyPair::generate().public;
        let server_identity = CurveKeyPair::generate().public;
        let mut plaintext = Vec::new();
        plaintext.extend_from_slice(client_eph.as_ref());
        plaintext.extend_from_slice(server_identity.as_ref());
        assert!(verify_vouch(&plaintext, &client_eph, &server_identity).is_ok());
    }

    #[test]
    fn test_verify_vouch_rejects_a_vouch_for_a_different_server() {
        let client_eph = CurveKeyPair::generate().public;
        let server_identity = CurveKeyPair::generate().public;
        let some_other_server = CurveKeyPair::generate().public;
        let mut plaintext = Vec::new();
        plaintext.extend_from_slice(client_eph.as_ref());
        plaintext.extend_from_slice(some_other_server.as_ref());
        assert!(matches!(
            verify_vouch(&plaintext, &client_eph, &server_identity),
            Err(CurveZmqError::InvalidVouch)
        ));
    }

    #[test]
    fn test_verify_vouch_rejects_a_vouch_for_a_different_ephemeral_key() {
        let client_eph = CurveKeyPair::generate().public;
        let some_other_eph = CurveKeyPair::generate().public;
        let server_identity = CurveKeyPair::generate().public;
        let mut plaintext = Vec::new();
        plaintext.extend_from_slice(some_other_eph.as_ref());
        plaintext.extend_from_slice(server_identity.as_ref());
        assert!(matches!(
            verify_vouch(&plaintext, &client_eph, &server_identity),
            Err(CurveZmqError::InvalidVouch)
        ));
    }
}
