//! Curve25519 key types and NaCl-compatible box primitives.
//!
//! Mirrors libsodium's `crypto_box`/`crypto_box_open`/`crypto_box_beforenm`/
//! `crypto_box_afternm`/`crypto_box_open_afternm` family (XSalsa20-Poly1305
//! over a 24-byte nonce), plus the Ed25519-to-Curve25519 conversion used to
//! derive a CURVE identity from a signing keypair.

use std::fmt;

use crypto_box::aead::{Aead, generic_array::GenericArray};
use crypto_box::{PublicKey as BoxPublicKey, SalsaBox, SecretKey as BoxSecretKey};
use curve25519_dalek::edwards::CompressedEdwardsY;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use sha2::{Digest, Sha512};
use x25519_dalek::{PublicKey as XPublicKey, StaticSecret};

use crate::error::{CurveZmqError, Result};

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 24;
pub const BOX_OVERHEAD: usize = 16;

/// A Curve25519 public key (either long-term or ephemeral).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CurvePublicKey([u8; KEY_SIZE]);

impl CurvePublicKey {
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl AsRef<[u8]> for CurvePublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; KEY_SIZE]> for CurvePublicKey {
    fn from(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for CurvePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CurvePublicKey({})", crate::z85::encode(&self.0).unwrap_or_default())
    }
}

/// A Curve25519 secret key. `Debug` never prints the key material.
pub struct CurveSecretKey(StaticSecret);

impl CurveSecretKey {
    #[must_use]
    pub fn generate() -> Self {
        Self(StaticSecret::random_from_rng(OsRng))
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    #[must_use]
    pub fn public_key(&self) -> CurvePublicKey {
        CurvePublicKey(*XPublicKey::from(&self.0).as_bytes())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
        self.0.to_bytes()
    }

    #[must_use]
    pub fn diffie_hellman(&self, their_public: &CurvePublicKey) -> [u8; KEY_SIZE] {
        *self.0.diffie_hellman(&XPublicKey::from(their_public.0)).as_bytes()
    }
}

impl fmt::Debug for CurveSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CurveSecretKey").field(&"<redacted>").finish()
    }
}

/// A matched Curve25519 keypair.
#[derive(Debug)]
pub struct CurveKeyPair {
    pub public: CurvePublicKey,
    pub secret: CurveSecretKey,
}

impl CurveKeyPair {
    #[must_use]
    pub fn generate() -> Self {
        let secret = CurveSecretKey::generate();
        let public = secret.public_key();
        Self { public, secret }
    }

    #[must_use]
    pub fn from_keys(public: CurvePublicKey, secret: CurveSecretKey) -> Self {
        Self { public, secret }
    }
}

fn to_box_public(key: &CurvePublicKey) -> BoxPublicKey {
    BoxPublicKey::from(*key.as_bytes())
}

fn to_box_secret(key: &CurveSecretKey) -> BoxSecretKey {
    BoxSecretKey::from(key.to_bytes())
}

/// One-shot `crypto_box`: encrypts `plaintext` under a fresh ECDH between
/// `my_sk` and `their_pk`.
///
/// # Errors
/// Returns [`CurveZmqError::DecryptionError`] if the underlying AEAD fails.
pub fn seal(plaintext: &[u8], nonce: &[u8; NONCE_SIZE], their_pk: &CurvePublicKey, my_sk: &CurveSecretKey) -> Result<Vec<u8>> {
    let salsa_box = SalsaBox::new(&to_box_public(their_pk), &to_box_secret(my_sk));
    salsa_box
        .encrypt(GenericArray::from_slice(nonce), plaintext)
        .map_err(|_| CurveZmqError::DecryptionError)
}

/// One-shot `crypto_box_open`: decrypts and authenticates `ciphertext`.
///
/// # Errors
/// Returns [`CurveZmqError::DecryptionError`] if authentication fails.
pub fn open(ciphertext: &[u8], nonce: &[u8; NONCE_SIZE], their_pk: &CurvePublicKey, my_sk: &CurveSecretKey) -> Result<Vec<u8>> {
    let salsa_box = SalsaBox::new(&to_box_public(their_pk), &to_box_secret(my_sk));
    salsa_box
        .decrypt(GenericArray::from_slice(nonce), ciphertext)
        .map_err(|_| CurveZmqError::DecryptionError)
}

/// A precomputed shared key (`crypto_box_beforenm`), reused across many
/// `afternm`/`open_afternm` calls for the lifetime of a session.
pub struct PrecomputedKey(SalsaBox);

impl fmt::Debug for PrecomputedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PrecomputedKey").field(&"<redacted>").finish()
    }
}

impl PrecomputedKey {
    #[must_use]
    pub fn new(their_pk: &CurvePublicKey, my_sk: &CurveSecretKey) -> Self {
        Self(SalsaBox::new(&to_box_public(their_pk), &to_box_secret(my_sk)))
    }

    /// `crypto_box_afternm`.
    ///
    /// # Errors
    /// Returns [`CurveZmqError::DecryptionError`] if the underlying AEAD fails.
    pub fn encrypt(&self, nonce: &[u8; NONCE_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
        self.0
            .encrypt(GenericArray::from_slice(nonce), plaintext)
            .map_err(|_| CurveZmqError::DecryptionError)
    }

    /// `crypto_box_open_afternm`.
    ///
    /// # Errors
    /// Returns [`CurveZmqError::DecryptionError`] if authentication fails.
    pub fn decrypt(&self, nonce: &[u8; NONCE_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.0
            .decrypt(GenericArray::from_slice(nonce), ciphertext)
            .map_err(|_| CurveZmqError::DecryptionError)
    }
}

/// Converts an Ed25519 verifying key (a verkey) to its Curve25519
/// counterpart via Edwards-to-Montgomery point conversion
/// (`crypto_sign_ed25519_pk_to_curve25519`).
///
/// # Errors
/// Returns [`CurveZmqError::InvalidKey`] if `verkey` is not a valid
/// compressed Edwards point.
pub fn ed25519_pk_to_curve25519(verkey: &[u8; 32]) -> Result<CurvePublicKey> {
    let point = CompressedEdwardsY(*verkey)
        .decompress()
        .ok_or_else(|| CurveZmqError::InvalidKey("not a valid Ed25519 point".into()))?;
    Ok(CurvePublicKey::from_bytes(point.to_montgomery().to_bytes()))
}

/// Converts an Ed25519 signing key's seed to a Curve25519 secret key via
/// SHA-512 plus X25519 clamping (`crypto_sign_ed25519_sk_to_curve25519`).
#[must_use]
pub fn ed25519_sk_to_curve25519(signing_key: &SigningKey) -> CurveSecretKey {
    let hash = Sha512::digest(signing_key.to_bytes());
    let mut clamped = [0u8; 32];
    clamped.copy_from_slice(&hash[..32]);
    clamped[0] &= 248;
    clamped[31] &= 127;
    clamped[31] |= 64;
    CurveSecretKey::from_bytes(clamped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation_yields_matching_public_key() {
        let pair = CurveKeyPair::generate();
        assert_eq!(pair.secret.public_key(), pair.public);
    }

    #[test]
    fn test_diffie_hellman_agrees_both_ways() {
        let a = CurveKeyPair::generate();
        let b = CurveKeyPair::generate();
        assert_eq!(a.secret.diffie_hellman(&b.public), b.secret.diffie_hellman(&a.public));
    }

    #[test]
    fn test_box_round_trips() {
        let a = CurveKeyPair::generate();
        let b = CurveKeyPair::generate();
        let nonce = [7u8; NONCE_SIZE];
        let ciphertext = seal(b"hello", &nonce, &b.public, &a.secret).unwrap();
        let plaintext = open(&ciphertext, &nonce, &a.public, &b.secret).unwrap();
        assert_eq!(plaintext, b"hello");
    }

    #[test]
    fn test_precomputed_key_round_trips() {
        let a = CurveKeyPair::generate();
        let b = CurveKeyPair::generate();
        let nonce = [3u8; NONCE_SIZE];
        let a_key = PrecomputedKey::new(&b.public, &a.secret);
        let b_key = PrecomputedKey::new(&a.public, &b.secret);
        let ciphertext = a_key.encrypt(&nonce, b"shared secret").unwrap();
        let plaintext = b_key.decrypt(&nonce, &ciphertext).unwrap();
        assert_eq!(plaintext, b"shared secret");
    }

    #[test]
    fn test_tampered_ciphertext_fails_to_decrypt() {
        let a = CurveKeyPair::generate();
        let b = CurveKeyPair::generate();
        let nonce = [1u8; NONCE_SIZE];
        let mut ciphertext = seal(b"hello", &nonce, &b.public, &a.secret).unwrap();
        *ciphertext.last_mut().unwrap() ^= 0xFF;
        assert!(matches!(
            open(&ciphertext, &nonce, &a.public, &b.secret),
            Err(CurveZmqError::DecryptionError)
        ));
    }

    #[test]
    fn test_ed25519_conversion_yields_dh_compatible_keys() {
        use ed25519_dalek::SigningKey;
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();

        let curve_pk = ed25519_pk_to_curve25519(verifying_key.as_bytes()).unwrap();
        let curve_sk = ed25519_sk_to_curve25519(&signing_key);

        assert_eq!(curve_sk.public_key(), curve_pk);
    }
}
