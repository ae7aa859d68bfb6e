//! Long-term identity keypairs and their Base58 text encoding (a verkey).

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;

use crate::crypto::{self, CurveKeyPair, CurvePublicKey};
use crate::error::{CurveZmqError, Result};

/// An Ed25519 signing keypair alongside its Curve25519 counterpart, the form
/// CURVE's handshake actually authenticates with.
pub struct LongTermKeyPair {
    pub signing_key: SigningKey,
    pub curve: CurveKeyPair,
}

impl LongTermKeyPair {
    /// `create_server_keys`: generates an Ed25519 signing keypair and
    /// derives the Curve25519 keypair used for the CURVE mechanism from it.
    #[must_use]
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let curve_secret = crypto::ed25519_sk_to_curve25519(&signing_key);
        let curve_public = curve_secret.public_key();
        Self {
            signing_key,
            curve: CurveKeyPair::from_keys(curve_public, curve_secret),
        }
    }

    /// The Base58-encoded verkey identifying this keypair.
    #[must_use]
    pub fn verkey(&self) -> Verkey {
        Verkey::from_ed25519_bytes(self.signing_key.verifying_key().to_bytes())
    }
}

/// A Base58-encoded Ed25519 verifying key, the text form used to name a peer.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Verkey([u8; 32]);

impl Verkey {
    #[must_use]
    pub fn from_ed25519_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parses a Base58-encoded verkey.
    ///
    /// # Errors
    /// Returns [`CurveZmqError::InvalidKey`] if the text is not valid Base58
    /// or does not decode to exactly 32 bytes.
    pub fn from_base58(text: &str) -> Result<Self> {
        let decoded = bs58::decode(text)
            .into_vec()
            .map_err(|e| CurveZmqError::InvalidKey(e.to_string()))?;
        let bytes: [u8; 32] = decoded
            .try_into()
            .map_err(|_| CurveZmqError::InvalidKey("verkey must be 32 bytes".into()))?;
        Ok(Self(bytes))
    }

    #[must_use]
    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Converts this verkey to the Curve25519 public key CURVE actually
    /// authenticates against.
    ///
    /// # Errors
    /// Returns [`CurveZmqError::InvalidKey`] if the verkey is not a valid
    /// Ed25519 point.
    pub fn to_curve_public(&self) -> Result<CurvePublicKey> {
        crypto::ed25519_pk_to_curve25519(&self.0)
    }
}

impl std::fmt::Debug for Verkey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Verkey({})", self.to_base58())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verkey_round_trips_through_base58() {
        let pair = LongTermKeyPair::generate();
        let verkey = pair.verkey();
        let text = verkey.to_base58();
        let parsed = Verkey::from_base58(&text).unwrap();
        assert_eq!(parsed.as_bytes(), verkey.as_bytes());
    }

    #[test]
    fn test_verkey_converts_to_the_same_curve_key_the_pair_derived() {
        let pair = LongTermKeyPair::generate();
        let curve_pk = pair.verkey().to_curve_public().unwrap();
        assert_eq!(curve_pk, pair.curve.public);
    }

    #[test]
    fn test_rejects_malformed_base58() {
        assert!(Verkey::from_base58("not-valid-base58-!!!").is_err());
    }

    #[test]
    fn test_rejects_wrong_length() {
        let short = bs58::encode(&[1u8, 2, 3]).into_string();
        assert!(Verkey::from_base58(&short).is_err());
    }
}
