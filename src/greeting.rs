//! The 64-byte ZMTP greeting, restricted to the CURVE security mechanism.

use crate::error::{CurveZmqError, Result};

pub const GREETING_LEN: usize = 64;
const MECHANISM: &[u8; 5] = b"CURVE";

/// Builds the 64-byte greeting this peer sends first.
#[must_use]
pub fn build_greeting(as_server: bool) -> [u8; GREETING_LEN] {
    let mut greeting = [0u8; GREETING_LEN];
    greeting[0] = 0xFF;
    greeting[9] = 0x7F;
    greeting[10] = 3; // version major
    greeting[11] = 0; // version minor
    greeting[12..17].copy_from_slice(MECHANISM);
    greeting[32] = u8::from(as_server);
    greeting
}

/// Validates a peer's 64-byte greeting and extracts whether it identifies
/// as the server side of the connection.
///
/// # Errors
/// Returns [`CurveZmqError::InvalidGreeting`] if the signature bytes are
/// wrong, [`CurveZmqError::UnexpectedVersion`] if the major version is not
/// 3, or [`CurveZmqError::UnexpectedMechanism`] if the mechanism is not
/// CURVE.
pub fn parse_greeting(greeting: &[u8; GREETING_LEN]) -> Result<bool> {
    if greeting[0] != 0xFF || greeting[9] != 0x7F {
        return Err(CurveZmqError::InvalidGreeting(
            "bad signature bytes".into(),
        ));
    }
    let (major, minor) = (greeting[10], greeting[11]);
    if major < 3 {
        return Err(CurveZmqError::UnexpectedVersion { major, minor });
    }
    let mechanism_end = greeting[12..32]
        .iter()
        .position(|&b| b == 0)
        .map_or(20, |pos| pos);
    let mechanism = &greeting[12..12 + mechanism_end];
    if mechanism != MECHANISM {
        return Err(CurveZmqError::UnexpectedMechanism(
            String::from_utf8_lossy(mechanism).into_owned(),
        ));
    }
    Ok(greeting[32] & 0x01 != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips_as_server_flag() {
        let greeting = build_greeting(true);
        assert!(parse_greeting(&greeting).unwrap());
        let greeting = build_greeting(false);
        assert!(!parse_greeting(&greeting).unwrap());
    }

    #[test]
    fn test_rejects_bad_signature() {
        let mut greeting = build_greeting(false);
        greeting[0] = 0x00;
        assert!(matches!(
            parse_greeting(&greeting),
            Err(CurveZmqError::InvalidGreeting(_))
        ));
    }

    #[test]
    fn test_rejects_old_version() {
        let mut greeting = build_greeting(false);
        greeting[10] = 2;
        assert!(matches!(
            parse_greeting(&greeting),
            Err(CurveZmqError::UnexpectedVersion { major: 2, .. })
        ));
    }

    #[test]
    fn test_rejects_non_curve_mechanism() {
        let mut greeting = build_greeting(false);
        greeting[12..16].copy_from_slice(b"NULL");
        greeting[16] = 0;
        assert!(matches!(
            parse_greeting(&greeting),
            Err(CurveZmqError::UnexpectedMechanism(_))
        ));
    }
}
