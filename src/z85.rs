//! Z85 (ZMQ RFC 32) base-85 codec.
//!
//! Encodes 4-byte-aligned binary into groups of 5 ASCII characters drawn from
//! a fixed 85-character alphabet, and back. Used on the wire for the
//! `Identity` metadata property.

use crate::error::{CurveZmqError, Result};

const ALPHABET: &[u8; 85] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ.-:+=^!/*?&<>()[]{}@%$#";

fn decode_table() -> [i8; 256] {
    let mut table = [-1i8; 256];
    for (value, &ch) in ALPHABET.iter().enumerate() {
        table[ch as usize] = value as i8;
    }
    table
}

/// Encodes `data` as Z85 text. `data.len()` must be a multiple of 4.
///
/// # Errors
/// Returns [`CurveZmqError::InvalidLength`] if `data.len()` is not a
/// multiple of 4.
pub fn encode(data: &[u8]) -> Result<String> {
    if data.len() % 4 != 0 {
        return Err(CurveZmqError::InvalidLength(data.len()));
    }
    let mut out = String::with_capacity(data.len() / 4 * 5);
    for word in data.chunks_exact(4) {
        let mut value = u32::from_be_bytes([word[0], word[1], word[2], word[3]]);
        let mut chars = [0u8; 5];
        for slot in chars.iter_mut().rev() {
            *slot = ALPHABET[(value % 85) as usize];
            value /= 85;
        }
        out.push_str(std::str::from_utf8(&chars).expect("Z85 alphabet is ASCII"));
    }
    Ok(out)
}

/// Decodes Z85 text back into binary. `data.len()` must be a multiple of 5.
///
/// # Errors
/// Returns [`CurveZmqError::InvalidLength`] if `data.len()` is not a
/// multiple of 5, or [`CurveZmqError::InvalidChar`] if a byte outside the
/// Z85 alphabet is encountered.
pub fn decode(data: &str) -> Result<Vec<u8>> {
    let bytes = data.as_bytes();
    if bytes.len() % 5 != 0 {
        return Err(CurveZmqError::InvalidLength(bytes.len()));
    }
    let table = decode_table();
    let mut out = Vec::with_capacity(bytes.len() / 5 * 4);
    for group in bytes.chunks_exact(5) {
        let mut value: u32 = 0;
        for &b in group {
            let digit = table[b as usize];
            if digit < 0 {
                return Err(CurveZmqError::InvalidChar);
            }
            value = value
                .checked_mul(85)
                .and_then(|v| v.checked_add(digit as u32))
                .ok_or(CurveZmqError::InvalidLength(bytes.len()))?;
        }
        out.extend_from_slice(&value.to_be_bytes());
    }
    Ok(out)
}
