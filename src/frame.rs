//! ZMTP frame prefix codec and the flat key/value metadata record format used
//! inside CURVE's INITIATE and READY payloads.

use bytes::{Bytes, BytesMut};
use compio::buf::BufResult;
use compio::io::AsyncReadExt;

use crate::error::{CurveZmqError, Result};

pub const FLAG_MORE: u8 = 0x01;
pub const FLAG_LONG: u8 = 0x02;
pub const FLAG_COMMAND: u8 = 0x04;

/// Builds the wire prefix + body for a single ZMTP frame. Uses the short
/// (2-byte) form when the body is 255 bytes or fewer, the long (9-byte) form
/// otherwise.
#[must_use]
pub fn encode_frame(flags: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 9);
    if body.len() <= 255 {
        out.push(flags);
        out.push(body.len() as u8);
    } else {
        out.push(flags | FLAG_LONG);
        out.extend_from_slice(&(body.len() as u64).to_be_bytes());
    }
    out.extend_from_slice(body);
    out
}

/// Reads one complete ZMTP frame from `stream`, returning `(flags, body)`.
/// Returns `Ok(None)` on an orderly close with nothing buffered (a read of
/// zero bytes at a frame boundary), matching the reference implementation's
/// "empty read means clean EOF" convention.
///
/// # Errors
/// Returns [`CurveZmqError::InvalidLength`] if the declared body length
/// exceeds `max_len`, or a connection error if the stream closes mid-frame.
pub async fn read_frame<S>(stream: &mut S, max_len: usize) -> Result<Option<(u8, Bytes)>>
where
    S: compio::io::AsyncRead + Unpin,
{
    let header = [0u8; 1];
    let BufResult(res, header) = stream.read_exact(header).await;
    match res {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(CurveZmqError::Io(e)),
    }
    let flags = header[0];

    let body_len = if flags & FLAG_LONG != 0 {
        let len_buf = [0u8; 8];
        let BufResult(res, len_buf) = stream.read_exact(len_buf).await;
        res.map_err(CurveZmqError::Io)?;
        u64::from_be_bytes(len_buf) as usize
    } else {
        let len_buf = [0u8; 1];
        let BufResult(res, len_buf) = stream.read_exact(len_buf).await;
        res.map_err(CurveZmqError::Io)?;
        len_buf[0] as usize
    };

    if body_len > max_len {
        return Err(CurveZmqError::InvalidLength(body_len));
    }

    let body_buf = vec![0u8; body_len];
    let BufResult(res, body_buf) = stream.read_exact(body_buf).await;
    res.map_err(CurveZmqError::Io)?;

    Ok(Some((flags, Bytes::from(body_buf))))
}

/// Encodes an ordered list of metadata properties as
/// `<1B name len><name><4B BE value len><value>` records, concatenated in
/// order.
#[must_use]
pub fn encode_metadata(entries: &[(&str, &[u8])]) -> Bytes {
    let mut buf = BytesMut::new();
    for (name, value) in entries {
        debug_assert!(name.len() <= u8::MAX as usize);
        buf.extend_from_slice(&[name.len() as u8]);
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
        buf.extend_from_slice(value);
    }
    buf.freeze()
}

/// Decodes a metadata record blob into an ordered list of `(name, value)`
/// pairs.
///
/// # Errors
/// Returns [`CurveZmqError::InvalidMetadata`] if a record is truncated.
pub fn decode_metadata(data: &[u8]) -> Result<Vec<(String, Bytes)>> {
    let data = Bytes::copy_from_slice(data);
    let mut out = Vec::new();
    let mut offset = 0usize;
    while offset < data.len() {
        if offset + 1 > data.len() {
            return Err(CurveZmqError::InvalidMetadata);
        }
        let name_len = data[offset] as usize;
        offset += 1;
        if offset + name_len > data.len() {
            return Err(CurveZmqError::InvalidMetadata);
        }
        let name = std::str::from_utf8(&data[offset..offset + name_len])
            .map_err(|_| CurveZmqError::InvalidMetadata)?
            .to_owned();
        offset += name_len;

        if offset + 4 > data.len() {
            return Err(CurveZmqError::InvalidMetadata);
        }
        let value_len =
            u32::from_be_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
                as usize;
        offset += 4;
        if offset + value_len > data.len() {
            return Err(CurveZmqError::InvalidMetadata);
        }
        let value = data.slice(offset..offset + value_len);
        offset += value_len;

        out.push((name, value));
    }
    Ok(out)
}

/// Looks up a single metadata value by name.
#[must_use]
pub fn metadata_get<'a>(entries: &'a [(String, Bytes)], name: &str) -> Option<&'a Bytes> {
    entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
}

/// Parses one complete frame out of an accumulation buffer, if enough bytes
/// have arrived, consuming only the bytes it takes. Used by the client's
/// connection task, which feeds raw reads into the buffer so a single read
/// attempt can always race against an outgoing send without ever losing
/// bytes mid-frame (unlike [`read_frame`], which drives a read to completion
/// on the stream directly and is only safe for a task that owns the stream
/// sequentially).
///
/// # Errors
/// Returns [`CurveZmqError::InvalidLength`] if the declared body length
/// exceeds `max_len`.
pub(crate) fn try_decode_frame(buf: &mut BytesMut, max_len: usize) -> Result<Option<(u8, Bytes)>> {
    if buf.is_empty() {
        return Ok(None);
    }
    let flags = buf[0];
    let header_len = if flags & FLAG_LONG != 0 { 9 } else { 2 };
    if buf.len() < header_len {
        return Ok(None);
    }
    let body_len = if flags & FLAG_LONG != 0 {
        u64::from_be_bytes(buf[1..9].try_into().unwrap()) as usize
    } else {
        buf[1] as usize
    };
    if body_len > max_len {
        return Err(CurveZmqError::InvalidLength(body_len));
    }
    let total = header_len + body_len;
    if buf.len() < total {
        return Ok(None);
    }
    let mut frame_bytes = buf.split_to(total);
    let body = frame_bytes.split_off(header_len).freeze();
    Ok(Some((flags, body)))
}
