//! Wire primitives shared by every message body.
//!
//! All integers are little-endian. Strings use the `String16L` layout:
//! ```text
//! +--------+-------------+---------+
//! | Length |    Bytes    | Padding |
//! | u16 LE | Length bytes| to 4    |
//! +--------+-------------+---------+
//! ```
//! A length of `0xFFFF` is followed by a `u32` holding the real length.
//! Padding is counted from the start of the length prefix.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Marker for a string whose length does not fit in the short prefix.
const LONG_STRING_MARKER: u16 = 0xFFFF;

fn ensure(buf: &Bytes, expected: usize) -> Result<(), ProtocolError> {
    if buf.remaining() < expected {
        return Err(ProtocolError::eof(expected, buf.remaining()));
    }
    Ok(())
}

/// Read a single byte.
pub fn get_u8(buf: &mut Bytes) -> Result<u8, ProtocolError> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

/// Read a little-endian u16.
pub fn get_u16(buf: &mut Bytes) -> Result<u16, ProtocolError> {
    ensure(buf, 2)?;
    Ok(buf.get_u16_le())
}

/// Read a little-endian u32.
pub fn get_u32(buf: &mut Bytes) -> Result<u32, ProtocolError> {
    ensure(buf, 4)?;
    Ok(buf.get_u32_le())
}

/// Read a little-endian i32.
pub fn get_i32(buf: &mut Bytes) -> Result<i32, ProtocolError> {
    ensure(buf, 4)?;
    Ok(buf.get_i32_le())
}

/// Read a little-endian f32.
pub fn get_f32(buf: &mut Bytes) -> Result<f32, ProtocolError> {
    ensure(buf, 4)?;
    Ok(buf.get_f32_le())
}

/// Read a `u32` boolean (any non-zero value is true).
pub fn get_bool(buf: &mut Bytes) -> Result<bool, ProtocolError> {
    Ok(get_u32(buf)? != 0)
}

/// Write a `u32` boolean.
pub fn put_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u32_le(if value { 1 } else { 0 });
}

/// Read `len` raw bytes.
pub fn get_bytes(buf: &mut Bytes, len: usize) -> Result<Bytes, ProtocolError> {
    ensure(buf, len)?;
    Ok(buf.copy_to_bytes(len))
}

/// Read a `String16L`.
pub fn get_string(buf: &mut Bytes) -> Result<String, ProtocolError> {
    let short_len = get_u16(buf)?;
    let (prefix, len) = if short_len == LONG_STRING_MARKER {
        (6, get_u32(buf)? as usize)
    } else {
        (2, short_len as usize)
    };

    let raw = get_bytes(buf, len)?;
    skip_padding(buf, prefix + len)?;

    // One byte per character keeps the bytes exactly recoverable on write.
    Ok(raw.iter().map(|&b| b as char).collect())
}

/// Write a `String16L`.
///
/// Characters outside the single-byte range are written as `?`.
pub fn put_string(buf: &mut BytesMut, value: &str) {
    let raw: Vec<u8> = value
        .chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect();

    let prefix = if raw.len() >= LONG_STRING_MARKER as usize {
        buf.put_u16_le(LONG_STRING_MARKER);
        buf.put_u32_le(raw.len() as u32);
        6
    } else {
        buf.put_u16_le(raw.len() as u16);
        2
    };
    buf.put_slice(&raw);
    buf.put_bytes(0, padding_for(prefix + raw.len()));
}

/// Read a packable list: a `u32` count followed by the items.
pub fn get_list<T, F>(buf: &mut Bytes, mut read_item: F) -> Result<Vec<T>, ProtocolError>
where
    F: FnMut(&mut Bytes) -> Result<T, ProtocolError>,
{
    let count = get_u32(buf)? as usize;
    // A corrupt count must not turn into a huge allocation.
    let mut items = Vec::with_capacity(count.min(buf.remaining()));
    for _ in 0..count {
        items.push(read_item(buf)?);
    }
    Ok(items)
}

/// Write a packable list.
pub fn put_list<T, F>(buf: &mut BytesMut, items: &[T], mut write_item: F)
where
    F: FnMut(&mut BytesMut, &T),
{
    buf.put_u32_le(items.len() as u32);
    for item in items {
        write_item(buf, item);
    }
}

/// Consume the leading opcode and check it.
pub fn expect_opcode(buf: &mut Bytes, expected: u32) -> Result<(), ProtocolError> {
    let actual = get_u32(buf)?;
    if actual != expected {
        return Err(ProtocolError::OpcodeMismatch { expected, actual });
    }
    Ok(())
}

fn padding_for(written: usize) -> usize {
    (4 - written % 4) % 4
}

fn skip_padding(buf: &mut Bytes, written: usize) -> Result<(), ProtocolError> {
    let padding = padding_for(written);
    ensure(buf, padding)?;
    buf.advance(padding);
    Ok(())
}
