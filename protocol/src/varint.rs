//! Variable-length integer and string codec
//!
//! Minecraft encodes unsigned integers as little-endian-first groups of
//! seven payload bits, with the top bit of each byte signalling that another
//! group follows. Strings are a varint byte-length followed by UTF-8 text.

use crate::ProtocolError;

/// Mask selecting the seven payload bits of a varint byte.
pub const SEGMENT_BITS: u8 = 0x7F;
/// Continuation flag: set on every byte except the last one.
pub const CONTINUE_BIT: u8 = 0x80;

/// Maximum number of bytes a 32-bit varint may occupy on the wire.
pub const MAX_VARINT_LEN: usize = 5;

/// Reads a varint from `buf` starting at `offset`.
///
/// Returns the decoded value and how many bytes were consumed. Fails if the
/// buffer runs out before a terminating byte, or if the encoding would
/// exceed 32 bits (five groups) - the latter bounds the damage hostile input
/// can do.
pub fn read_varint(buf: &[u8], offset: usize) -> Result<(u32, usize), ProtocolError> {
    let mut value: u32 = 0;
    let mut shift = 0;
    let mut idx = offset;

    loop {
        let byte = *buf
            .get(idx)
            .ok_or(ProtocolError::MalformedVarint("ran out of bytes to read"))?;
        idx += 1;

        value |= u32::from(byte & SEGMENT_BITS) << shift;
        if byte & CONTINUE_BIT == 0 {
            break;
        }

        shift += 7;
        if shift >= 32 {
            return Err(ProtocolError::MalformedVarint("too long"));
        }
    }

    Ok((value, idx - offset))
}

/// Appends the minimal varint encoding of `value` to `buf`.
pub fn write_varint(mut value: u32, buf: &mut Vec<u8>) {
    loop {
        if value & !u32::from(SEGMENT_BITS) == 0 {
            buf.push(value as u8);
            return;
        }
        buf.push((value as u8 & SEGMENT_BITS) | CONTINUE_BIT);
        value >>= 7;
    }
}

/// Reads a length-prefixed UTF-8 string from `buf` starting at `offset`.
///
/// Returns the string and the total number of bytes consumed (length prefix
/// included). Fails if the declared length overruns the buffer or the bytes
/// are not valid UTF-8.
pub fn read_string(buf: &[u8], offset: usize) -> Result<(String, usize), ProtocolError> {
    let (len, prefix_len) = read_varint(buf, offset)?;
    let len = len as usize;

    let start = offset + prefix_len;
    let end = start
        .checked_add(len)
        .ok_or(ProtocolError::MalformedString("length overflows"))?;
    if end > buf.len() {
        return Err(ProtocolError::MalformedString(
            "declared length exceeds buffer",
        ));
    }

    let text = std::str::from_utf8(&buf[start..end])
        .map_err(|_| ProtocolError::MalformedString("not valid utf-8"))?;

    Ok((text.to_string(), prefix_len + len))
}

/// Appends a length-prefixed UTF-8 string to `buf`.
pub fn write_string(s: &str, buf: &mut Vec<u8>) {
    write_varint(s.len() as u32, buf);
    buf.extend_from_slice(s.as_bytes());
}
