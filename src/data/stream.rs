//! Byte-stream primitives for the state file encoding.
//!
//! Integers in the state region come in two shapes: a fixed 32-byte
//! big-endian form, and a length-prefixed variable form where a lead byte
//! below [`VARINT_THRESHOLD`] is the value itself, and any other lead byte
//! says how many bytes follow after the first one. The variable form spends
//! one byte on the common small values and `2 + remainder` bytes otherwise.

use primitive_types::U256;

/// Lead bytes below this value encode themselves.
pub const VARINT_THRESHOLD: u8 = 224;

/// Error produced while decoding a byte region.
///
/// Decode errors never escape a query: the page scan that hit one reports
/// "not found" and later queries are unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unexpected end of page")]
    UnexpectedEnd,
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),
}

/// Result type for page decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Sequential reader over one page's byte range.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader over the full slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Offset of the next unread byte.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Consumes one byte.
    pub fn get_byte(&mut self) -> DecodeResult<u8> {
        let byte = *self.data.get(self.pos).ok_or(DecodeError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(byte)
    }

    /// Consumes `len` bytes.
    pub fn get_bytes(&mut self, len: usize) -> DecodeResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(DecodeError::UnexpectedEnd)?;
        if end > self.data.len() {
            return Err(DecodeError::UnexpectedEnd);
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Reads a variable-length unsigned 64-bit integer.
    ///
    /// Non-minimal encodings are accepted; excess high bytes shift out.
    pub fn read_u64_var(&mut self) -> DecodeResult<u64> {
        let lead = self.get_byte()?;
        if lead < VARINT_THRESHOLD {
            return Ok(lead as u64);
        }
        let remainder = (lead - VARINT_THRESHOLD) as usize;
        let mut value = self.get_byte()? as u64;
        for _ in 0..remainder {
            value = (value << 8) | self.get_byte()? as u64;
        }
        Ok(value)
    }

    /// Reads a variable-length 256-bit integer, same scheme as
    /// [`read_u64_var`](Self::read_u64_var) with a wider accumulator.
    pub fn read_u256_var(&mut self) -> DecodeResult<U256> {
        let lead = self.get_byte()?;
        if lead < VARINT_THRESHOLD {
            return Ok(U256::from(lead));
        }
        let remainder = (lead - VARINT_THRESHOLD) as usize;
        let mut value = U256::from(self.get_byte()?);
        for _ in 0..remainder {
            value = (value << 8) | U256::from(self.get_byte()?);
        }
        Ok(value)
    }

    /// Reads a fixed 32-byte big-endian 256-bit integer.
    pub fn read_u256_fixed(&mut self) -> DecodeResult<U256> {
        let bytes = self.get_bytes(32)?;
        Ok(U256::from_big_endian(bytes))
    }
}

/// Appends the variable-length encoding of `value`.
pub fn write_u64_var(out: &mut Vec<u8>, value: u64) {
    if value < VARINT_THRESHOLD as u64 {
        out.push(value as u8);
        return;
    }
    let bytes = value.to_be_bytes();
    let skip = (value.leading_zeros() / 8) as usize;
    let len = bytes.len() - skip;
    out.push(VARINT_THRESHOLD + (len - 1) as u8);
    out.extend_from_slice(&bytes[skip..]);
}

/// Appends the variable-length encoding of a 256-bit `value`.
pub fn write_u256_var(out: &mut Vec<u8>, value: U256) {
    if value < U256::from(VARINT_THRESHOLD) {
        out.push(value.low_u64() as u8);
        return;
    }
    let bytes = value.to_big_endian();
    let skip = (value.leading_zeros() / 8) as usize;
    let len = bytes.len() - skip;
    out.push(VARINT_THRESHOLD + (len - 1) as u8);
    out.extend_from_slice(&bytes[skip..]);
}

/// Appends the fixed 32-byte big-endian encoding of `value`.
pub fn write_u256_fixed(out: &mut Vec<u8>, value: U256) {
    out.extend_from_slice(&value.to_big_endian());
}
