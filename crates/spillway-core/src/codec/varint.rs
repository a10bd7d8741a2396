//! LEB128 variable-length integers and zig-zag mapping.

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};
use spillway_common::utils::error::CodecError;

/// Maps a signed integer onto an unsigned one so small magnitudes stay small.
#[inline]
#[must_use]
pub const fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverse of [`zigzag_encode`].
#[inline]
#[must_use]
pub const fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Writes `value` as an unsigned LEB128 varint.
pub fn write_u64(out: &mut dyn Write, mut value: u64) -> Result<(), CodecError> {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.write_u8(byte)?;
            return Ok(());
        }
        out.write_u8(byte | 0x80)?;
    }
}

/// Reads an unsigned LEB128 varint.
///
/// `what` names the field for truncation errors.
pub fn read_u64(input: &mut dyn Read, what: &'static str) -> Result<u64, CodecError> {
    let mut result = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = input
            .read_u8()
            .map_err(|e| CodecError::from_read(e, what))?;
        if shift == 63 && byte > 1 {
            return Err(CodecError::VarintOverflow);
        }
        result |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift > 63 {
            return Err(CodecError::VarintOverflow);
        }
    }
}

/// Reads a varint that must fit in a `u32`.
pub fn read_u32(input: &mut dyn Read, what: &'static str) -> Result<u32, CodecError> {
    u32::try_from(read_u64(input, what)?).map_err(|_| CodecError::VarintOverflow)
}

/// Reads a varint length that must fit in a `usize`.
pub fn read_len(input: &mut dyn Read, what: &'static str) -> Result<usize, CodecError> {
    usize::try_from(read_u64(input, what)?).map_err(|_| CodecError::VarintOverflow)
}
