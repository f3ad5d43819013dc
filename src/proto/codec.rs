//! Encoding and decoding of wire values.
//!
//! Decoding is bounded by [`CodecLimits`] so a corrupted length field can
//! never make the client allocate or recurse without limit.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Deserialize;

use super::types::*;
use crate::error::{DbmiError, DbmiResult};

// ============================================================================
// Limits
// ============================================================================

/// Upper bounds enforced on every decoded (and every sent) value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CodecLimits {
    /// Longest accepted string payload, in bytes
    pub max_string_len: usize,
    /// Most rows in one row-set
    pub max_rows: usize,
    /// Most columns in one row
    pub max_columns: usize,
    /// Deepest accepted row-set nesting
    pub max_depth: usize,
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            max_string_len: 64 * 1024 * 1024,
            max_rows: 1_000_000,
            max_columns: 4096,
            max_depth: 8,
        }
    }
}

impl CodecLimits {
    /// Check an outgoing value against the same bounds the decoder applies.
    pub fn check(&self, value: &WireValue) -> Result<(), String> {
        self.check_at(value, 0)
    }

    fn check_at(&self, value: &WireValue, depth: usize) -> Result<(), String> {
        match value {
            WireValue::Text(s) if s.len() > wire_bound(self.max_string_len) => Err(format!(
                "string of {} bytes exceeds limit of {}",
                s.len(),
                wire_bound(self.max_string_len)
            )),
            WireValue::RowSet(rows) => {
                if depth >= self.max_depth {
                    return Err(format!("row-set nesting exceeds depth {}", self.max_depth));
                }
                if rows.len() > wire_bound(self.max_rows) {
                    return Err(format!(
                        "{} rows exceed limit of {}",
                        rows.len(),
                        wire_bound(self.max_rows)
                    ));
                }
                for row in rows {
                    if row.len() > wire_bound(self.max_columns) {
                        return Err(format!(
                            "{} columns exceed limit of {}",
                            row.len(),
                            wire_bound(self.max_columns)
                        ));
                    }
                    for v in row {
                        self.check_at(v, depth + 1)?;
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Counts travel as u32, whatever the configured limit.
#[inline]
fn wire_bound(limit: usize) -> usize {
    limit.min(u32::MAX as usize)
}

// ============================================================================
// Encoding
// ============================================================================

/// Append the encoding of `value` to `buf`.
///
/// Lengths and counts are written as u32; callers run [`CodecLimits::check`]
/// first so they always fit.
pub fn encode(value: &WireValue, buf: &mut BytesMut) {
    match value {
        WireValue::Int(v) => {
            buf.put_u8(TAG_INT);
            buf.put_i32_le(*v);
        }
        WireValue::Double(v) => {
            buf.put_u8(TAG_DOUBLE);
            buf.put_f64_le(*v);
        }
        WireValue::Text(s) => {
            buf.put_u8(TAG_STRING);
            buf.put_u32_le(s.len() as u32);
            buf.put_slice(s.as_bytes());
        }
        WireValue::Null => buf.put_u8(TAG_NULL),
        WireValue::RowSet(rows) => {
            buf.put_u8(TAG_ROWSET);
            buf.put_u32_le(rows.len() as u32);
            for row in rows {
                buf.put_u32_le(row.len() as u32);
                for v in row {
                    encode(v, buf);
                }
            }
        }
    }
}

pub fn encode_to_bytes(value: &WireValue) -> Bytes {
    let mut buf = BytesMut::new();
    encode(value, &mut buf);
    buf.freeze()
}

// ============================================================================
// Decoding
// ============================================================================

enum DecodeError {
    /// The buffer ends before the value does.
    Incomplete,
    Invalid(String),
}

/// Decode one value from a complete buffer.
///
/// A buffer that ends mid-value is a protocol error here; use
/// [`try_decode`] when more bytes may still arrive.
pub fn decode(buf: &mut Bytes, limits: &CodecLimits) -> DbmiResult<WireValue> {
    let mut input: &[u8] = &buf[..];
    let before = input.len();
    match parse(&mut input, limits, 0) {
        Ok(value) => {
            let used = before - input.len();
            buf.advance(used);
            Ok(value)
        }
        Err(DecodeError::Incomplete) => Err(DbmiError::protocol("Truncated value")),
        Err(DecodeError::Invalid(msg)) => Err(DbmiError::Protocol(msg)),
    }
}

/// Decode one value if `buf` already holds all of it.
///
/// Returns `Ok(None)` without consuming anything when the value is not yet
/// complete. Malformed input is an error regardless of how much is buffered.
pub fn try_decode(buf: &mut BytesMut, limits: &CodecLimits) -> DbmiResult<Option<WireValue>> {
    let mut input: &[u8] = &buf[..];
    let before = input.len();
    match parse(&mut input, limits, 0) {
        Ok(value) => {
            let used = before - input.len();
            buf.advance(used);
            Ok(Some(value))
        }
        Err(DecodeError::Incomplete) => Ok(None),
        Err(DecodeError::Invalid(msg)) => Err(DbmiError::Protocol(msg)),
    }
}

fn parse(input: &mut &[u8], limits: &CodecLimits, depth: usize) -> Result<WireValue, DecodeError> {
    need(input, 1)?;
    let tag = input.get_u8();

    match tag {
        TAG_INT => {
            need(input, 4)?;
            Ok(WireValue::Int(input.get_i32_le()))
        }
        TAG_DOUBLE => {
            need(input, 8)?;
            Ok(WireValue::Double(input.get_f64_le()))
        }
        TAG_STRING => {
            let len = read_count(input, limits.max_string_len, "string length")?;
            need(input, len)?;
            let text = std::str::from_utf8(&input[..len])
                .map_err(|e| DecodeError::Invalid(format!("String is not valid UTF-8: {}", e)))?
                .to_owned();
            input.advance(len);
            Ok(WireValue::Text(text))
        }
        TAG_NULL => Ok(WireValue::Null),
        TAG_ROWSET => {
            if depth >= limits.max_depth {
                return Err(DecodeError::Invalid(format!(
                    "Row-set nesting exceeds depth {}",
                    limits.max_depth
                )));
            }
            let num_rows = read_count(input, limits.max_rows, "row count")?;
            // Counts come off the wire; only trust them as far as the bytes go.
            let mut rows = Vec::with_capacity(num_rows.min(input.remaining() / 4));

            for _ in 0..num_rows {
                let num_cols = read_count(input, limits.max_columns, "column count")?;
                let mut row = Row::with_capacity(num_cols.min(input.remaining()));
                for _ in 0..num_cols {
                    row.push(parse(input, limits, depth + 1)?);
                }
                rows.push(row);
            }

            Ok(WireValue::RowSet(rows))
        }
        _ => Err(DecodeError::Invalid(format!(
            "Unknown value tag: 0x{:02x}",
            tag
        ))),
    }
}

#[inline]
fn need(input: &&[u8], n: usize) -> Result<(), DecodeError> {
    if input.remaining() < n {
        Err(DecodeError::Incomplete)
    } else {
        Ok(())
    }
}

fn read_count(input: &mut &[u8], max: usize, what: &str) -> Result<usize, DecodeError> {
    need(input, 4)?;
    let count = input.get_u32_le() as usize;
    if count > max {
        return Err(DecodeError::Invalid(format!(
            "{} {} exceeds limit of {}",
            what, count, max
        )));
    }
    Ok(count)
}
