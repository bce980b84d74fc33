//! Built-in data types

use std::cmp::Ordering;

use crate::error::{AoError, Result};

use super::DataType;

/// Raw bytes, ordered lexicographically
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesType;

impl DataType for BytesType {
    fn name(&self) -> &'static str {
        "bytes"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// UTF-8 strings, ordered by their bytes (which is code point order)
#[derive(Debug, Clone, Copy, Default)]
pub struct StringType;

impl DataType for StringType {
    fn name(&self) -> &'static str {
        "string"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn validate(&self, bytes: &[u8]) -> std::result::Result<(), String> {
        std::str::from_utf8(bytes)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// Signed 64-bit integers, 8 bytes big-endian
///
/// The empty encoding is a legal "no value" that sorts before every integer.
#[derive(Debug, Clone, Copy, Default)]
pub struct LongType;

impl LongType {
    /// Encoded width of one value
    pub const WIDTH: usize = 8;

    pub fn encode(value: i64) -> Vec<u8> {
        value.to_be_bytes().to_vec()
    }

    /// Encode decimal text; the empty string gives the empty encoding
    pub fn parse(text: &str) -> Result<Vec<u8>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        text.parse::<i64>()
            .map(Self::encode)
            .map_err(|e| AoError::InvalidValue {
                type_name: "long",
                reason: format!("{:?}: {}", text, e),
            })
    }

    /// Decode an 8-byte encoding; `None` for the empty or a malformed encoding
    pub fn decode(bytes: &[u8]) -> Option<i64> {
        let array: [u8; Self::WIDTH] = bytes.try_into().ok()?;
        Some(i64::from_be_bytes(array))
    }
}

impl DataType for LongType {
    fn name(&self) -> &'static str {
        "long"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match (a.is_empty(), b.is_empty()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }

        // Sign lives in the first byte; the rest compares unsigned.
        let sign = (a[0] as i8).cmp(&(b[0] as i8));
        if sign != Ordering::Equal {
            return sign;
        }
        a.cmp(b)
    }

    fn validate(&self, bytes: &[u8]) -> std::result::Result<(), String> {
        if bytes.is_empty() || bytes.len() == Self::WIDTH {
            Ok(())
        } else {
            Err(format!(
                "expected {} bytes, got {}",
                Self::WIDTH,
                bytes.len()
            ))
        }
    }
}
