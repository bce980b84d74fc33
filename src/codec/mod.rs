//! Codec Module
//!
//! The marshaling contract each map is opened with.
//!
//! ## Responsibilities
//! - Define the ordering of encoded keys (`compare`)
//! - Reject malformed encodings before they reach a map (`validate`)
//!
//! Maps store keys and values as encoded bytes; a [`DataType`] decides how
//! those bytes sort and which byte strings are legal.

mod types;

use std::cmp::Ordering;
use std::fmt;

use crate::error::Result;

pub use types::{BytesType, LongType, StringType};

/// Ordering + encoding contract for keys or values of one map
pub trait DataType: Send + Sync + fmt::Debug {
    /// Short type name used in error messages
    fn name(&self) -> &'static str;

    /// Total order over two encoded values
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// Check that `bytes` is a legal encoding for this type
    fn validate(&self, _bytes: &[u8]) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Validate an encoded key, mapping the failure into an [`crate::AoError::InvalidKey`]
pub(crate) fn check_key(data_type: &dyn DataType, key: &[u8]) -> Result<()> {
    data_type
        .validate(key)
        .map_err(|reason| crate::AoError::InvalidKey {
            type_name: data_type.name(),
            reason,
        })
}

/// Validate an encoded value, mapping the failure into an [`crate::AoError::InvalidValue`]
pub(crate) fn check_value(data_type: &dyn DataType, value: &[u8]) -> Result<()> {
    data_type
        .validate(value)
        .map_err(|reason| crate::AoError::InvalidValue {
            type_name: data_type.name(),
            reason,
        })
}
