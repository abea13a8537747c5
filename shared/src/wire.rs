//! Fixed-size record framing for the named-pipe channels.
//!
//! Every message exchanged over a channel is a record of a size known to both
//! ends: the payload is bincode-encoded and zero-padded up to the record
//! size, so a reader can issue exact-length blocking reads with no delimiter
//! or length framing. Variable-length result sets are preceded by a single
//! [`Count`] record stating the element count.
//!
//! String fields carry documented maximum lengths and are checked before
//! encoding; an overlong field is a [`WireError::FieldTooLong`], never a
//! silent truncation.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("failed to encode record: {0}")]
    Encode(bincode::Error),
    #[error("failed to decode record: {0}")]
    Decode(bincode::Error),
    #[error("encoded record is {got} bytes, exceeding the {limit}-byte record size")]
    Oversize { got: usize, limit: usize },
    #[error("record truncated: got {got} bytes, expected {expected}")]
    ShortRead { got: usize, expected: usize },
    #[error("field `{field}` is {got} bytes long, maximum is {max}")]
    FieldTooLong {
        field: &'static str,
        got: usize,
        max: usize,
    },
}

/// Checks a textual field against its documented maximum length.
pub fn check_field(field: &'static str, value: &str, max: usize) -> Result<(), WireError> {
    if value.len() > max {
        Err(WireError::FieldTooLong {
            field,
            got: value.len(),
            max,
        })
    } else {
        Ok(())
    }
}

/// A fixed-size wire record.
///
/// Implementors declare their on-pipe size; encoding and decoding are
/// provided. Types with textual fields override [`Record::validate`] to
/// enforce their per-field maxima.
pub trait Record: Serialize + DeserializeOwned {
    /// Exact number of bytes this record occupies on a channel.
    const SIZE: usize;

    /// Field-level validation hook, run before encoding.
    fn validate(&self) -> Result<(), WireError> {
        Ok(())
    }

    /// Serializes into exactly [`Record::SIZE`] bytes, zero-padded.
    fn encode(&self) -> Result<Vec<u8>, WireError> {
        self.validate()?;
        let mut buf = bincode::serialize(self).map_err(WireError::Encode)?;
        if buf.len() > Self::SIZE {
            return Err(WireError::Oversize {
                got: buf.len(),
                limit: Self::SIZE,
            });
        }
        buf.resize(Self::SIZE, 0);
        Ok(buf)
    }

    /// Deserializes from a buffer of at least [`Record::SIZE`] bytes;
    /// trailing padding is ignored.
    fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < Self::SIZE {
            return Err(WireError::ShortRead {
                got: bytes.len(),
                expected: Self::SIZE,
            });
        }
        bincode::deserialize(&bytes[..Self::SIZE]).map_err(WireError::Decode)
    }
}

/// Element count preceding a variable-length result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Count(pub u32);

impl Record for Count {
    const SIZE: usize = 16;
}

/// Single-boolean acknowledgement response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack(pub bool);

impl Record for Ack {
    const SIZE: usize = 16;
}
