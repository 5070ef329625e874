//! String encodings at the boundary
//!
//! Text crosses the boundary as bytes plus a declared encoding. Decoding
//! validates the byte sequence up front: invalid input fails with
//! `InvalidEncoding` instead of producing a malformed string, and encoding a
//! string back with the same declared encoding reproduces the original bytes.

use crate::error::{ObjectError, ObjectResult};
use std::fmt;

/// Supported text encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// UTF-8
    Utf8,
    /// 7-bit ASCII
    Ascii,
    /// UTF-16, big-endian code units
    Utf16Be,
    /// UTF-16, little-endian code units
    Utf16Le,
}

impl Encoding {
    /// Encoding name (for diagnostics)
    pub const fn name(self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Ascii => "ASCII",
            Encoding::Utf16Be => "UTF-16BE",
            Encoding::Utf16Le => "UTF-16LE",
        }
    }

    /// Decode a byte sequence declared to be in this encoding.
    ///
    /// Fails with `InvalidEncoding` when the bytes are not valid for the
    /// declared encoding (including odd-length UTF-16 input and unpaired
    /// surrogates).
    pub fn decode(self, bytes: &[u8]) -> ObjectResult<String> {
        let invalid = || ObjectError::InvalidEncoding { encoding: self };
        match self {
            Encoding::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|_| invalid()),
            Encoding::Ascii => {
                if bytes.is_ascii() {
                    // ASCII is a strict subset of UTF-8
                    String::from_utf8(bytes.to_vec()).map_err(|_| invalid())
                } else {
                    Err(invalid())
                }
            }
            Encoding::Utf16Be => Self::decode_utf16(bytes, u16::from_be_bytes, invalid),
            Encoding::Utf16Le => Self::decode_utf16(bytes, u16::from_le_bytes, invalid),
        }
    }

    /// Encode text into this encoding.
    ///
    /// Fails with `InvalidEncoding` when the text contains characters the
    /// encoding cannot represent (non-ASCII text declared as ASCII).
    pub fn encode(self, text: &str) -> ObjectResult<Vec<u8>> {
        match self {
            Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
            Encoding::Ascii => {
                if text.is_ascii() {
                    Ok(text.as_bytes().to_vec())
                } else {
                    Err(ObjectError::InvalidEncoding { encoding: self })
                }
            }
            Encoding::Utf16Be => Ok(text
                .encode_utf16()
                .flat_map(|unit| unit.to_be_bytes())
                .collect()),
            Encoding::Utf16Le => Ok(text
                .encode_utf16()
                .flat_map(|unit| unit.to_le_bytes())
                .collect()),
        }
    }

    fn decode_utf16(
        bytes: &[u8],
        from_bytes: fn([u8; 2]) -> u16,
        invalid: impl Fn() -> ObjectError,
    ) -> ObjectResult<String> {
        if bytes.len() % 2 != 0 {
            return Err(invalid());
        }
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| from_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&units).map_err(|_| invalid())
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
