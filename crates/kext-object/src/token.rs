//! Opaque reference tokens
//!
//! A `RawRef` is the untyped representation of a foreign object reference at
//! the boundary: a fixed-width integer of pointer bit-width. Consumers never
//! dereference it; the only way a token re-enters the safe layer is through
//! kind-checked adoption, so a forged or stale token produces a checked error
//! rather than undefined behavior.

use std::fmt;

/// Opaque token standing in for a foreign object reference.
///
/// Tokens compare and hash by identity. The bit pattern is only meaningful to
/// the runtime that issued it.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawRef(usize);

impl RawRef {
    /// Reconstruct a token from its boundary representation.
    ///
    /// The result is not trusted: adoption into a handle re-validates both
    /// liveness and the kind tag.
    #[inline]
    pub const fn from_bits(bits: usize) -> Self {
        RawRef(bits)
    }

    /// Get the boundary representation of this token
    #[inline]
    pub const fn bits(self) -> usize {
        self.0
    }
}

impl fmt::Debug for RawRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawRef({:#x})", self.0)
    }
}

impl fmt::Display for RawRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trips_bits() {
        let raw = RawRef::from_bits(0x7f00_1234);
        assert_eq!(raw.bits(), 0x7f00_1234);
        assert_eq!(RawRef::from_bits(raw.bits()), raw);
    }

    #[test]
    fn test_token_is_pointer_width() {
        assert_eq!(
            std::mem::size_of::<RawRef>(),
            std::mem::size_of::<*const ()>()
        );
    }

    #[test]
    fn test_token_display() {
        assert_eq!(format!("{}", RawRef::from_bits(0x10)), "0x10");
        assert_eq!(format!("{:?}", RawRef::from_bits(0x10)), "RawRef(0x10)");
    }
}
