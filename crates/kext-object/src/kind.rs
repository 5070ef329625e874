//! Kind tags and fixed runtime type identifiers
//!
//! Every foreign object carries a concrete kind; the kind fixes which
//! operations are legal on a handle. Type identifiers are stable across the
//! life of the runtime so a tag captured at creation time can be re-validated
//! before any down-cast.

use std::fmt;

/// Kind tag for a foreign object.
///
/// `Generic` is the erased tag used by untyped handles. Allocated objects
/// always report one of the concrete kinds; the runtime never returns
/// `Generic` from a type query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Erased view of any object (untyped handles only)
    Generic,
    /// Text object with a declared encoding
    String,
    /// Ordered sequence of object references
    Array,
    /// Key/value mapping of object references
    Dictionary,
    /// Tagged numeric value
    Number,
    /// Canonical true/false singleton
    Boolean,
    /// Raw byte buffer
    Data,
    /// File-system URL
    Url,
}

impl Kind {
    /// Get the fixed type identifier for this kind
    #[inline]
    pub const fn type_id(self) -> TypeId {
        match self {
            Kind::Generic => TypeId::GENERIC,
            Kind::String => TypeId::STRING,
            Kind::Array => TypeId::ARRAY,
            Kind::Dictionary => TypeId::DICTIONARY,
            Kind::Number => TypeId::NUMBER,
            Kind::Boolean => TypeId::BOOLEAN,
            Kind::Data => TypeId::DATA,
            Kind::Url => TypeId::URL,
        }
    }

    /// Human-readable type description (for diagnostics)
    pub const fn name(self) -> &'static str {
        match self {
            Kind::Generic => "object",
            Kind::String => "string",
            Kind::Array => "array",
            Kind::Dictionary => "dictionary",
            Kind::Number => "number",
            Kind::Boolean => "boolean",
            Kind::Data => "data",
            Kind::Url => "url",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed, stable runtime type identifier.
///
/// Identifiers are bijective with the concrete kinds: `type_id_of` on an
/// object created as kind X always returns `X.type_id()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u64);

impl TypeId {
    /// Identifier of the erased generic tag (never reported by the runtime)
    pub const GENERIC: TypeId = TypeId(0);
    /// Identifier of the string kind
    pub const STRING: TypeId = TypeId(1);
    /// Identifier of the array kind
    pub const ARRAY: TypeId = TypeId(2);
    /// Identifier of the dictionary kind
    pub const DICTIONARY: TypeId = TypeId(3);
    /// Identifier of the number kind
    pub const NUMBER: TypeId = TypeId(4);
    /// Identifier of the boolean kind
    pub const BOOLEAN: TypeId = TypeId(5);
    /// Identifier of the data kind
    pub const DATA: TypeId = TypeId(6);
    /// Identifier of the URL kind
    pub const URL: TypeId = TypeId(7);

    /// Get the raw identifier value
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Map the identifier back to its kind
    ///
    /// Returns `None` for identifier values outside the fixed table.
    pub const fn kind(self) -> Option<Kind> {
        match self.0 {
            0 => Some(Kind::Generic),
            1 => Some(Kind::String),
            2 => Some(Kind::Array),
            3 => Some(Kind::Dictionary),
            4 => Some(Kind::Number),
            5 => Some(Kind::Boolean),
            6 => Some(Kind::Data),
            7 => Some(Kind::Url),
            _ => None,
        }
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(kind) => write!(f, "{} ({})", self.0, kind.name()),
            None => write!(f, "{} (unknown)", self.0),
        }
    }
}
