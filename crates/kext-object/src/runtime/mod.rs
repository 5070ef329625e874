//! Foreign object runtime contract
//!
//! This module pins down the collaborator contract the handle layer depends
//! on: stable type identifiers per kind, +1 ownership on every create/copy,
//! borrowed access on every get, deterministic encoding failure signaling,
//! and thread-safe reference counting. `InProcRuntime` is the deterministic
//! in-process implementation of the contract; a platform-backed runtime can
//! implement the same trait behind the identical surface.

mod inproc;

pub use inproc::InProcRuntime;

use crate::encoding::Encoding;
use crate::error::ObjectResult;
use crate::kind::{Kind, TypeId};
use crate::number::{NumberType, NumberValue};
use crate::token::RawRef;
use std::fmt;

/// Copy/retain behavior of container slots.
///
/// `Retaining` containers take shared ownership of their elements (retain on
/// insert, release on destruction); `NonRetaining` containers store bare
/// tokens and leave lifetime management to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectionCallbacks {
    /// Retain elements on insert, release them when the container dies
    #[default]
    Retaining,
    /// Store bare tokens without touching reference counts
    NonRetaining,
}

/// Interpretation of a file-system path string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStyle {
    /// POSIX-style slash-separated path
    Posix,
    /// Windows-style path
    Windows,
}

/// Construction options for an in-process runtime.
///
/// `max_objects` bounds the live object table; once the budget is exhausted
/// every create operation fails with `AllocationFailed`. `None` means
/// unbounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// Maximum number of live objects (None = unlimited)
    pub max_objects: Option<usize>,
}

/// The foreign object runtime surface the handle layer is built on.
///
/// # Ownership contract
///
/// - Every `create_*` operation performs exactly one foreign allocation and
///   returns a token owning one reference; the caller must release it
///   exactly once.
/// - Every getter returns data borrowed from the object's lifetime; returned
///   element tokens are unretained.
/// - `release` beyond the owned reference is a checked [`DoubleRelease`]
///   defect report, never undefined behavior.
///
/// No operation in this contract performs I/O.
///
/// [`DoubleRelease`]: crate::ObjectError::DoubleRelease
pub trait ObjectRuntime: Send + Sync {
    /// Increment the reference count of a live object
    fn retain(&self, raw: RawRef) -> ObjectResult<()>;

    /// Release exactly one reference, destroying the object at zero
    fn release(&self, raw: RawRef) -> ObjectResult<()>;

    /// Current reference count (introspection/test hook)
    fn retain_count(&self, raw: RawRef) -> ObjectResult<usize>;

    /// Runtime type identifier of a live object
    fn type_id(&self, raw: RawRef) -> ObjectResult<TypeId>;

    /// Concrete kind of a live object
    fn kind_of(&self, raw: RawRef) -> ObjectResult<Kind> {
        Ok(self.type_id(raw)?.kind().unwrap_or(Kind::Generic))
    }

    /// Human-readable description of a type identifier
    fn type_description(&self, id: TypeId) -> &'static str {
        id.kind().map(Kind::name).unwrap_or("unknown")
    }

    /// Create a string object from bytes in the declared encoding
    fn create_string(&self, bytes: &[u8], encoding: Encoding) -> ObjectResult<RawRef>;

    /// Number of Unicode scalar values in a string object
    fn string_length(&self, raw: RawRef) -> ObjectResult<usize>;

    /// Encode a string object's text into the requested encoding
    fn string_bytes(&self, raw: RawRef, encoding: Encoding) -> ObjectResult<Vec<u8>>;

    /// Create an array object from element tokens
    fn create_array(
        &self,
        items: &[RawRef],
        callbacks: CollectionCallbacks,
    ) -> ObjectResult<RawRef>;

    /// Element count of an array object
    fn array_count(&self, raw: RawRef) -> ObjectResult<usize>;

    /// Borrowed element tokens in `[start, start+len)`.
    ///
    /// Out-of-range input is a checked `RangeOutOfBounds` error. The tokens
    /// are unretained: they are valid only while the array is alive.
    fn array_values(&self, raw: RawRef, start: usize, len: usize) -> ObjectResult<Vec<RawRef>>;

    /// Create a dictionary object from key/value token pairs.
    ///
    /// Duplicate keys (by structural equality for strings, numbers, booleans
    /// and data; by identity otherwise) collapse last-wins, so stored keys
    /// are unique.
    fn create_dictionary(
        &self,
        entries: &[(RawRef, RawRef)],
        callbacks: CollectionCallbacks,
    ) -> ObjectResult<RawRef>;

    /// Entry count of a dictionary object
    fn dictionary_count(&self, raw: RawRef) -> ObjectResult<usize>;

    /// Borrowed key/value token pairs of a dictionary object
    fn dictionary_entries(&self, raw: RawRef) -> ObjectResult<Vec<(RawRef, RawRef)>>;

    /// Create a number object
    fn create_number(&self, value: NumberValue) -> ObjectResult<RawRef>;

    /// Representation tag of a number object
    fn number_type(&self, raw: RawRef) -> ObjectResult<NumberType>;

    /// Stored value of a number object
    fn number_value(&self, raw: RawRef) -> ObjectResult<NumberValue>;

    /// Canonical boolean singleton token.
    ///
    /// The two booleans are allocated once by the runtime and pinned:
    /// retain and release on them are no-ops and they are never destroyed.
    fn boolean(&self, value: bool) -> RawRef;

    /// Stored value of a boolean object
    fn boolean_value(&self, raw: RawRef) -> ObjectResult<bool>;

    /// Create a data object owning a copy of the bytes
    fn create_data(&self, bytes: &[u8]) -> ObjectResult<RawRef>;

    /// Byte length of a data object
    fn data_length(&self, raw: RawRef) -> ObjectResult<usize>;

    /// Copy of a data object's bytes
    fn data_bytes(&self, raw: RawRef) -> ObjectResult<Vec<u8>>;

    /// Create a URL object from a file-system path.
    ///
    /// `path` must be a String-kind object; anything else is a
    /// `TypeMismatch`. The path text is copied, the string is not retained.
    fn create_url(
        &self,
        path: RawRef,
        style: PathStyle,
        is_directory: bool,
    ) -> ObjectResult<RawRef>;

    /// Path text of a URL object
    fn url_path(&self, raw: RawRef) -> ObjectResult<String>;

    /// Path style of a URL object
    fn url_path_style(&self, raw: RawRef) -> ObjectResult<PathStyle>;

    /// Directory flag of a URL object
    fn url_is_directory(&self, raw: RawRef) -> ObjectResult<bool>;
}

impl<'a> fmt::Debug for (dyn ObjectRuntime + 'a) {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ObjectRuntime")
    }
}
