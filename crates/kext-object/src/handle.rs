//! Kind-tagged safe handles
//!
//! A handle owns exactly one reference to a foreign object and releases it
//! exactly once, on drop. Ownership moves with the handle, so the
//! double-release and leak classes are unrepresentable in safe code; the
//! only way to step outside that discipline is `into_raw`/`adopt_raw`, the
//! boundary crossing, and adoption re-validates the token before a handle
//! exists again.
//!
//! Kind-specific operations live on typed wrappers (`StringHandle`,
//! `ArrayHandle`, ...) whose constructors check the runtime type tag, so a
//! token can never be reinterpreted across kinds.

use crate::encoding::Encoding;
use crate::error::{ObjectError, ObjectResult};
use crate::kind::{Kind, TypeId};
use crate::number::{NumberType, NumberValue};
use crate::runtime::{CollectionCallbacks, ObjectRuntime, PathStyle};
use crate::token::RawRef;

/// Owned, kind-erased handle to a foreign object.
///
/// Owns one reference; releases it on drop. Not `Clone`: a second owned
/// reference must be taken explicitly with [`try_clone`](Self::try_clone).
#[derive(Debug)]
pub struct ObjectHandle<'rt> {
    rt: &'rt dyn ObjectRuntime,
    raw: RawRef,
    kind: Kind,
}

impl<'rt> ObjectHandle<'rt> {
    /// Wrap a token whose +1 reference is already ours
    pub(crate) fn from_owned(rt: &'rt dyn ObjectRuntime, raw: RawRef, kind: Kind) -> Self {
        Self { rt, raw, kind }
    }

    /// Adopt ownership of a token that crossed the boundary.
    ///
    /// The token is re-validated against the runtime: a stale or forged
    /// token is a checked error. The caller asserts the token carries one
    /// owned reference, which the new handle takes over.
    pub fn adopt_raw(rt: &'rt dyn ObjectRuntime, raw: RawRef) -> ObjectResult<Self> {
        let kind = rt.kind_of(raw)?;
        Ok(Self { rt, raw, kind })
    }

    /// Give up ownership and return the bare token.
    ///
    /// The reference this handle owned is not released; the token carries it
    /// across the boundary until someone adopts it back.
    pub fn into_raw(self) -> RawRef {
        let raw = self.raw;
        std::mem::forget(self);
        raw
    }

    /// The token this handle wraps
    #[inline]
    pub fn raw(&self) -> RawRef {
        self.raw
    }

    /// Kind tag captured when the handle was constructed
    #[inline]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// The runtime this handle belongs to
    #[inline]
    pub fn runtime(&self) -> &'rt dyn ObjectRuntime {
        self.rt
    }

    /// Live runtime type identifier of the object
    pub fn type_id(&self) -> ObjectResult<TypeId> {
        self.rt.type_id(self.raw)
    }

    /// Current foreign reference count
    pub fn retain_count(&self) -> ObjectResult<usize> {
        self.rt.retain_count(self.raw)
    }

    /// Take a second owned reference to the same object
    pub fn try_clone(&self) -> ObjectResult<Self> {
        self.rt.retain(self.raw)?;
        Ok(Self {
            rt: self.rt,
            raw: self.raw,
            kind: self.kind,
        })
    }

    /// Non-owning view of this object
    pub fn borrow(&self) -> BorrowedObject<'_> {
        BorrowedObject {
            rt: self.rt,
            raw: self.raw,
        }
    }

    fn expect_kind(&self, expected: Kind) -> ObjectResult<()> {
        // Check the live tag, not the cached one
        let found = self.rt.kind_of(self.raw)?;
        if found == expected {
            Ok(())
        } else {
            Err(ObjectError::TypeMismatch { expected, found })
        }
    }
}

impl Drop for ObjectHandle<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.rt.release(self.raw) {
            // A failed release means the ownership invariant was already
            // violated and the foreign count is no longer trustworthy
            if !std::thread::panicking() {
                panic!("releasing owned handle {} failed: {err}", self.raw);
            }
        }
    }
}

/// Non-owning view of a foreign object.
///
/// Returned by every `get`-family operation: valid only while the owning
/// handle is alive, never released, promotable to an owned handle with
/// [`to_owned`](Self::to_owned).
#[derive(Debug, Clone, Copy)]
pub struct BorrowedObject<'a> {
    rt: &'a dyn ObjectRuntime,
    raw: RawRef,
}

impl<'a> BorrowedObject<'a> {
    pub(crate) fn new(rt: &'a dyn ObjectRuntime, raw: RawRef) -> Self {
        Self { rt, raw }
    }

    /// The token this view refers to
    #[inline]
    pub fn raw(&self) -> RawRef {
        self.raw
    }

    /// The runtime the object belongs to
    #[inline]
    pub fn runtime(&self) -> &'a dyn ObjectRuntime {
        self.rt
    }

    /// Live kind of the viewed object
    pub fn kind(&self) -> ObjectResult<Kind> {
        self.rt.kind_of(self.raw)
    }

    /// Live runtime type identifier of the viewed object
    pub fn type_id(&self) -> ObjectResult<TypeId> {
        self.rt.type_id(self.raw)
    }

    /// Retain the object into a new owned handle
    pub fn to_owned(&self) -> ObjectResult<ObjectHandle<'a>> {
        let kind = self.rt.kind_of(self.raw)?;
        self.rt.retain(self.raw)?;
        Ok(ObjectHandle::from_owned(self.rt, self.raw, kind))
    }
}

macro_rules! typed_handle_common {
    ($name:ident, $kind:expr) => {
        impl<'rt> $name<'rt> {
            /// Kind-erased view of this handle
            #[inline]
            pub fn as_object(&self) -> &ObjectHandle<'rt> {
                &self.0
            }

            /// Erase the kind tag, keeping ownership
            #[inline]
            pub fn into_object(self) -> ObjectHandle<'rt> {
                self.0
            }
        }

        impl<'rt> TryFrom<ObjectHandle<'rt>> for $name<'rt> {
            type Error = ObjectError;

            /// Down-cast after validating the live type tag.
            ///
            /// Ownership is consumed either way: on mismatch the object is
            /// released and the error reports both kinds.
            fn try_from(obj: ObjectHandle<'rt>) -> ObjectResult<Self> {
                obj.expect_kind($kind)?;
                Ok(Self(obj))
            }
        }
    };
}

/// Owned handle to a string object
#[derive(Debug)]
pub struct StringHandle<'rt>(ObjectHandle<'rt>);

typed_handle_common!(StringHandle, Kind::String);

impl<'rt> StringHandle<'rt> {
    /// Create a string object from UTF-8 text
    pub fn new(rt: &'rt dyn ObjectRuntime, text: &str) -> ObjectResult<Self> {
        Self::from_bytes(rt, text.as_bytes(), Encoding::Utf8)
    }

    /// Create a string object from bytes in a declared encoding.
    ///
    /// Invalid byte sequences fail with `InvalidEncoding`; a malformed
    /// string is never constructed.
    pub fn from_bytes(
        rt: &'rt dyn ObjectRuntime,
        bytes: &[u8],
        encoding: Encoding,
    ) -> ObjectResult<Self> {
        let raw = rt.create_string(bytes, encoding)?;
        Ok(Self(ObjectHandle::from_owned(rt, raw, Kind::String)))
    }

    /// The text as an owned UTF-8 string
    pub fn to_text(&self) -> ObjectResult<String> {
        let bytes = self.bytes(Encoding::Utf8)?;
        String::from_utf8(bytes).map_err(|_| ObjectError::InvalidEncoding {
            encoding: Encoding::Utf8,
        })
    }

    /// The text encoded into the requested encoding
    pub fn bytes(&self, encoding: Encoding) -> ObjectResult<Vec<u8>> {
        self.0.rt.string_bytes(self.0.raw, encoding)
    }

    /// Number of Unicode scalar values
    pub fn length(&self) -> ObjectResult<usize> {
        self.0.rt.string_length(self.0.raw)
    }
}

/// Owned handle to an array object
#[derive(Debug)]
pub struct ArrayHandle<'rt>(ObjectHandle<'rt>);

typed_handle_common!(ArrayHandle, Kind::Array);

impl<'rt> ArrayHandle<'rt> {
    /// Create an array that retains its elements
    pub fn new(rt: &'rt dyn ObjectRuntime, items: &[&ObjectHandle<'rt>]) -> ObjectResult<Self> {
        Self::with_callbacks(rt, items, CollectionCallbacks::Retaining)
    }

    /// Create an array with explicit element callbacks
    pub fn with_callbacks(
        rt: &'rt dyn ObjectRuntime,
        items: &[&ObjectHandle<'rt>],
        callbacks: CollectionCallbacks,
    ) -> ObjectResult<Self> {
        let raws: Vec<RawRef> = items.iter().map(|item| item.raw()).collect();
        let raw = rt.create_array(&raws, callbacks)?;
        Ok(Self(ObjectHandle::from_owned(rt, raw, Kind::Array)))
    }

    /// Element count
    pub fn len(&self) -> ObjectResult<usize> {
        self.0.rt.array_count(self.0.raw)
    }

    /// Whether the array has no elements
    pub fn is_empty(&self) -> ObjectResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Borrowed views of the elements in `[start, start+len)`.
    ///
    /// Out-of-range input fails with `RangeOutOfBounds`. The views are valid
    /// only while this handle is alive.
    pub fn values(&self, start: usize, len: usize) -> ObjectResult<Vec<BorrowedObject<'rt>>> {
        let raws = self.0.rt.array_values(self.0.raw, start, len)?;
        Ok(raws
            .into_iter()
            .map(|raw| BorrowedObject::new(self.0.rt, raw))
            .collect())
    }

    /// Borrowed view of one element
    pub fn get(&self, index: usize) -> ObjectResult<BorrowedObject<'_>> {
        let mut values = self.values(index, 1)?;
        values.pop().ok_or(ObjectError::RangeOutOfBounds {
            start: index,
            len: 1,
            count: 0,
        })
    }
}

/// Owned handle to a dictionary object
#[derive(Debug)]
pub struct DictionaryHandle<'rt>(ObjectHandle<'rt>);

typed_handle_common!(DictionaryHandle, Kind::Dictionary);

impl<'rt> DictionaryHandle<'rt> {
    /// Create a dictionary that retains its keys and values.
    ///
    /// Duplicate keys collapse last-wins; stored keys are unique.
    pub fn new(
        rt: &'rt dyn ObjectRuntime,
        entries: &[(&ObjectHandle<'rt>, &ObjectHandle<'rt>)],
    ) -> ObjectResult<Self> {
        let raws: Vec<(RawRef, RawRef)> = entries
            .iter()
            .map(|(key, value)| (key.raw(), value.raw()))
            .collect();
        let raw = rt.create_dictionary(&raws, CollectionCallbacks::Retaining)?;
        Ok(Self(ObjectHandle::from_owned(rt, raw, Kind::Dictionary)))
    }

    /// Build a string-keyed dictionary from a property map
    pub fn from_properties(
        rt: &'rt dyn ObjectRuntime,
        properties: &std::collections::BTreeMap<String, crate::convert::PropertyValue>,
    ) -> ObjectResult<Self> {
        crate::convert::dictionary_from_properties(rt, properties)
    }

    /// Entry count
    pub fn len(&self) -> ObjectResult<usize> {
        self.0.rt.dictionary_count(self.0.raw)
    }

    /// Whether the dictionary has no entries
    pub fn is_empty(&self) -> ObjectResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Borrowed views of all key/value pairs
    pub fn entries(&self) -> ObjectResult<Vec<(BorrowedObject<'_>, BorrowedObject<'_>)>> {
        let raws = self.0.rt.dictionary_entries(self.0.raw)?;
        Ok(raws
            .into_iter()
            .map(|(key, value)| {
                (
                    BorrowedObject::new(self.0.rt, key),
                    BorrowedObject::new(self.0.rt, value),
                )
            })
            .collect())
    }

    /// Borrowed view of the value under a string key, if present.
    ///
    /// Non-string keys are skipped; only string keys can match.
    pub fn get(&self, key: &str) -> ObjectResult<Option<BorrowedObject<'_>>> {
        for (entry_key, value) in self.entries()? {
            if entry_key.kind()? != Kind::String {
                continue;
            }
            let text = self.0.rt.string_bytes(entry_key.raw(), Encoding::Utf8)?;
            if text == key.as_bytes() {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

/// Owned handle to a number object
#[derive(Debug)]
pub struct NumberHandle<'rt>(ObjectHandle<'rt>);

typed_handle_common!(NumberHandle, Kind::Number);

impl<'rt> NumberHandle<'rt> {
    /// Create a number object
    pub fn new(rt: &'rt dyn ObjectRuntime, value: NumberValue) -> ObjectResult<Self> {
        let raw = rt.create_number(value)?;
        Ok(Self(ObjectHandle::from_owned(rt, raw, Kind::Number)))
    }

    /// The stored value with its representation tag
    pub fn value(&self) -> ObjectResult<NumberValue> {
        self.0.rt.number_value(self.0.raw)
    }

    /// The stored representation tag
    pub fn number_type(&self) -> ObjectResult<NumberType> {
        self.0.rt.number_type(self.0.raw)
    }

    /// Lossless extraction as `i64`
    pub fn to_i64(&self) -> ObjectResult<i64> {
        self.value()?.to_i64()
    }

    /// Lossless extraction as `i32`
    pub fn to_i32(&self) -> ObjectResult<i32> {
        self.value()?.to_i32()
    }

    /// Lossless extraction as `f64`
    pub fn to_f64(&self) -> ObjectResult<f64> {
        self.value()?.to_f64()
    }
}

/// Handle to one of the two canonical boolean singletons.
///
/// Booleans are statically-known constants of the runtime: never separately
/// allocated, never released, so this handle is `Copy` and exposes no
/// release operation.
#[derive(Debug, Clone, Copy)]
pub struct BooleanHandle<'rt> {
    rt: &'rt dyn ObjectRuntime,
    raw: RawRef,
}

impl<'rt> BooleanHandle<'rt> {
    /// The canonical handle for a boolean value
    pub fn of(rt: &'rt dyn ObjectRuntime, value: bool) -> Self {
        Self {
            rt,
            raw: rt.boolean(value),
        }
    }

    /// The token of this singleton
    #[inline]
    pub fn raw(&self) -> RawRef {
        self.raw
    }

    /// The stored boolean value
    pub fn value(&self) -> ObjectResult<bool> {
        self.rt.boolean_value(self.raw)
    }

    /// Non-owning view (for placing the singleton in containers)
    pub fn borrow(&self) -> BorrowedObject<'rt> {
        BorrowedObject::new(self.rt, self.raw)
    }

    /// Kind-erased handle to the singleton.
    ///
    /// Release on a pinned singleton is a no-op, so the returned handle's
    /// drop is harmless.
    pub fn to_object(&self) -> ObjectResult<ObjectHandle<'rt>> {
        ObjectHandle::adopt_raw(self.rt, self.raw)
    }
}

/// Owned handle to a data (byte buffer) object
#[derive(Debug)]
pub struct DataHandle<'rt>(ObjectHandle<'rt>);

typed_handle_common!(DataHandle, Kind::Data);

impl<'rt> DataHandle<'rt> {
    /// Create a data object owning a copy of the bytes
    pub fn new(rt: &'rt dyn ObjectRuntime, bytes: &[u8]) -> ObjectResult<Self> {
        let raw = rt.create_data(bytes)?;
        Ok(Self(ObjectHandle::from_owned(rt, raw, Kind::Data)))
    }

    /// Byte length
    pub fn len(&self) -> ObjectResult<usize> {
        self.0.rt.data_length(self.0.raw)
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> ObjectResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Copy of the stored bytes
    pub fn to_bytes(&self) -> ObjectResult<Vec<u8>> {
        self.0.rt.data_bytes(self.0.raw)
    }
}

/// Owned handle to a file-system URL object
#[derive(Debug)]
pub struct UrlHandle<'rt>(ObjectHandle<'rt>);

typed_handle_common!(UrlHandle, Kind::Url);

impl<'rt> UrlHandle<'rt> {
    /// Create a URL object from a path string
    pub fn from_path(
        rt: &'rt dyn ObjectRuntime,
        path: &str,
        style: PathStyle,
        is_directory: bool,
    ) -> ObjectResult<Self> {
        let path_string = StringHandle::new(rt, path)?;
        Self::from_string(rt, &path_string, style, is_directory)
    }

    /// Create a URL object from an existing string handle
    pub fn from_string(
        rt: &'rt dyn ObjectRuntime,
        path: &StringHandle<'rt>,
        style: PathStyle,
        is_directory: bool,
    ) -> ObjectResult<Self> {
        let raw = rt.create_url(path.as_object().raw(), style, is_directory)?;
        Ok(Self(ObjectHandle::from_owned(rt, raw, Kind::Url)))
    }

    /// The path text
    pub fn path(&self) -> ObjectResult<String> {
        self.0.rt.url_path(self.0.raw)
    }

    /// The path style
    pub fn path_style(&self) -> ObjectResult<PathStyle> {
        self.0.rt.url_path_style(self.0.raw)
    }

    /// The directory flag
    pub fn is_directory(&self) -> ObjectResult<bool> {
        self.0.rt.url_is_directory(self.0.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::InProcRuntime;

    #[test]
    fn test_drop_releases_exactly_once() {
        let rt = InProcRuntime::new();
        let raw = {
            let data = DataHandle::new(&rt, b"abc").unwrap();
            assert_eq!(data.as_object().retain_count().unwrap(), 1);
            data.as_object().raw()
        };
        // The drop released the only reference
        assert_eq!(rt.release(raw), Err(ObjectError::DoubleRelease));
        assert_eq!(rt.live_objects(), 0);
    }

    #[test]
    fn test_try_clone_takes_second_reference() {
        let rt = InProcRuntime::new();
        let data = DataHandle::new(&rt, b"abc").unwrap();
        let clone = data.as_object().try_clone().unwrap();
        assert_eq!(clone.retain_count().unwrap(), 2);
        drop(clone);
        assert_eq!(data.as_object().retain_count().unwrap(), 1);
        assert_eq!(data.to_bytes().unwrap(), b"abc");
    }

    #[test]
    fn test_into_raw_and_adopt_round_trip() {
        let rt = InProcRuntime::new();
        let text = StringHandle::new(&rt, "com.example.driver").unwrap();
        let raw = text.into_object().into_raw();

        // The reference survives the boundary crossing
        assert_eq!(rt.retain_count(raw).unwrap(), 1);

        let adopted = ObjectHandle::adopt_raw(&rt, raw).unwrap();
        assert_eq!(adopted.kind(), Kind::String);
        let text = StringHandle::try_from(adopted).unwrap();
        assert_eq!(text.to_text().unwrap(), "com.example.driver");
    }

    #[test]
    fn test_adopting_forged_token_fails() {
        let rt = InProcRuntime::new();
        let forged = RawRef::from_bits(0xdead_beef);
        assert_eq!(
            ObjectHandle::adopt_raw(&rt, forged).unwrap_err(),
            ObjectError::StaleReference
        );
    }

    #[test]
    fn test_downcast_checks_kind() {
        let rt = InProcRuntime::new();
        let number = NumberHandle::new(&rt, NumberValue::I32(5)).unwrap();
        let err = StringHandle::try_from(number.into_object()).unwrap_err();
        assert_eq!(
            err,
            ObjectError::TypeMismatch {
                expected: Kind::String,
                found: Kind::Number
            }
        );
        assert_eq!(rt.live_objects(), 0);
    }

    #[test]
    fn test_array_round_trip_and_borrowed_elements() {
        let rt = InProcRuntime::new();
        let a = StringHandle::new(&rt, "a").unwrap();
        let b = StringHandle::new(&rt, "b").unwrap();
        let array = ArrayHandle::new(&rt, &[a.as_object(), b.as_object()]).unwrap();

        drop(a);
        drop(b);

        // The retaining array keeps the elements alive
        let values = array.values(0, array.len().unwrap()).unwrap();
        assert_eq!(values.len(), 2);
        let first = StringHandle::try_from(values[0].to_owned().unwrap()).unwrap();
        assert_eq!(first.to_text().unwrap(), "a");
    }

    #[test]
    fn test_array_get_out_of_range() {
        let rt = InProcRuntime::new();
        let array = ArrayHandle::new(&rt, &[]).unwrap();
        assert!(matches!(
            array.get(0),
            Err(ObjectError::RangeOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_dictionary_string_key_lookup() {
        let rt = InProcRuntime::new();
        let key = StringHandle::new(&rt, "CFBundleVersion").unwrap();
        let value = StringHandle::new(&rt, "1.4.2").unwrap();
        let dict = DictionaryHandle::new(&rt, &[(key.as_object(), value.as_object())]).unwrap();

        let found = dict.get("CFBundleVersion").unwrap().unwrap();
        let found = StringHandle::try_from(found.to_owned().unwrap()).unwrap();
        assert_eq!(found.to_text().unwrap(), "1.4.2");
        assert!(dict.get("CFBundleIdentifier").unwrap().is_none());
    }

    #[test]
    fn test_boolean_singletons_are_constants() {
        let rt = InProcRuntime::new();
        let yes = BooleanHandle::of(&rt, true);
        let also_yes = BooleanHandle::of(&rt, true);
        assert_eq!(yes.raw(), also_yes.raw());
        assert!(yes.value().unwrap());

        // An erased handle to the singleton can be dropped freely
        let erased = yes.to_object().unwrap();
        drop(erased);
        assert!(yes.value().unwrap());
    }

    #[test]
    fn test_url_from_path() {
        let rt = InProcRuntime::new();
        let url = UrlHandle::from_path(
            &rt,
            "/Library/Filesystems/example.fs/Contents/Extensions/example.kext",
            PathStyle::Posix,
            true,
        )
        .unwrap();
        assert!(url.path().unwrap().ends_with("example.kext"));
        assert!(url.is_directory().unwrap());
        // The temporary path string was released; only the URL is live
        assert_eq!(rt.live_objects(), 1);
    }

    #[test]
    fn test_number_handle_lossless_getters() {
        let rt = InProcRuntime::new();
        let number = NumberHandle::new(&rt, NumberValue::I64(1 << 40)).unwrap();
        assert_eq!(number.to_i64().unwrap(), 1 << 40);
        assert!(matches!(
            number.to_i32(),
            Err(ObjectError::NumericLoss { .. })
        ));
    }
}
