//! Deep conversion between handles and plain value trees
//!
//! `convert` walks a foreign object graph and produces an owned
//! `PropertyValue` tree; `to_handle` goes the other way. Conversion is
//! dispatched on the live runtime type tag, so a handle of an unsupported
//! kind is a checked error rather than a silent skip.

use crate::error::{ObjectError, ObjectResult};
use crate::handle::{
    ArrayHandle, BooleanHandle, BorrowedObject, DataHandle, DictionaryHandle, NumberHandle,
    ObjectHandle, StringHandle,
};
use crate::kind::Kind;
use crate::number::NumberValue;
use crate::runtime::ObjectRuntime;
use serde::Serialize;
use std::collections::BTreeMap;

/// Owned, deep-converted value of a foreign object graph.
///
/// Maps are string-keyed: introspection dictionaries key their records by
/// identifier text, and a non-string key fails conversion with
/// `TypeMismatch`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Boolean value
    Bool(bool),
    /// Raw byte buffer
    Bytes(Vec<u8>),
    /// Text value
    Text(String),
    /// Tagged numeric value
    Number(NumberValue),
    /// Ordered sequence of values
    List(Vec<PropertyValue>),
    /// String-keyed mapping
    Map(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    /// Text content, if this is a `Text` value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Boolean content, if this is a `Bool` value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Numeric content, if this is a `Number` value
    pub fn as_number(&self) -> Option<NumberValue> {
        match self {
            PropertyValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// List content, if this is a `List` value
    pub fn as_list(&self) -> Option<&[PropertyValue]> {
        match self {
            PropertyValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Map content, if this is a `Map` value
    pub fn as_map(&self) -> Option<&BTreeMap<String, PropertyValue>> {
        match self {
            PropertyValue::Map(map) => Some(map),
            _ => None,
        }
    }
}

/// Deep-convert a foreign object into an owned value tree.
///
/// Strings, arrays, dictionaries, numbers, booleans and data convert;
/// anything else (URLs, unknown kinds) is a `TypeMismatch` against the
/// erased `Generic` tag, meaning "no convertible kind matched".
pub fn convert(obj: &BorrowedObject<'_>) -> ObjectResult<PropertyValue> {
    let rt = obj.runtime();
    match obj.kind()? {
        Kind::String => Ok(PropertyValue::Text(string_text(rt, obj)?)),
        Kind::Data => Ok(PropertyValue::Bytes(rt.data_bytes(obj.raw())?)),
        Kind::Number => Ok(PropertyValue::Number(rt.number_value(obj.raw())?)),
        Kind::Boolean => Ok(PropertyValue::Bool(rt.boolean_value(obj.raw())?)),
        Kind::Array => {
            let count = rt.array_count(obj.raw())?;
            let mut items = Vec::with_capacity(count);
            for raw in rt.array_values(obj.raw(), 0, count)? {
                items.push(convert(&BorrowedObject::new(rt, raw))?);
            }
            Ok(PropertyValue::List(items))
        }
        Kind::Dictionary => {
            let mut map = BTreeMap::new();
            for (key, value) in rt.dictionary_entries(obj.raw())? {
                let key = BorrowedObject::new(rt, key);
                let key_kind = key.kind()?;
                if key_kind != Kind::String {
                    return Err(ObjectError::TypeMismatch {
                        expected: Kind::String,
                        found: key_kind,
                    });
                }
                let text = string_text(rt, &key)?;
                map.insert(text, convert(&BorrowedObject::new(rt, value))?);
            }
            Ok(PropertyValue::Map(map))
        }
        found => Err(ObjectError::TypeMismatch {
            expected: Kind::Generic,
            found,
        }),
    }
}

/// Build an owned object graph from a value tree.
///
/// The returned handle owns one reference to the root; nested objects are
/// retained by their containers.
pub fn to_handle<'rt>(
    rt: &'rt dyn ObjectRuntime,
    value: &PropertyValue,
) -> ObjectResult<ObjectHandle<'rt>> {
    match value {
        PropertyValue::Bool(b) => BooleanHandle::of(rt, *b).to_object(),
        PropertyValue::Bytes(bytes) => Ok(DataHandle::new(rt, bytes)?.into_object()),
        PropertyValue::Text(text) => Ok(StringHandle::new(rt, text)?.into_object()),
        PropertyValue::Number(number) => Ok(NumberHandle::new(rt, *number)?.into_object()),
        PropertyValue::List(items) => {
            let owned: Vec<ObjectHandle<'rt>> = items
                .iter()
                .map(|item| to_handle(rt, item))
                .collect::<ObjectResult<_>>()?;
            let refs: Vec<&ObjectHandle<'rt>> = owned.iter().collect();
            Ok(ArrayHandle::new(rt, &refs)?.into_object())
        }
        PropertyValue::Map(map) => Ok(dictionary_from_properties(rt, map)?.into_object()),
    }
}

/// Build a string-keyed dictionary from a property map
pub fn dictionary_from_properties<'rt>(
    rt: &'rt dyn ObjectRuntime,
    properties: &BTreeMap<String, PropertyValue>,
) -> ObjectResult<DictionaryHandle<'rt>> {
    let mut keys = Vec::with_capacity(properties.len());
    let mut values = Vec::with_capacity(properties.len());
    for (key, value) in properties {
        keys.push(StringHandle::new(rt, key)?.into_object());
        values.push(to_handle(rt, value)?);
    }
    let pairs: Vec<(&ObjectHandle<'rt>, &ObjectHandle<'rt>)> =
        keys.iter().zip(values.iter()).collect();
    DictionaryHandle::new(rt, &pairs)
}

fn string_text(rt: &dyn ObjectRuntime, obj: &BorrowedObject<'_>) -> ObjectResult<String> {
    let bytes = rt.string_bytes(obj.raw(), crate::encoding::Encoding::Utf8)?;
    String::from_utf8(bytes).map_err(|_| ObjectError::InvalidEncoding {
        encoding: crate::encoding::Encoding::Utf8,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::InProcRuntime;

    fn sample_tree() -> PropertyValue {
        let mut info = BTreeMap::new();
        info.insert(
            "CFBundleIdentifier".to_string(),
            PropertyValue::Text("com.example.driver".to_string()),
        );
        info.insert("OSBundleStarted".to_string(), PropertyValue::Bool(true));
        info.insert(
            "OSBundleRetainCount".to_string(),
            PropertyValue::Number(NumberValue::I32(2)),
        );
        info.insert(
            "OSBundleDependencies".to_string(),
            PropertyValue::List(vec![
                PropertyValue::Text("com.example.core".to_string()),
                PropertyValue::Text("com.example.shared".to_string()),
            ]),
        );
        info.insert(
            "OSBundleUUID".to_string(),
            PropertyValue::Bytes(vec![0xde, 0xad, 0xbe, 0xef]),
        );
        PropertyValue::Map(info)
    }

    #[test]
    fn test_deep_round_trip() {
        let rt = InProcRuntime::new();
        let tree = sample_tree();
        let handle = to_handle(&rt, &tree).unwrap();
        let back = convert(&handle.borrow()).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn test_release_after_round_trip_frees_everything() {
        let rt = InProcRuntime::new();
        let handle = to_handle(&rt, &sample_tree()).unwrap();
        drop(handle);
        assert_eq!(rt.live_objects(), 0);
    }

    #[test]
    fn test_url_is_not_convertible() {
        let rt = InProcRuntime::new();
        let url = crate::handle::UrlHandle::from_path(
            &rt,
            "/tmp/x.kext",
            crate::runtime::PathStyle::Posix,
            true,
        )
        .unwrap();
        let err = convert(&url.as_object().borrow()).unwrap_err();
        assert_eq!(
            err,
            ObjectError::TypeMismatch {
                expected: Kind::Generic,
                found: Kind::Url
            }
        );
    }

    #[test]
    fn test_non_string_dictionary_key_fails() {
        let rt = InProcRuntime::new();
        let key = NumberHandle::new(&rt, NumberValue::I32(1)).unwrap();
        let value = StringHandle::new(&rt, "x").unwrap();
        let dict =
            DictionaryHandle::new(&rt, &[(key.as_object(), value.as_object())]).unwrap();
        let err = convert(&dict.as_object().borrow()).unwrap_err();
        assert_eq!(
            err,
            ObjectError::TypeMismatch {
                expected: Kind::String,
                found: Kind::Number
            }
        );
    }

    #[test]
    fn test_serializes_as_plain_json() {
        let json = serde_json::to_value(sample_tree()).unwrap();
        assert_eq!(json["CFBundleIdentifier"], "com.example.driver");
        assert_eq!(json["OSBundleStarted"], true);
        assert_eq!(json["OSBundleRetainCount"], 2);
        assert_eq!(json["OSBundleDependencies"][1], "com.example.shared");
    }
}
