//! Loaded-extension introspection records

use kext_object::{NumberValue, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Info key: bundle identifier of the extension
pub const KEY_BUNDLE_IDENTIFIER: &str = "CFBundleIdentifier";
/// Info key: bundle version string
pub const KEY_BUNDLE_VERSION: &str = "CFBundleVersion";
/// Info key: kernel load address
pub const KEY_LOAD_ADDRESS: &str = "OSBundleLoadAddress";
/// Info key: loaded image size in bytes
pub const KEY_LOAD_SIZE: &str = "OSBundleLoadSize";
/// Info key: kernel reference count
pub const KEY_RETAIN_COUNT: &str = "OSBundleRetainCount";
/// Info key: whether the extension's start routine has run
pub const KEY_STARTED: &str = "OSBundleStarted";
/// Info key: identifiers of the extensions this one links against
pub const KEY_DEPENDENCIES: &str = "OSBundleDependencies";

/// Introspection record for one loaded kernel extension.
///
/// Produced by the broker on query; the manager renders it into a
/// dictionary handle under the platform info keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedKextInfo {
    /// Bundle identifier
    pub identifier: String,
    /// Bundle version string
    pub version: String,
    /// Kernel load address
    pub load_address: u64,
    /// Loaded image size in bytes
    pub load_size: u64,
    /// Kernel reference count (number of loaded dependents)
    pub reference_count: u32,
    /// Whether the start routine has run
    pub started: bool,
    /// Identifiers of directly linked dependencies
    pub dependencies: Vec<String>,
}

impl LoadedKextInfo {
    /// Render the record as a property map, restricted to `info_keys`.
    ///
    /// `None` means all keys. Unknown requested keys are ignored, matching
    /// the broker's query semantics.
    pub fn to_properties(&self, info_keys: Option<&[String]>) -> BTreeMap<String, PropertyValue> {
        let wanted = |key: &str| match info_keys {
            Some(keys) => keys.iter().any(|k| k == key),
            None => true,
        };

        let mut map = BTreeMap::new();
        if wanted(KEY_BUNDLE_IDENTIFIER) {
            map.insert(
                KEY_BUNDLE_IDENTIFIER.to_string(),
                PropertyValue::Text(self.identifier.clone()),
            );
        }
        if wanted(KEY_BUNDLE_VERSION) {
            map.insert(
                KEY_BUNDLE_VERSION.to_string(),
                PropertyValue::Text(self.version.clone()),
            );
        }
        if wanted(KEY_LOAD_ADDRESS) {
            map.insert(
                KEY_LOAD_ADDRESS.to_string(),
                PropertyValue::Number(NumberValue::I64(self.load_address as i64)),
            );
        }
        if wanted(KEY_LOAD_SIZE) {
            map.insert(
                KEY_LOAD_SIZE.to_string(),
                PropertyValue::Number(NumberValue::I64(self.load_size as i64)),
            );
        }
        if wanted(KEY_RETAIN_COUNT) {
            map.insert(
                KEY_RETAIN_COUNT.to_string(),
                PropertyValue::Number(NumberValue::I32(self.reference_count as i32)),
            );
        }
        if wanted(KEY_STARTED) {
            map.insert(KEY_STARTED.to_string(), PropertyValue::Bool(self.started));
        }
        if wanted(KEY_DEPENDENCIES) {
            map.insert(
                KEY_DEPENDENCIES.to_string(),
                PropertyValue::List(
                    self.dependencies
                        .iter()
                        .cloned()
                        .map(PropertyValue::Text)
                        .collect(),
                ),
            );
        }
        map
    }
}
