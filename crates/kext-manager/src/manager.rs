//! Kernel extension lifecycle manager
//!
//! The manager is the safe front door to the privileged broker: its data
//! currency is typed handles from the object layer. Identifier text and
//! dependency URLs are extracted and kind-checked before the broker is
//! contacted, and query results come back as a newly created owned
//! dictionary the caller must release (by dropping it).

use crate::broker::Broker;
use crate::status::Status;
use kext_object::{
    dictionary_from_properties, ArrayHandle, BorrowedObject, DictionaryHandle, Encoding, Kind,
    ObjectError, ObjectHandle, ObjectRuntime, PathStyle, PropertyValue, StringHandle, UrlHandle,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors from an introspection query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Handle-layer failure while preparing or rendering the query
    #[error(transparent)]
    Object(#[from] ObjectError),

    /// The broker round-trip itself failed
    #[error("broker query failed: {0}")]
    Broker(Status),
}

// Reverse-DNS: at least two segments, no leading/trailing separator inside
// a segment
static BUNDLE_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9_-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9_-]*[A-Za-z0-9])?)+$")
        .expect("static pattern compiles")
});

fn valid_identifier(identifier: &str) -> bool {
    BUNDLE_ID.is_match(identifier)
}

/// Lifecycle manager for kernel extensions.
///
/// Holds the object runtime the handles belong to and the broker that
/// performs the privileged work. All calls are synchronous; none retry.
pub struct KextManager<'rt> {
    rt: &'rt dyn ObjectRuntime,
    broker: Arc<dyn Broker>,
}

impl<'rt> KextManager<'rt> {
    /// Create a manager over a runtime and a broker
    pub fn new(rt: &'rt dyn ObjectRuntime, broker: Arc<dyn Broker>) -> Self {
        Self { rt, broker }
    }

    /// Request a load of the named extension.
    ///
    /// `dependency_urls` must contain only URL-kind items; anything else is
    /// a `TypeMismatch` before the broker is contacted. A syntactically
    /// invalid identifier short-circuits to `InvalidArgument` without broker
    /// side effects. The broker is called exactly once; the caller owns
    /// retry policy.
    pub fn load_extension(
        &self,
        identifier: &StringHandle<'_>,
        dependency_urls: &ArrayHandle<'_>,
    ) -> Result<Status, ObjectError> {
        let id = identifier.to_text()?;
        let paths = self.url_paths(dependency_urls)?;
        if !valid_identifier(&id) {
            log::warn!("load rejected: malformed identifier `{id}`");
            return Ok(Status::InvalidArgument);
        }

        log::info!("load {id} ({} dependency search paths)", paths.len());
        let status = self.broker.load(&id, &paths);
        if status.is_success() {
            log::info!("load {id}: {status}");
        } else {
            log::warn!("load {id}: {status}");
        }
        Ok(status)
    }

    /// Request an unload of the named extension.
    ///
    /// Returns `NotLoaded` when the identifier has no active registration
    /// and `Busy` while dependents are still loaded.
    pub fn unload_extension(&self, identifier: &StringHandle<'_>) -> Result<Status, ObjectError> {
        let id = identifier.to_text()?;
        if !valid_identifier(&id) {
            log::warn!("unload rejected: malformed identifier `{id}`");
            return Ok(Status::InvalidArgument);
        }

        log::info!("unload {id}");
        let status = self.broker.unload(&id);
        if status.is_success() {
            log::info!("unload {id}: {status}");
        } else {
            log::warn!("unload {id}: {status}");
        }
        Ok(status)
    }

    /// Introspect loaded extensions.
    ///
    /// `identifiers` and `info_keys` must be String-kind arrays; `None`
    /// means match-all. The returned dictionary maps identifier to its info
    /// record and is owned by the caller.
    pub fn query_loaded_info(
        &self,
        identifiers: Option<&ArrayHandle<'_>>,
        info_keys: Option<&ArrayHandle<'_>>,
    ) -> Result<DictionaryHandle<'rt>, QueryError> {
        let ids = identifiers.map(|a| self.string_items(a)).transpose()?;
        let keys = info_keys.map(|a| self.string_items(a)).transpose()?;

        log::debug!(
            "query loaded info (identifiers: {}, keys: {})",
            ids.as_ref().map(|v| v.len().to_string()).unwrap_or_else(|| "all".to_string()),
            keys.as_ref().map(|v| v.len().to_string()).unwrap_or_else(|| "all".to_string()),
        );
        let records = self
            .broker
            .loaded_info(ids.as_deref(), keys.as_deref())
            .map_err(QueryError::Broker)?;

        let mut map = BTreeMap::new();
        for record in records {
            map.insert(
                record.identifier.clone(),
                PropertyValue::Map(record.to_properties(keys.as_deref())),
            );
        }
        Ok(dictionary_from_properties(self.rt, &map)?)
    }

    /// Load by plain identifier and POSIX dependency search paths
    pub fn load_by_identifier(
        &self,
        identifier: &str,
        dependency_paths: &[&str],
    ) -> Result<Status, ObjectError> {
        let id = StringHandle::new(self.rt, identifier)?;
        let urls: Vec<ObjectHandle<'rt>> = dependency_paths
            .iter()
            .map(|path| {
                UrlHandle::from_path(self.rt, path, PathStyle::Posix, true)
                    .map(UrlHandle::into_object)
            })
            .collect::<Result<_, _>>()?;
        let refs: Vec<&ObjectHandle<'rt>> = urls.iter().collect();
        let array = ArrayHandle::new(self.rt, &refs)?;
        self.load_extension(&id, &array)
    }

    /// Unload by plain identifier
    pub fn unload_by_identifier(&self, identifier: &str) -> Result<Status, ObjectError> {
        let id = StringHandle::new(self.rt, identifier)?;
        self.unload_extension(&id)
    }

    /// Deep-converted info record for one identifier.
    ///
    /// Returns `None` when the identifier is not loaded.
    pub fn info(&self, identifier: &str) -> Result<Option<PropertyValue>, QueryError> {
        let id = StringHandle::new(self.rt, identifier)?;
        let filter = ArrayHandle::new(self.rt, &[id.as_object()])?;
        let dict = self.query_loaded_info(Some(&filter), None)?;
        let tree = kext_object::convert(&dict.as_object().borrow())?;
        Ok(tree
            .as_map()
            .and_then(|records| records.get(identifier))
            .cloned())
    }

    fn url_paths(&self, urls: &ArrayHandle<'_>) -> Result<Vec<String>, ObjectError> {
        let count = urls.len()?;
        let mut paths = Vec::with_capacity(count);
        for value in urls.values(0, count)? {
            let kind = value.kind()?;
            if kind != Kind::Url {
                return Err(ObjectError::TypeMismatch {
                    expected: Kind::Url,
                    found: kind,
                });
            }
            paths.push(self.rt.url_path(value.raw())?);
        }
        Ok(paths)
    }

    fn string_items(&self, array: &ArrayHandle<'_>) -> Result<Vec<String>, ObjectError> {
        let count = array.len()?;
        let mut items = Vec::with_capacity(count);
        for value in array.values(0, count)? {
            items.push(self.borrowed_text(&value)?);
        }
        Ok(items)
    }

    fn borrowed_text(&self, value: &BorrowedObject<'_>) -> Result<String, ObjectError> {
        let kind = value.kind()?;
        if kind != Kind::String {
            return Err(ObjectError::TypeMismatch {
                expected: Kind::String,
                found: kind,
            });
        }
        let bytes = self.rt.string_bytes(value.raw(), Encoding::Utf8)?;
        String::from_utf8(bytes).map_err(|_| ObjectError::InvalidEncoding {
            encoding: Encoding::Utf8,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BrokerOptions, KextSpec, SimulatedBroker};
    use kext_object::InProcRuntime;

    fn broker_with(specs: Vec<KextSpec>) -> Arc<SimulatedBroker> {
        Arc::new(SimulatedBroker::with_options(BrokerOptions {
            available: specs,
        }))
    }

    fn fs_spec() -> KextSpec {
        KextSpec {
            identifier: "com.example.fs".to_string(),
            version: "1.0.0".to_string(),
            bundle_path: "/Library/Extensions/example.kext".to_string(),
            dependencies: vec![],
            signed: true,
        }
    }

    #[test]
    fn test_identifier_syntax() {
        assert!(valid_identifier("com.example.fs"));
        assert!(valid_identifier("com.github.osxfuse.filesystems.osxfusefs"));
        assert!(valid_identifier("io.kext-2.driver_a"));
        assert!(!valid_identifier("single"));
        assert!(!valid_identifier("com..double-dot"));
        assert!(!valid_identifier(".leading.dot"));
        assert!(!valid_identifier("trailing.dot."));
        assert!(!valid_identifier("com.example.bad segment"));
        assert!(!valid_identifier(""));
    }

    #[test]
    fn test_malformed_identifier_short_circuits() {
        let rt = InProcRuntime::new();
        let broker = broker_with(vec![fs_spec()]);
        let manager = KextManager::new(&rt, broker.clone());

        let id = StringHandle::new(&rt, "not an identifier").unwrap();
        let deps = ArrayHandle::new(&rt, &[]).unwrap();
        assert_eq!(
            manager.load_extension(&id, &deps).unwrap(),
            Status::InvalidArgument
        );
        // The broker was never contacted
        assert!(broker.loaded_identifiers().is_empty());
    }

    #[test]
    fn test_dependency_array_must_hold_urls() {
        let rt = InProcRuntime::new();
        let manager = KextManager::new(&rt, broker_with(vec![fs_spec()]));

        let id = StringHandle::new(&rt, "com.example.fs").unwrap();
        let stray = StringHandle::new(&rt, "/not/a/url").unwrap();
        let deps = ArrayHandle::new(&rt, &[stray.as_object()]).unwrap();

        assert_eq!(
            manager.load_extension(&id, &deps).unwrap_err(),
            ObjectError::TypeMismatch {
                expected: Kind::Url,
                found: Kind::String
            }
        );
    }

    #[test]
    fn test_query_filters_must_hold_strings() {
        let rt = InProcRuntime::new();
        let manager = KextManager::new(&rt, broker_with(vec![]));

        let number = kext_object::NumberHandle::new(&rt, kext_object::NumberValue::I32(9)).unwrap();
        let filter = ArrayHandle::new(&rt, &[number.as_object()]).unwrap();
        assert_eq!(
            manager.query_loaded_info(Some(&filter), None).unwrap_err(),
            QueryError::Object(ObjectError::TypeMismatch {
                expected: Kind::String,
                found: Kind::Number
            })
        );
    }

    #[test]
    fn test_load_by_identifier_builds_url_array() {
        let rt = InProcRuntime::new();
        let broker = broker_with(vec![KextSpec {
            dependencies: vec!["com.example.support".to_string()],
            ..fs_spec()
        }]);
        let manager = KextManager::new(&rt, broker);

        let status = manager
            .load_by_identifier(
                "com.example.fs",
                &["/Library/Filesystems/example.fs/Support/support.kext"],
            )
            .unwrap();
        assert_eq!(status, Status::Success);
        assert_eq!(rt.live_objects(), 0);
    }
}
