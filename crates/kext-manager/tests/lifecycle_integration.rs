//! Integration tests for the extension lifecycle
//!
//! Drives the manager end-to-end over the in-process runtime and the
//! simulated broker: load/unload state transitions, introspection queries,
//! error statuses and handle ownership across the whole path.

use kext_manager::{
    BrokerOptions, KextManager, KextSpec, QueryError, SimulatedBroker, Status,
    KEY_BUNDLE_IDENTIFIER, KEY_BUNDLE_VERSION, KEY_STARTED,
};
use kext_object::{
    convert, ArrayHandle, InProcRuntime, PropertyValue, StringHandle,
};
use std::sync::Arc;

fn spec(identifier: &str, deps: &[&str]) -> KextSpec {
    KextSpec {
        identifier: identifier.to_string(),
        version: "3.2.1".to_string(),
        bundle_path: format!("/Library/Extensions/{identifier}.kext"),
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
        signed: true,
    }
}

fn manager_with<'rt>(
    rt: &'rt InProcRuntime,
    specs: Vec<KextSpec>,
) -> (KextManager<'rt>, Arc<SimulatedBroker>) {
    let broker = Arc::new(SimulatedBroker::with_options(BrokerOptions {
        available: specs,
    }));
    (KextManager::new(rt, broker.clone()), broker)
}

#[test]
fn test_load_missing_extension_returns_not_found() {
    let rt = InProcRuntime::new();
    let (manager, _) = manager_with(&rt, vec![]);

    let id = StringHandle::new(&rt, "com.example.missing").unwrap();
    let deps = ArrayHandle::new(&rt, &[]).unwrap();
    let status = manager.load_extension(&id, &deps).unwrap();
    assert_eq!(status, Status::NotFound);
}

#[test]
fn test_load_then_unload_then_query_is_empty() {
    let rt = InProcRuntime::new();
    let (manager, _) = manager_with(&rt, vec![spec("com.example.fs", &[])]);

    let id = StringHandle::new(&rt, "com.example.fs").unwrap();
    let deps = ArrayHandle::new(&rt, &[]).unwrap();

    assert_eq!(manager.load_extension(&id, &deps).unwrap(), Status::Success);

    // Loaded state is observable
    let filter = ArrayHandle::new(&rt, &[id.as_object()]).unwrap();
    let dict = manager.query_loaded_info(Some(&filter), None).unwrap();
    assert_eq!(dict.len().unwrap(), 1);
    drop(dict);

    assert_eq!(manager.unload_extension(&id).unwrap(), Status::Success);

    // A fresh query returns an empty mapping for the identifier
    let dict = manager.query_loaded_info(Some(&filter), None).unwrap();
    assert!(dict.is_empty().unwrap());
}

#[test]
fn test_unload_before_load_is_not_loaded() {
    let rt = InProcRuntime::new();
    let (manager, _) = manager_with(&rt, vec![spec("com.example.fs", &[])]);

    let id = StringHandle::new(&rt, "com.example.fs").unwrap();
    assert_eq!(manager.unload_extension(&id).unwrap(), Status::NotLoaded);
}

#[test]
fn test_unload_with_dependents_is_busy() {
    let rt = InProcRuntime::new();
    let (manager, _) = manager_with(
        &rt,
        vec![
            spec("com.example.core", &[]),
            spec("com.example.fs", &["com.example.core"]),
        ],
    );

    assert_eq!(
        manager.load_by_identifier("com.example.fs", &[]).unwrap(),
        Status::Success
    );
    assert_eq!(
        manager.unload_by_identifier("com.example.core").unwrap(),
        Status::Busy
    );
    assert_eq!(
        manager.unload_by_identifier("com.example.fs").unwrap(),
        Status::Success
    );
    assert_eq!(
        manager.unload_by_identifier("com.example.core").unwrap(),
        Status::Success
    );
}

#[test]
fn test_query_returns_owned_dictionary_of_records() {
    let rt = InProcRuntime::new();
    let (manager, _) = manager_with(&rt, vec![spec("com.example.fs", &[])]);
    manager.load_by_identifier("com.example.fs", &[]).unwrap();

    let dict = manager.query_loaded_info(None, None).unwrap();
    let record = dict.get("com.example.fs").unwrap().expect("record present");
    let record = convert(&record).unwrap();
    let record = record.as_map().expect("record is a map");

    assert_eq!(
        record[KEY_BUNDLE_IDENTIFIER].as_text(),
        Some("com.example.fs")
    );
    assert_eq!(record[KEY_BUNDLE_VERSION].as_text(), Some("3.2.1"));
    assert_eq!(record[KEY_STARTED].as_bool(), Some(true));
}

#[test]
fn test_query_info_keys_restrict_records() {
    let rt = InProcRuntime::new();
    let (manager, _) = manager_with(&rt, vec![spec("com.example.fs", &[])]);
    manager.load_by_identifier("com.example.fs", &[]).unwrap();

    let version_key = StringHandle::new(&rt, KEY_BUNDLE_VERSION).unwrap();
    let keys = ArrayHandle::new(&rt, &[version_key.as_object()]).unwrap();
    let dict = manager.query_loaded_info(None, Some(&keys)).unwrap();

    let tree = convert(&dict.as_object().borrow()).unwrap();
    let records = tree.as_map().expect("mapping");
    let record = records["com.example.fs"].as_map().expect("record map");
    assert_eq!(record.len(), 1);
    assert_eq!(record[KEY_BUNDLE_VERSION].as_text(), Some("3.2.1"));
}

#[test]
fn test_offline_broker_surfaces_statuses() {
    let rt = InProcRuntime::new();
    let (manager, broker) = manager_with(&rt, vec![spec("com.example.fs", &[])]);
    broker.set_offline(true);

    assert_eq!(
        manager.load_by_identifier("com.example.fs", &[]).unwrap(),
        Status::CommunicationFailure
    );
    assert_eq!(
        manager.query_loaded_info(None, None).unwrap_err(),
        QueryError::Broker(Status::CommunicationFailure)
    );
}

#[test]
fn test_info_convenience_round_trip() {
    let rt = InProcRuntime::new();
    let (manager, _) = manager_with(&rt, vec![spec("com.example.fs", &[])]);

    assert_eq!(manager.info("com.example.fs").unwrap(), None);

    manager.load_by_identifier("com.example.fs", &[]).unwrap();
    let info = manager
        .info("com.example.fs")
        .unwrap()
        .expect("loaded extension has a record");
    match info {
        PropertyValue::Map(record) => {
            assert_eq!(
                record[KEY_BUNDLE_IDENTIFIER].as_text(),
                Some("com.example.fs")
            );
        }
        other => panic!("expected a record map, got {other:?}"),
    }
}

#[test]
fn test_no_handles_leak_across_the_full_path() {
    let rt = InProcRuntime::new();
    let (manager, _) = manager_with(&rt, vec![spec("com.example.fs", &[])]);

    manager.load_by_identifier("com.example.fs", &[]).unwrap();
    {
        let dict = manager.query_loaded_info(None, None).unwrap();
        assert_eq!(dict.len().unwrap(), 1);
    }
    manager.unload_by_identifier("com.example.fs").unwrap();

    // Every handle created along the way has been released
    assert_eq!(rt.live_objects(), 0);
}

#[test]
fn test_reload_after_unload_succeeds() {
    let rt = InProcRuntime::new();
    let (manager, _) = manager_with(&rt, vec![spec("com.example.fs", &[])]);

    assert_eq!(
        manager.load_by_identifier("com.example.fs", &[]).unwrap(),
        Status::Success
    );
    assert_eq!(
        manager.load_by_identifier("com.example.fs", &[]).unwrap(),
        Status::AlreadyLoaded
    );
    assert_eq!(
        manager.unload_by_identifier("com.example.fs").unwrap(),
        Status::Success
    );
    assert_eq!(
        manager.load_by_identifier("com.example.fs", &[]).unwrap(),
        Status::Success
    );
}
