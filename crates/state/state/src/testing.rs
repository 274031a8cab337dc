use std::time::Duration;

use crate::error::StateError;
use crate::key::{KeyKind, StateKey};
use crate::store::{CasResult, Fields, StateStore};

fn test_key(id: &str) -> StateKey {
    StateKey::new(KeyKind::Custom("conformance".into()), id)
}

fn fields(pairs: &[(&str, &str)]) -> Fields {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

/// Run the full state store conformance test suite.
///
/// Call this from your backend's test module with a fresh store instance.
///
/// # Errors
///
/// Returns an error if the backend fails an operation. Behavioral mismatches
/// panic.
pub async fn run_store_conformance_tests(store: &dyn StateStore) -> Result<(), StateError> {
    test_get_missing(store).await?;
    test_set_and_get(store).await?;
    test_check_and_set_new(store).await?;
    test_check_and_set_existing(store).await?;
    test_delete(store).await?;
    test_set_fields_versions(store).await?;
    test_set_fields_merges(store).await?;
    test_cas_create_if_absent(store).await?;
    test_cas_conflict_and_success(store).await?;
    test_recreated_record_gets_fresh_version(store).await?;
    test_scan_keys(store).await?;
    test_ttl_set(store).await?;
    test_health_check(store).await?;
    Ok(())
}

async fn test_get_missing(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key("missing");
    let val = store.get(&key).await?;
    assert!(val.is_none(), "get on missing key should return None");
    let record = store.get_fields(&key).await?;
    assert!(record.is_none(), "get_fields on missing key should return None");
    Ok(())
}

async fn test_set_and_get(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key("set-get");
    store.set(&key, "hello", None).await?;
    let val = store.get(&key).await?;
    assert_eq!(val.as_deref(), Some("hello"));
    Ok(())
}

async fn test_check_and_set_new(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key("cas-new");
    store.delete(&key).await?;
    let created = store.check_and_set(&key, "v1", None).await?;
    assert!(created, "check_and_set on new key should return true");
    let val = store.get(&key).await?;
    assert_eq!(val.as_deref(), Some("v1"));
    Ok(())
}

async fn test_check_and_set_existing(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key("cas-existing");
    store.set(&key, "v1", None).await?;
    let created = store.check_and_set(&key, "v2", None).await?;
    assert!(!created, "check_and_set on existing key should return false");
    let val = store.get(&key).await?;
    assert_eq!(val.as_deref(), Some("v1"), "original value should remain");
    Ok(())
}

async fn test_delete(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key("to-delete");
    store.set(&key, "bye", None).await?;
    let existed = store.delete(&key).await?;
    assert!(existed, "delete should return true for existing key");
    let val = store.get(&key).await?;
    assert!(val.is_none(), "get after delete should return None");

    let existed = store.delete(&key).await?;
    assert!(!existed, "delete on missing key should return false");

    let record = test_key("to-delete-fields");
    store.set_fields(&record, &fields(&[("a", "1")]), None).await?;
    assert!(store.delete(&record).await?, "delete should remove field records");
    assert!(store.get_fields(&record).await?.is_none());
    Ok(())
}

async fn test_set_fields_versions(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key("fields-version");
    store.delete(&key).await?;

    let v1 = store
        .set_fields(&key, &fields(&[("tokens", "10"), ("tier", "free")]), None)
        .await?;
    assert!(v1 >= 1, "a live record never has version 0");

    let v2 = store.set_fields(&key, &fields(&[("tokens", "9")]), None).await?;
    assert_eq!(v2, v1 + 1, "each write should bump the version");

    let record = store.get_fields(&key).await?.expect("record should exist");
    assert_eq!(record.version, v2);
    assert_eq!(record.fields.get("tokens").map(String::as_str), Some("9"));
    assert_eq!(record.fields.len(), 2, "version must not appear as a field");
    Ok(())
}

async fn test_set_fields_merges(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key("fields-merge");
    store.delete(&key).await?;
    store.set_fields(&key, &fields(&[("a", "1"), ("b", "2")]), None).await?;
    store.set_fields(&key, &fields(&[("b", "3")]), None).await?;

    let record = store.get_fields(&key).await?.expect("record should exist");
    assert_eq!(record.fields.get("a").map(String::as_str), Some("1"));
    assert_eq!(record.fields.get("b").map(String::as_str), Some("3"));
    Ok(())
}

async fn test_cas_create_if_absent(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key("cas-create");
    store.delete(&key).await?;

    let result = store
        .compare_and_set_fields(&key, 0, &fields(&[("x", "1")]), None)
        .await?;
    let CasResult::Ok { version } = result else {
        panic!("create-if-absent on a missing record should succeed, got {result:?}");
    };
    assert!(version >= 1);

    let result = store
        .compare_and_set_fields(&key, 0, &fields(&[("x", "2")]), None)
        .await?;
    assert_eq!(
        result,
        CasResult::Conflict {
            current_version: version
        },
        "create-if-absent on an existing record should conflict"
    );
    Ok(())
}

async fn test_cas_conflict_and_success(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key("cas-version");
    store.delete(&key).await?;
    let version = store.set_fields(&key, &fields(&[("x", "initial")]), None).await?;

    let result = store
        .compare_and_set_fields(&key, version + 10, &fields(&[("x", "stale")]), None)
        .await?;
    assert_eq!(
        result,
        CasResult::Conflict {
            current_version: version
        },
        "CAS with wrong version should conflict"
    );

    let result = store
        .compare_and_set_fields(&key, version, &fields(&[("x", "updated")]), None)
        .await?;
    assert_eq!(
        result,
        CasResult::Ok {
            version: version + 1
        },
        "CAS with correct version should succeed"
    );

    let record = store.get_fields(&key).await?.expect("record should exist");
    assert_eq!(record.fields.get("x").map(String::as_str), Some("updated"));

    let missing = test_key("cas-missing");
    store.delete(&missing).await?;
    let result = store
        .compare_and_set_fields(&missing, 3, &fields(&[("x", "1")]), None)
        .await?;
    assert_eq!(result, CasResult::Conflict { current_version: 0 });
    Ok(())
}

async fn test_recreated_record_gets_fresh_version(
    store: &dyn StateStore,
) -> Result<(), StateError> {
    let key = test_key("recreate-version");
    store.delete(&key).await?;
    store.set_fields(&key, &fields(&[("x", "1")]), None).await?;
    let old = store.set_fields(&key, &fields(&[("x", "2")]), None).await?;

    store.delete(&key).await?;
    let recreated = store.set_fields(&key, &fields(&[("x", "3")]), None).await?;
    assert!(
        recreated > old,
        "a recreated record must not reuse a version ({recreated} <= {old})"
    );

    let result = store
        .compare_and_set_fields(&key, old, &fields(&[("x", "stale")]), None)
        .await?;
    assert_eq!(
        result,
        CasResult::Conflict {
            current_version: recreated
        },
        "CAS against the deleted record's version must conflict"
    );
    Ok(())
}

async fn test_scan_keys(store: &dyn StateStore) -> Result<(), StateError> {
    let kind = KeyKind::Custom("conformance_scan".into());
    for id in store.scan_keys(kind.clone(), None).await? {
        store.delete(&StateKey::new(kind.clone(), id)).await?;
    }

    store
        .set(&StateKey::new(kind.clone(), "alpha-1"), "a", None)
        .await?;
    store
        .set_fields(&StateKey::new(kind.clone(), "alpha-2"), &fields(&[("f", "v")]), None)
        .await?;
    store
        .set(&StateKey::new(kind.clone(), "beta-1"), "b", None)
        .await?;

    let mut all = store.scan_keys(kind.clone(), None).await?;
    all.sort();
    assert_eq!(all, vec!["alpha-1", "alpha-2", "beta-1"]);

    let mut alpha = store.scan_keys(kind.clone(), Some("alpha")).await?;
    alpha.sort();
    assert_eq!(alpha, vec!["alpha-1", "alpha-2"]);

    let none = store
        .scan_keys(KeyKind::Custom("conformance_empty".into()), None)
        .await?;
    assert!(none.is_empty());
    Ok(())
}

async fn test_ttl_set(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key("ttl-test");
    store
        .set(&key, "ephemeral", Some(Duration::from_secs(3600)))
        .await?;
    let val = store.get(&key).await?;
    assert_eq!(val.as_deref(), Some("ephemeral"));

    let record = test_key("ttl-fields");
    store
        .set_fields(&record, &fields(&[("a", "1")]), Some(Duration::from_secs(3600)))
        .await?;
    assert!(store.get_fields(&record).await?.is_some());
    Ok(())
}

async fn test_health_check(store: &dyn StateStore) -> Result<(), StateError> {
    store.health_check().await
}
