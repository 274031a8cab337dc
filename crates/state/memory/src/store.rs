use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use tokio::time::Instant;

use tollgate_state::error::StateError;
use tollgate_state::key::{KeyKind, StateKey};
use tollgate_state::store::{CasResult, FieldSet, Fields, StateStore};

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Fields(Fields),
}

/// A single entry in the in-memory store.
#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    version: u64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value, ttl: Option<Duration>) -> Self {
        Self {
            value,
            version: 1,
            expires_at: expiry_from_ttl(ttl),
        }
    }

    /// Returns `true` if this entry has passed its TTL deadline.
    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Compute the expiry instant from an optional TTL duration.
fn expiry_from_ttl(ttl: Option<Duration>) -> Option<Instant> {
    ttl.map(|d| Instant::now() + d)
}

fn wrong_type(rendered: &str) -> StateError {
    StateError::WrongType(rendered.to_owned())
}

/// In-memory [`StateStore`] backed by a [`DashMap`].
///
/// Entries are lazily evicted on access when their TTL has elapsed. Every
/// write goes through the map's entry API, so each operation is atomic per
/// key. This implementation is fully synchronous internally; the async trait
/// methods return immediately.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    data: DashMap<String, Entry>,
    /// Highest field-record version issued for any key.
    high_water: AtomicU64,
}

impl MemoryStateStore {
    /// Create a new, empty in-memory state store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Version for a newly created field record, above every version issued
    /// so far, including those of deleted or expired records.
    fn seed_version(&self) -> u64 {
        self.high_water.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Next version for an existing field record.
    fn bump_version(&self, current: u64) -> u64 {
        let next = current + 1;
        self.high_water.fetch_max(next, Ordering::SeqCst);
        next
    }

    /// Render a [`StateKey`] into the string used as the map key.
    fn render_key(key: &StateKey) -> String {
        key.canonical()
    }

    /// Clone out the live entry at `rendered`, evicting it if expired.
    fn live(&self, rendered: &str) -> Option<Entry> {
        let entry = self.data.get(rendered)?;
        if entry.is_expired() {
            drop(entry);
            self.data.remove_if(rendered, |_, entry| entry.is_expired());
            return None;
        }
        Some(entry.clone())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StateError> {
        let fresh = Entry::new(Value::Text(value.to_owned()), ttl);
        match self.data.entry(Self::render_key(key)) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(fresh);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError> {
        let rendered = Self::render_key(key);
        match self.live(&rendered).map(|entry| entry.value) {
            None => Ok(None),
            Some(Value::Text(value)) => Ok(Some(value)),
            Some(Value::Fields(_)) => Err(wrong_type(&rendered)),
        }
    }

    async fn set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StateError> {
        let expires_at = expiry_from_ttl(ttl);

        self.data
            .entry(Self::render_key(key))
            .and_modify(|entry| {
                entry.version = if entry.is_expired() { 1 } else { entry.version + 1 };
                entry.value = Value::Text(value.to_owned());
                entry.expires_at = expires_at;
            })
            .or_insert_with(|| Entry {
                value: Value::Text(value.to_owned()),
                version: 1,
                expires_at,
            });

        Ok(())
    }

    async fn delete(&self, key: &StateKey) -> Result<bool, StateError> {
        // Expired entries count as "not found".
        match self.data.remove(&Self::render_key(key)) {
            Some((_, entry)) => Ok(!entry.is_expired()),
            None => Ok(false),
        }
    }

    async fn get_fields(&self, key: &StateKey) -> Result<Option<FieldSet>, StateError> {
        let rendered = Self::render_key(key);
        match self.live(&rendered) {
            None => Ok(None),
            Some(Entry {
                value: Value::Fields(fields),
                version,
                ..
            }) => Ok(Some(FieldSet { fields, version })),
            Some(_) => Err(wrong_type(&rendered)),
        }
    }

    async fn set_fields(
        &self,
        key: &StateKey,
        fields: &Fields,
        ttl: Option<Duration>,
    ) -> Result<u64, StateError> {
        let rendered = Self::render_key(key);
        let fresh = Entry::new(Value::Fields(fields.clone()), ttl);

        match self.data.entry(rendered) {
            MapEntry::Occupied(mut occupied) if !occupied.get().is_expired() => {
                if !matches!(occupied.get().value, Value::Fields(_)) {
                    return Err(wrong_type(occupied.key()));
                }
                let entry = occupied.get_mut();
                if let Value::Fields(existing) = &mut entry.value {
                    existing.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                entry.version = self.bump_version(entry.version);
                entry.expires_at = fresh.expires_at;
                Ok(entry.version)
            }
            MapEntry::Occupied(mut occupied) => {
                let version = self.seed_version();
                occupied.insert(Entry { version, ..fresh });
                Ok(version)
            }
            MapEntry::Vacant(vacant) => {
                let version = self.seed_version();
                vacant.insert(Entry { version, ..fresh });
                Ok(version)
            }
        }
    }

    async fn compare_and_set_fields(
        &self,
        key: &StateKey,
        expected_version: u64,
        fields: &Fields,
        ttl: Option<Duration>,
    ) -> Result<CasResult, StateError> {
        let rendered = Self::render_key(key);
        let fresh = Entry::new(Value::Fields(fields.clone()), ttl);

        match self.data.entry(rendered) {
            MapEntry::Occupied(mut occupied) if !occupied.get().is_expired() => {
                let current_version = occupied.get().version;
                if current_version != expected_version {
                    return Ok(CasResult::Conflict { current_version });
                }
                if !matches!(occupied.get().value, Value::Fields(_)) {
                    return Err(wrong_type(occupied.key()));
                }
                let entry = occupied.get_mut();
                if let Value::Fields(existing) = &mut entry.value {
                    existing.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                entry.version = self.bump_version(entry.version);
                entry.expires_at = fresh.expires_at;
                Ok(CasResult::Ok {
                    version: entry.version,
                })
            }
            MapEntry::Occupied(mut occupied) => {
                if expected_version != 0 {
                    return Ok(CasResult::Conflict { current_version: 0 });
                }
                let version = self.seed_version();
                occupied.insert(Entry { version, ..fresh });
                Ok(CasResult::Ok { version })
            }
            MapEntry::Vacant(vacant) => {
                if expected_version != 0 {
                    return Ok(CasResult::Conflict { current_version: 0 });
                }
                let version = self.seed_version();
                vacant.insert(Entry { version, ..fresh });
                Ok(CasResult::Ok { version })
            }
        }
    }

    async fn scan_keys(
        &self,
        kind: KeyKind,
        prefix: Option<&str>,
    ) -> Result<Vec<String>, StateError> {
        let kind_prefix = format!("{kind}:");
        let full_prefix = format!("{kind_prefix}{}", prefix.unwrap_or_default());

        Ok(self
            .data
            .iter()
            .filter(|item| item.key().starts_with(&full_prefix) && !item.value().is_expired())
            .map(|item| item.key()[kind_prefix.len()..].to_owned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tollgate_state::key::{KeyKind, StateKey};
    use tollgate_state::testing::run_store_conformance_tests;

    use super::*;

    fn test_key(id: &str) -> StateKey {
        StateKey::new(KeyKind::Custom("test".into()), id)
    }

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[tokio::test]
    async fn conformance() {
        let store = MemoryStateStore::new();
        run_store_conformance_tests(&store)
            .await
            .expect("conformance tests should pass");
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_expiry_via_get() {
        let store = MemoryStateStore::new();
        let key = test_key("ttl-expire");

        store
            .set(&key, "short-lived", Some(Duration::from_secs(5)))
            .await
            .unwrap();

        let val = store.get(&key).await.unwrap();
        assert_eq!(val.as_deref(), Some("short-lived"));

        tokio::time::advance(Duration::from_secs(6)).await;

        let val = store.get(&key).await.unwrap();
        assert!(val.is_none(), "value should be expired");
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_check_and_set_after_expiry() {
        let store = MemoryStateStore::new();
        let key = test_key("ttl-cas");

        let created = store
            .check_and_set(&key, "v1", Some(Duration::from_secs(3)))
            .await
            .unwrap();
        assert!(created);

        let created = store.check_and_set(&key, "v2", None).await.unwrap();
        assert!(!created);

        tokio::time::advance(Duration::from_secs(4)).await;

        let created = store.check_and_set(&key, "v2", None).await.unwrap();
        assert!(created, "should re-create after expiry");

        let val = store.get(&key).await.unwrap();
        assert_eq!(val.as_deref(), Some("v2"));
    }

    #[tokio::test(start_paused = true)]
    async fn set_fields_refreshes_ttl() {
        let store = MemoryStateStore::new();
        let key = StateKey::rate_limit("tenant_1");
        let ttl = Some(Duration::from_secs(10));

        store.set_fields(&key, &fields(&[("tokens", "10")]), ttl).await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        store.set_fields(&key, &fields(&[("tokens", "9")]), ttl).await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;

        let record = store.get_fields(&key).await.unwrap();
        assert!(record.is_some(), "second write should have extended the TTL");

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(store.get_fields(&key).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_record_is_absent_for_cas() {
        let store = MemoryStateStore::new();
        let key = StateKey::rate_limit("tenant_2");

        store
            .set_fields(&key, &fields(&[("tokens", "1")]), Some(Duration::from_secs(1)))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        let result = store
            .compare_and_set_fields(&key, 1, &fields(&[("tokens", "2")]), None)
            .await
            .unwrap();
        assert_eq!(result, CasResult::Conflict { current_version: 0 });

        let result = store
            .compare_and_set_fields(&key, 0, &fields(&[("tokens", "2")]), None)
            .await
            .unwrap();
        // The expired record held version 1; the new one starts above it.
        assert_eq!(result, CasResult::Ok { version: 2 });
    }

    #[tokio::test]
    async fn stale_version_cannot_win_after_delete() {
        let store = MemoryStateStore::new();
        let key = StateKey::rate_limit("tenant_3");

        let loaded = store
            .set_fields(&key, &fields(&[("tokens", "10")]), None)
            .await
            .unwrap();
        assert!(store.delete(&key).await.unwrap());

        let CasResult::Ok { version: fresh } = store
            .compare_and_set_fields(&key, 0, &fields(&[("tokens", "10")]), None)
            .await
            .unwrap()
        else {
            panic!("create-if-absent should succeed on a deleted key");
        };
        assert!(fresh > loaded);

        let result = store
            .compare_and_set_fields(&key, loaded, &fields(&[("tokens", "9")]), None)
            .await
            .unwrap();
        assert_eq!(result, CasResult::Conflict { current_version: fresh });
    }

    #[tokio::test]
    async fn versions_stay_per_key_while_records_live() {
        let store = MemoryStateStore::new();
        let a = StateKey::rate_limit("a");
        let b = StateKey::rate_limit("b");

        assert_eq!(store.set_fields(&a, &fields(&[("x", "1")]), None).await.unwrap(), 1);
        assert_eq!(store.set_fields(&a, &fields(&[("x", "2")]), None).await.unwrap(), 2);
        let first_b = store.set_fields(&b, &fields(&[("x", "1")]), None).await.unwrap();
        assert_eq!(first_b, 3);
        assert_eq!(store.set_fields(&a, &fields(&[("x", "3")]), None).await.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn scan_skips_expired_entries() {
        let store = MemoryStateStore::new();
        store
            .set(&StateKey::rate_limit("a"), "1", Some(Duration::from_secs(1)))
            .await
            .unwrap();
        store.set(&StateKey::rate_limit("b"), "1", None).await.unwrap();
        store
            .set(&StateKey::new(KeyKind::Tenant, "c"), "1", None)
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        let ids = store.scan_keys(KeyKind::RateLimit, None).await.unwrap();
        assert_eq!(ids, vec!["b".to_owned()]);
    }

    #[tokio::test]
    async fn reading_with_the_wrong_accessor_fails() {
        let store = MemoryStateStore::new();
        let text = test_key("text");
        let record = test_key("record");
        store.set(&text, "plain", None).await.unwrap();
        store.set_fields(&record, &fields(&[("a", "1")]), None).await.unwrap();

        assert!(matches!(
            store.get_fields(&text).await,
            Err(StateError::WrongType(_))
        ));
        assert!(matches!(store.get(&record).await, Err(StateError::WrongType(_))));
        assert!(matches!(
            store.set_fields(&text, &fields(&[("a", "1")]), None).await,
            Err(StateError::WrongType(_))
        ));
    }

    #[tokio::test]
    async fn delete_returns_false_for_missing() {
        let store = MemoryStateStore::new();
        let existed = store.delete(&test_key("never-set")).await.unwrap();
        assert!(!existed);
    }
}
