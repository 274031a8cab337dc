use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StateError;
use crate::key::{KeyKind, StateKey};

/// Field name to value mapping of a field record.
pub type Fields = HashMap<String, String>;

/// A field record together with its version.
///
/// The version is at least 1 for a live record and increases by one on
/// every write. Versions are never reused for a key, even across a delete or
/// an expiry. It is never exposed as one of the fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSet {
    pub fields: Fields,
    pub version: u64,
}

/// Result of a compare-and-set on a field record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasResult {
    /// The write succeeded; the record now has `version`.
    Ok { version: u64 },
    /// The record's version didn't match. `current_version` is 0 when the
    /// record does not exist.
    Conflict { current_version: u64 },
}

/// Shared key-value store used for buckets and tenant records.
///
/// Implementations must be `Send + Sync` and safe for concurrent access.
/// Values are either plain strings or field records (string-to-string maps
/// with a version); reading one kind through the other's accessor is a
/// [`StateError::WrongType`].
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Check if a key exists; if not, set it atomically with an optional TTL.
    /// Returns `true` if the key was newly set, `false` if it already existed.
    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StateError>;

    /// Get the value for a key. Returns `None` if not found or expired.
    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError>;

    /// Set a value with an optional TTL, overwriting any previous value.
    async fn set(&self, key: &StateKey, value: &str, ttl: Option<Duration>)
    -> Result<(), StateError>;

    /// Delete a key of either type. Returns `true` if the key existed.
    async fn delete(&self, key: &StateKey) -> Result<bool, StateError>;

    /// Read a field record. Returns `None` if not found or expired.
    async fn get_fields(&self, key: &StateKey) -> Result<Option<FieldSet>, StateError>;

    /// Write `fields` into the record at `key`, creating it if needed.
    ///
    /// Existing fields not named in `fields` are kept. The TTL is reset to
    /// `ttl` (or cleared when `None`). Returns the record's new version.
    ///
    /// A record created after its key was deleted or expired starts above
    /// every version the key held before, so a stale version never matches
    /// the new record in [`compare_and_set_fields`](Self::compare_and_set_fields).
    async fn set_fields(
        &self,
        key: &StateKey,
        fields: &Fields,
        ttl: Option<Duration>,
    ) -> Result<u64, StateError>;

    /// Write `fields` only if the record is currently at `expected_version`.
    ///
    /// An `expected_version` of 0 means "only if absent". The check and the
    /// write happen atomically with respect to other writers of `key`.
    async fn compare_and_set_fields(
        &self,
        key: &StateKey,
        expected_version: u64,
        fields: &Fields,
        ttl: Option<Duration>,
    ) -> Result<CasResult, StateError>;

    /// List the ids of live keys of `kind` whose id starts with `prefix`.
    ///
    /// This may walk the whole keyspace on some backends. Use sparingly.
    async fn scan_keys(
        &self,
        kind: KeyKind,
        prefix: Option<&str>,
    ) -> Result<Vec<String>, StateError>;

    /// Verify the backend is reachable.
    async fn health_check(&self) -> Result<(), StateError> {
        Ok(())
    }
}
