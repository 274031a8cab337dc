use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::{AsyncCommands, Script};
use tracing::debug;

use tollgate_state::error::StateError;
use tollgate_state::key::{KeyKind, StateKey};
use tollgate_state::store::{CasResult, FieldSet, Fields, StateStore};

use crate::config::RedisConfig;
use crate::key_render::{render_key, scan_pattern, strip_to_id, version_key};
use crate::scripts;

/// Redis-backed implementation of [`StateStore`].
///
/// Uses a `deadpool-redis` connection pool and Lua scripts for atomicity.
/// Plain values are Redis strings; field records are Redis hashes whose
/// `__ver` field carries the record version.
pub struct RedisStateStore {
    pool: Pool,
    prefix: String,
    version_key: String,
    check_and_set: Script,
    set_fields: Script,
    cas_fields: Script,
}

fn backend(e: &redis::RedisError) -> StateError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
        StateError::Connection(e.to_string())
    } else {
        StateError::Backend(e.to_string())
    }
}

fn ttl_millis(ttl: Option<Duration>) -> i64 {
    ttl.map_or(0i64, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

fn parse_version(raw: &str) -> Result<u64, StateError> {
    raw.parse()
        .map_err(|e| StateError::Serialization(format!("record version is not an integer: {e}")))
}

impl RedisStateStore {
    /// Create a new `RedisStateStore` from the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Connection`] if the pool cannot be created.
    pub fn new(config: &RedisConfig) -> Result<Self, StateError> {
        let cfg = Config::from_url(&config.url);
        let pool = cfg
            .builder()
            .map(|b| {
                b.max_size(config.pool_size)
                    .wait_timeout(Some(config.connection_timeout))
                    .runtime(Runtime::Tokio1)
                    .build()
            })
            .map_err(|e| StateError::Connection(e.to_string()))?
            .map_err(|e| StateError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            prefix: config.prefix.clone(),
            version_key: version_key(&config.prefix),
            check_and_set: Script::new(scripts::CHECK_AND_SET),
            set_fields: Script::new(scripts::SET_FIELDS),
            cas_fields: Script::new(scripts::CAS_FIELDS),
        })
    }

    fn redis_key(&self, key: &StateKey) -> String {
        render_key(&self.prefix, key)
    }

    /// Obtain a connection from the pool.
    async fn conn(&self) -> Result<deadpool_redis::Connection, StateError> {
        self.pool
            .get()
            .await
            .map_err(|e| StateError::Connection(e.to_string()))
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StateError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.conn().await?;
        let result: i64 = self
            .check_and_set
            .key(&redis_key)
            .arg(value)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| backend(&e))?;

        Ok(result == 1)
    }

    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.conn().await?;
        conn.get(&redis_key).await.map_err(|e| backend(&e))
    }

    async fn set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StateError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.conn().await?;

        match ttl {
            Some(d) => {
                let ms = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
                let () = conn
                    .pset_ex(&redis_key, value, ms)
                    .await
                    .map_err(|e| backend(&e))?;
            }
            None => {
                let () = conn.set(&redis_key, value).await.map_err(|e| backend(&e))?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &StateKey) -> Result<bool, StateError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.conn().await?;
        let deleted: i64 = conn.del(&redis_key).await.map_err(|e| backend(&e))?;
        Ok(deleted > 0)
    }

    async fn get_fields(&self, key: &StateKey) -> Result<Option<FieldSet>, StateError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.conn().await?;
        let mut fields: HashMap<String, String> =
            conn.hgetall(&redis_key).await.map_err(|e| backend(&e))?;

        // HGETALL on a missing key yields an empty map.
        if fields.is_empty() {
            return Ok(None);
        }
        let version = match fields.remove(scripts::VERSION_FIELD) {
            Some(raw) => parse_version(&raw)?,
            None => 0,
        };
        Ok(Some(FieldSet { fields, version }))
    }

    async fn set_fields(
        &self,
        key: &StateKey,
        fields: &Fields,
        ttl: Option<Duration>,
    ) -> Result<u64, StateError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.conn().await?;

        let mut invocation = self.set_fields.prepare_invoke();
        invocation
            .key(&redis_key)
            .key(&self.version_key)
            .arg(ttl_millis(ttl));
        for (name, value) in fields {
            invocation.arg(name).arg(value);
        }
        let version: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| backend(&e))?;

        Ok(u64::try_from(version).unwrap_or(0))
    }

    async fn compare_and_set_fields(
        &self,
        key: &StateKey,
        expected_version: u64,
        fields: &Fields,
        ttl: Option<Duration>,
    ) -> Result<CasResult, StateError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.conn().await?;

        let mut invocation = self.cas_fields.prepare_invoke();
        invocation
            .key(&redis_key)
            .key(&self.version_key)
            .arg(expected_version)
            .arg(ttl_millis(ttl));
        for (name, value) in fields {
            invocation.arg(name).arg(value);
        }
        let (status, version): (i64, i64) = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| backend(&e))?;

        let version = u64::try_from(version).unwrap_or(0);
        if status == 1 {
            Ok(CasResult::Ok { version })
        } else {
            debug!(key = %redis_key, expected_version, current_version = version, "field CAS conflict");
            Ok(CasResult::Conflict {
                current_version: version,
            })
        }
    }

    async fn scan_keys(
        &self,
        kind: KeyKind,
        prefix: Option<&str>,
    ) -> Result<Vec<String>, StateError> {
        let pattern = scan_pattern(&self.prefix, &kind, prefix);

        let mut conn = self.conn().await?;
        // SCAN may return a key more than once.
        let mut ids = BTreeSet::new();
        let mut cursor = 0u64;

        loop {
            let (new_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| backend(&e))?;

            ids.extend(
                keys.iter()
                    .filter_map(|key| strip_to_id(&self.prefix, &kind, key))
                    .map(str::to_owned),
            );

            cursor = new_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(ids.into_iter().collect())
    }

    async fn health_check(&self) -> Result<(), StateError> {
        let mut conn = self.conn().await?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| backend(&e))?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(StateError::Backend(format!("unexpected PING reply: {pong}")))
        }
    }
}
