use std::sync::Arc;

use tollgate_state::StateStore;
use tollgate_state_memory::MemoryStateStore;
#[cfg(feature = "redis")]
use tollgate_state_redis::{RedisConfig, RedisStateStore};

use crate::config::StateConfig;
use crate::error::ServerError;

/// Construct the shared `StateStore` from configuration.
pub fn create_state(config: &StateConfig) -> Result<Arc<dyn StateStore>, ServerError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryStateStore::new())),
        #[cfg(feature = "redis")]
        "redis" => create_redis(config),
        other => Err(ServerError::Config(format!(
            "unsupported state backend: {other} (is the feature enabled?)"
        ))),
    }
}

#[cfg(feature = "redis")]
fn create_redis(config: &StateConfig) -> Result<Arc<dyn StateStore>, ServerError> {
    let defaults = RedisConfig::default();
    let redis_config = RedisConfig {
        url: config.url.clone().unwrap_or(defaults.url),
        prefix: config.prefix.clone().unwrap_or(defaults.prefix),
        pool_size: config.pool_size.unwrap_or(defaults.pool_size),
        connection_timeout: defaults.connection_timeout,
    };
    let store = RedisStateStore::new(&redis_config)
        .map_err(|e| ServerError::Config(format!("redis store: {e}")))?;
    Ok(Arc::new(store))
}
