//! Redis state backend for Tollgate.
//!
//! This crate provides a Redis-backed implementation of the [`StateStore`]
//! trait from `tollgate-state`, so that every server instance shares one set
//! of token buckets and tenant records.
//!
//! # Layout
//!
//! - **Plain values** are Redis strings at `prefix:kind:id`.
//! - **Field records** are Redis hashes at the same key shape, with a
//!   reserved `__ver` field holding the record version. Writes go through
//!   Lua scripts so the version bump, the field update, and the TTL refresh
//!   land atomically.
//! - **Versions** of newly created records come from `INCR` on
//!   `prefix:__versions`, which also tracks the highest version issued, so a
//!   deleted or expired record never comes back with an old version. The
//!   scripts touch that key alongside the record, so all keys under one
//!   prefix must live on a single Redis node.
//! - **Connection pooling** uses `deadpool-redis`.
//!
//! # Example
//!
//! ```ignore
//! use tollgate_state_redis::{RedisConfig, RedisStateStore};
//!
//! let config = RedisConfig::new("redis://localhost:6379");
//! let store = RedisStateStore::new(&config)?;
//! ```
//!
//! [`StateStore`]: tollgate_state::StateStore

mod config;
mod key_render;
mod scripts;
mod store;

pub use config::RedisConfig;
pub use store::RedisStateStore;
