//! # sp-replay-redis
//!
//! Redis-backed [`ReplayStore`](sp_saml::replay::ReplayStore) for SAML2
//! service providers running on more than one instance.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sp_replay_redis::{RedisReplayConfig, RedisReplayStore};
//!
//! let store = RedisReplayStore::new(RedisReplayConfig::from_env()?).await?;
//! let options = options.with_replay_store(Arc::new(store));
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod store;

pub use config::RedisReplayConfig;
pub use store::RedisReplayStore;
