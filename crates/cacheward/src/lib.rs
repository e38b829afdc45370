//! Cache-aside layer over Redis (or an in-memory LRU).
//!
//! [`aside::CacheAside`] serves reads through the cache with stampede locks
//! and post-invalidation cooldowns, [`invalidation::InvalidationService`]
//! removes entries after mutations, and [`observability::HealthMonitor`]
//! reports on the store. The binary exposes the admin endpoints in [`app`].

pub mod app;
pub mod aside;
pub mod config;
pub mod handlers;
pub mod invalidation;
pub mod lock;
pub mod middleware;
pub mod notify;
pub mod observability;
pub mod state;
pub mod store;

pub use aside::{CacheAside, CacheOutcome, Cached};
pub use config::Config;
pub use invalidation::InvalidationService;
pub use state::AppState;
pub use store::Store;
