//! Redis store backend.
//!
//! Connections come from a bounded `deadpool-redis` pool; every checkout and
//! command is subject to the configured timeout.

mod backend;
mod error;

pub use backend::RedisBackend;
