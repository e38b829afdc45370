//! JSON encoding of cached values.
//!
//! Values are stored as JSON so they stay human-readable in `redis-cli` and
//! can be validated structurally before they are trusted.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::{CacheError, Result};

/// Converts a computed result into a JSON value.
pub fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| CacheError::Serialization(e.to_string()))
}

/// Converts a JSON value back into a typed result.
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| CacheError::Serialization(e.to_string()))
}

/// Encodes a JSON value into bytes for the store.
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))
}

/// Decodes store bytes into a JSON value.
pub fn decode(bytes: &[u8]) -> Result<Value> {
    serde_json::from_slice(bytes).map_err(|e| CacheError::Serialization(e.to_string()))
}
