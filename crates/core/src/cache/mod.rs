mod error;
mod keys;
mod patterns;
mod request;
mod resource;
pub mod serialization;
mod traits;

pub use error::{CacheError, Result};
pub use keys::{
    is_internal_segment, is_lock_key, lock_key, params_hash, KeyBuilder, DEFAULT_NAMESPACE,
    LOCK_SUFFIX, PARAM_HASH_WIDTH,
};
pub use patterns::{has_char_class, has_wildcards, pattern_matches};
pub use request::{CacheRequest, DEFAULT_TTL};
pub use resource::ResourceType;
pub use traits::{KeyTtl, MemoryUsage, StoreBackend};
