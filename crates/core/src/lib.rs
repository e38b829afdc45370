//! Pure core of the cacheward cache layer.
//!
//! Everything in this crate is free of I/O: key construction, glob matching,
//! value validation, invalidation plans, counters and the health/alert rules.
//! The `cacheward` crate wires these into a live store.

pub mod cache;
pub mod invalidation;
pub mod observability;
pub mod validation;
