//! In-process caching for upstream lookups
//!
//! `TtlCache` is an explicitly constructed key→value store with absolute expiry
//! timestamps. Expired entries are evicted lazily on read, and a `Sweeper` task can
//! remove them proactively to bound memory. The geo and weather services share one
//! cache instance, passed in as an `Arc`.

mod sweeper;
mod ttl;

pub use sweeper::{Sweeper, DEFAULT_SWEEP_INTERVAL};
pub use ttl::TtlCache;
