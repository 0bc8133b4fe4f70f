//! In-memory layer cache with lazy invalidation.
//!
//! The store keeps one [`CacheEntry`] per key: the parsed layer and the
//! revision of the row it was parsed from. Nothing expires on a timer and
//! nothing is pushed from the backing store. Instead every read of a cached
//! key compares revisions through the [`StalenessTracker`] and reparses only
//! when they differ.
//!
//! # Example
//!
//! ```ignore
//! let store = LayerStore::open(source, &StoreOptions::default()).await?;
//!
//! // First read fetches and parses the row
//! let roads = store.get(&LayerKey::from("roads")).await?;
//!
//! // Later reads cost one revision query
//! let read = store.read(&LayerKey::from("roads")).await?;
//! assert!(read.was_cache_hit());
//! ```

pub mod entry;
pub mod layer_store;
pub mod staleness;
pub mod stats;

pub use entry::{CacheEntry, LayerRead, ReadOutcome};
pub use layer_store::{LayerStore, WarmReport};
pub use staleness::{Staleness, StalenessTracker};
pub use stats::CacheStats;
