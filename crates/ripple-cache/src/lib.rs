//! Persistent snapshot cache and cross-view invalidation.
//!
//! Two cache layers back the interaction engine: [`PersistentCache`] holds
//! TTL-bounded JSON snapshots on disk, surviving restarts as a read-through
//! layer under the remote service, and [`CollectionCache`] holds the
//! in-memory collection pages every mounted view renders from.
//! [`CacheInvalidator`] is the only write path that patches interaction
//! fields across collection pages; it matches items structurally by id so
//! new collection views participate without registration.

mod collections;
mod error;
mod invalidator;
mod persistent;

pub use collections::{CacheUpdate, CollectionCache};
pub use error::CacheError;
pub use invalidator::{CacheInvalidator, InteractionPatch, PatchTarget};
pub use persistent::{CachedBlob, PersistentCache};
