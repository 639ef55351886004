//! Perception - what the page looks like to the agent
//!
//! The indexer assigns handles; the snapshotter bounds and packages them.

pub mod indexer;
pub mod snapshot;

pub use indexer::{ElementIndexer, Fingerprint, IndexedElement};
pub use snapshot::{Snapshot, Snapshotter, Truncation};
