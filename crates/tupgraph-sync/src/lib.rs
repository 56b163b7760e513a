//! Graph maintenance engine for tupgraph.
//!
//! This crate keeps a [`NodeStore`] consistent with what the filesystem
//! says, and records the follow-up work each change implies.
//!
//! # Overview
//!
//! Everything runs through a [`FileTracker`] that owns the store:
//!
//! - **Path resolution** walks slash-separated paths, creating directory
//!   and ghost placeholders as the [`ResolveMode`] allows
//! - **Type transitions** promote ghosts, convert generated directories
//!   once real content appears under them, and apply kind-specific
//!   deletion policy
//! - **Change ingestion** turns observed create/modify/delete events into
//!   create-list, modify-list and config-list entries
//! - **Variant propagation** mirrors source directory removal into every
//!   out-of-tree variant's shadow tree
//!
//! # Example
//!
//! ```rust
//! use tupgraph_sync::{EntityId, FileTracker, MemoryStore, Mtime, TrackerConfig, WorkList};
//!
//! let mut tracker = FileTracker::new(MemoryStore::new(), TrackerConfig::new("/work/project"));
//! let seen = tracker
//!     .observe_change(EntityId::PROJECT_ROOT, "main.c", Mtime::new(100, 0), false, false)
//!     .unwrap();
//! assert!(seen.modified);
//! assert!(tracker.store().queued(WorkList::Create).contains(&EntityId::PROJECT_ROOT));
//! ```
//!
//! # Directory Removal Notifications
//!
//! Subscribe to ids of directories as they are structurally removed:
//!
//! ```rust
//! use tupgraph_sync::{FileTracker, MemoryStore, TrackerConfig};
//!
//! let tracker = FileTracker::new(MemoryStore::new(), TrackerConfig::new("/work/project"));
//! let mut removed_rx = tracker.subscribe();
//! assert!(removed_rx.try_recv().is_err());
//! ```

mod ingest;
mod probe;
mod resolve;
mod tracker;
mod transition;
mod variant;

pub use ingest::{Observation, PathState};
pub use probe::outside_mtime;
pub use resolve::{Resolution, ResolveMode};
pub use tracker::FileTracker;

// Re-export core types for convenience
pub use tupgraph_core::{
    CommandRole, Entity, EntityId, EntityKind, GraphError, GraphWarning, MemoryStore, Mtime,
    NodeStore, PathElements, SourceLink, StoreError, TrackerConfig, Variant, WarningKind, WorkList,
};
