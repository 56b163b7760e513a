//! Core types and traits for tupgraph.
//!
//! This crate provides the data model shared by the rest of the workspace:
//! entities and their kinds, modification times, variants, the
//! [`NodeStore`] contract the tracker drives, an arena-backed
//! [`MemoryStore`], path tokenization and configuration.

mod config;
mod entity;
mod error;
mod memory;
mod path;
mod store;
mod variant;

pub use config::{TrackerConfig, TrackerConfigBuilder};
pub use entity::{CommandRole, Entity, EntityId, EntityKind, Mtime, SourceLink, WorkList};
pub use error::{GraphError, GraphWarning, StoreError, WarningKind};
pub use memory::MemoryStore;
pub use path::{PathElements, PathFlags};
pub use store::NodeStore;
pub use variant::Variant;
