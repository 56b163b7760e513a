//! The persistent node store contract.

use crate::entity::{CommandRole, Entity, EntityId, EntityKind, Mtime, SourceLink, WorkList};
use crate::error::StoreError;
use crate::variant::Variant;

/// Query and update primitives the tracker drives.
///
/// Implementations own persistence and the command dependency graph. The
/// tracker assumes exclusive access for the duration of one top-level
/// operation and never retries a failed call.
pub trait NodeStore {
    /// Fetch an entity by id.
    fn get(&self, id: EntityId) -> Result<Option<Entity>, StoreError>;

    /// Look up a child of `parent` by exact name.
    fn lookup_child(&self, parent: EntityId, name: &str) -> Result<Option<Entity>, StoreError>;

    /// List the direct children of `parent`.
    fn children(&self, parent: EntityId) -> Result<Vec<Entity>, StoreError>;

    /// Insert a new entity under an existing parent.
    fn insert_entity(
        &mut self,
        parent: EntityId,
        name: &str,
        kind: EntityKind,
        mtime: Mtime,
        source: SourceLink,
    ) -> Result<Entity, StoreError>;

    /// Change an entity's kind in place.
    fn set_kind(&mut self, id: EntityId, kind: EntityKind) -> Result<(), StoreError>;

    /// Record a new modification time.
    fn set_mtime(&mut self, id: EntityId, mtime: Mtime) -> Result<(), StoreError>;

    /// Point a shadow entity at its source, or mark the source removed.
    fn set_source_link(&mut self, id: EntityId, source: SourceLink) -> Result<(), StoreError>;

    /// Add an entity to a work list. Adding a present id succeeds.
    fn enqueue(&mut self, list: WorkList, id: EntityId) -> Result<(), StoreError>;

    /// Check whether an entity is on a work list.
    fn is_queued(&self, list: WorkList, id: EntityId) -> Result<bool, StoreError>;

    /// Flag everything that depends on this entity for re-check.
    fn flag_dependents(&mut self, id: EntityId) -> Result<(), StoreError>;

    /// Flag directories whose parse read this entity for re-parse.
    fn flag_dependent_directory(&mut self, id: EntityId) -> Result<(), StoreError>;

    /// Flag commands reading (`Input`) or writing (`Output`) this entity for
    /// re-execution. Returns true if any command was not already flagged.
    fn flag_consuming_commands(&mut self, id: EntityId, role: CommandRole)
    -> Result<bool, StoreError>;

    /// Tell the executor a generated directory vanished.
    fn flag_generated_dir(&mut self, id: EntityId, force: bool) -> Result<(), StoreError>;

    /// Take an entity off the modify list.
    fn unflag_modify(&mut self, id: EntityId) -> Result<(), StoreError>;

    /// Drop unreferenced ghost descendants of an entity that became real.
    fn clear_ghost_tree(&mut self, id: EntityId) -> Result<(), StoreError>;

    /// Remove an entity's row. A row that still has children or is still
    /// referenced by a command or parse becomes a `Ghost` instead.
    fn delete_row(&mut self, id: EntityId) -> Result<(), StoreError>;

    /// Enumerate configured variants, including the root variant.
    fn list_variants(&self) -> Result<Vec<Variant>, StoreError>;

    /// Check whether an entity is a transient build byproduct.
    fn is_transient(&self, id: EntityId) -> Result<bool, StoreError>;
}
