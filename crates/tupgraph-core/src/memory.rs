//! Arena-backed in-memory store.

use compact_str::CompactString;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::entity::{CommandRole, Entity, EntityId, EntityKind, Mtime, SourceLink, WorkList};
use crate::error::StoreError;
use crate::store::NodeStore;
use crate::variant::Variant;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Record {
    entity: Entity,
    children: IndexMap<CompactString, EntityId>,
}

/// A [`NodeStore`] holding every entity in an id-indexed arena.
///
/// Parents are stored as ids, so traversal is a lookup rather than pointer
/// chasing, and a parent must exist before a child can be inserted. The
/// whole store serializes with serde for persistence between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStore {
    records: IndexMap<EntityId, Record>,
    next_id: u64,
    create_list: IndexSet<EntityId>,
    modify_list: IndexSet<EntityId>,
    config_list: IndexSet<EntityId>,
    /// (input, command) pairs.
    inputs: IndexSet<(EntityId, EntityId)>,
    /// (command, output) pairs.
    outputs: IndexSet<(EntityId, EntityId)>,
    /// (entity, directory whose parse read it) pairs.
    dir_links: IndexSet<(EntityId, EntityId)>,
    flagged: IndexSet<EntityId>,
    vanished_dirs: IndexSet<EntityId>,
    transient: IndexSet<EntityId>,
    variants: Vec<Variant>,
}

impl MemoryStore {
    /// Create a store holding only the project and filesystem roots.
    pub fn new() -> Self {
        let mut records = IndexMap::new();
        for (id, name) in [(EntityId::PROJECT_ROOT, "."), (EntityId::FILESYSTEM_ROOT, "/")] {
            records.insert(
                id,
                Record {
                    entity: Entity::new(id, name, EntityKind::Dir, None, Mtime::Invalid),
                    children: IndexMap::new(),
                },
            );
        }

        Self {
            records,
            next_id: EntityId::FILESYSTEM_ROOT.0 + 1,
            create_list: IndexSet::new(),
            modify_list: IndexSet::new(),
            config_list: IndexSet::new(),
            inputs: IndexSet::new(),
            outputs: IndexSet::new(),
            dir_links: IndexSet::new(),
            flagged: IndexSet::new(),
            vanished_dirs: IndexSet::new(),
            transient: IndexSet::new(),
            variants: vec![Variant::root()],
        }
    }

    /// Get the number of entities, roots included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if only the roots exist.
    pub fn is_empty(&self) -> bool {
        self.records.len() <= 2
    }

    /// Check if an entity exists.
    pub fn contains(&self, id: EntityId) -> bool {
        self.records.contains_key(&id)
    }

    /// Iterate over all entities in insertion order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.records.values().map(|r| &r.entity)
    }

    /// Snapshot a work list in insertion order.
    pub fn queued(&self, list: WorkList) -> Vec<EntityId> {
        self.list(list).iter().copied().collect()
    }

    /// Empty a work list, returning its contents.
    pub fn drain(&mut self, list: WorkList) -> Vec<EntityId> {
        self.list_mut(list).drain(..).collect()
    }

    /// Check if an entity was flagged as a dependent of a change.
    pub fn is_flagged(&self, id: EntityId) -> bool {
        self.flagged.contains(&id)
    }

    /// Check if a generated directory was reported as vanished.
    pub fn is_vanished_dir(&self, id: EntityId) -> bool {
        self.vanished_dirs.contains(&id)
    }

    /// Add a variant, replacing any with the same shadow root.
    pub fn add_variant(&mut self, variant: Variant) {
        self.variants
            .retain(|v| v.directory_root != variant.directory_root);
        self.variants.push(variant);
    }

    /// Record which entities a command reads and writes.
    pub fn link_command(
        &mut self,
        command: EntityId,
        inputs: &[EntityId],
        outputs: &[EntityId],
    ) -> Result<(), StoreError> {
        self.record(command)?;
        for &input in inputs {
            self.record(input)?;
            self.inputs.insert((input, command));
        }
        for &output in outputs {
            self.record(output)?;
            self.outputs.insert((command, output));
        }
        Ok(())
    }

    /// Record that parsing `dir` read `entity`.
    pub fn link_directory(&mut self, entity: EntityId, dir: EntityId) -> Result<(), StoreError> {
        self.record(entity)?;
        self.record(dir)?;
        self.dir_links.insert((entity, dir));
        Ok(())
    }

    /// Mark an entity as a transient byproduct.
    pub fn mark_transient(&mut self, id: EntityId) {
        self.transient.insert(id);
    }

    /// Remove unreferenced childless ghosts and groups.
    ///
    /// Returns the number of rows removed. Runs until nothing more can be
    /// reclaimed, so chains of ghost directories collapse bottom-up.
    pub fn reclaim_ghosts(&mut self) -> usize {
        let mut reclaimed = 0;
        loop {
            let doomed: Vec<EntityId> = self
                .records
                .values()
                .filter(|r| {
                    matches!(r.entity.kind, EntityKind::Ghost | EntityKind::Group)
                        && !r.entity.id.is_root()
                        && r.children.is_empty()
                        && !self.is_referenced(r.entity.id)
                })
                .map(|r| r.entity.id)
                .collect();
            if doomed.is_empty() {
                return reclaimed;
            }
            reclaimed += doomed.len();
            for id in doomed {
                self.remove_record(id);
            }
        }
    }

    fn record(&self, id: EntityId) -> Result<&Record, StoreError> {
        self.records.get(&id).ok_or(StoreError::MissingEntity { id })
    }

    fn record_mut(&mut self, id: EntityId) -> Result<&mut Record, StoreError> {
        self.records
            .get_mut(&id)
            .ok_or(StoreError::MissingEntity { id })
    }

    fn list(&self, list: WorkList) -> &IndexSet<EntityId> {
        match list {
            WorkList::Create => &self.create_list,
            WorkList::Modify => &self.modify_list,
            WorkList::Config => &self.config_list,
        }
    }

    fn list_mut(&mut self, list: WorkList) -> &mut IndexSet<EntityId> {
        match list {
            WorkList::Create => &mut self.create_list,
            WorkList::Modify => &mut self.modify_list,
            WorkList::Config => &mut self.config_list,
        }
    }

    fn is_referenced(&self, id: EntityId) -> bool {
        self.inputs.iter().any(|(input, _)| *input == id)
            || self.dir_links.iter().any(|(entity, _)| *entity == id)
    }

    fn remove_record(&mut self, id: EntityId) {
        let Some(record) = self.records.shift_remove(&id) else {
            return;
        };
        if let Some(parent_id) = record.entity.parent
            && let Some(parent) = self.records.get_mut(&parent_id)
        {
            parent.children.shift_remove(&record.entity.name);
        }
        self.create_list.shift_remove(&id);
        self.modify_list.shift_remove(&id);
        self.config_list.shift_remove(&id);
        self.inputs.retain(|(a, b)| *a != id && *b != id);
        self.outputs.retain(|(a, b)| *a != id && *b != id);
        self.dir_links.retain(|(a, b)| *a != id && *b != id);
        self.flagged.shift_remove(&id);
        self.vanished_dirs.shift_remove(&id);
        self.transient.shift_remove(&id);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeStore for MemoryStore {
    fn get(&self, id: EntityId) -> Result<Option<Entity>, StoreError> {
        Ok(self.records.get(&id).map(|r| r.entity.clone()))
    }

    fn lookup_child(&self, parent: EntityId, name: &str) -> Result<Option<Entity>, StoreError> {
        let record = self.record(parent)?;
        Ok(record
            .children
            .get(name)
            .and_then(|id| self.records.get(id))
            .map(|r| r.entity.clone()))
    }

    fn children(&self, parent: EntityId) -> Result<Vec<Entity>, StoreError> {
        let record = self.record(parent)?;
        Ok(record
            .children
            .values()
            .filter_map(|id| self.records.get(id))
            .map(|r| r.entity.clone())
            .collect())
    }

    fn insert_entity(
        &mut self,
        parent: EntityId,
        name: &str,
        kind: EntityKind,
        mtime: Mtime,
        source: SourceLink,
    ) -> Result<Entity, StoreError> {
        let parent_record = self
            .records
            .get(&parent)
            .ok_or(StoreError::MissingParent { id: parent })?;
        if parent_record.children.contains_key(name) {
            return Err(StoreError::DuplicateName {
                parent,
                name: CompactString::new(name),
            });
        }

        let id = EntityId::new(self.next_id);
        self.next_id += 1;
        let entity = Entity::new(id, name, kind, Some(parent), mtime).with_source(source);

        self.record_mut(parent)?
            .children
            .insert(entity.name.clone(), id);
        self.records.insert(
            id,
            Record {
                entity: entity.clone(),
                children: IndexMap::new(),
            },
        );
        Ok(entity)
    }

    fn set_kind(&mut self, id: EntityId, kind: EntityKind) -> Result<(), StoreError> {
        self.record_mut(id)?.entity.kind = kind;
        Ok(())
    }

    fn set_mtime(&mut self, id: EntityId, mtime: Mtime) -> Result<(), StoreError> {
        self.record_mut(id)?.entity.mtime = mtime;
        Ok(())
    }

    fn set_source_link(&mut self, id: EntityId, source: SourceLink) -> Result<(), StoreError> {
        self.record_mut(id)?.entity.source = source;
        Ok(())
    }

    fn enqueue(&mut self, list: WorkList, id: EntityId) -> Result<(), StoreError> {
        self.record(id)?;
        self.list_mut(list).insert(id);
        Ok(())
    }

    fn is_queued(&self, list: WorkList, id: EntityId) -> Result<bool, StoreError> {
        Ok(self.list(list).contains(&id))
    }

    fn flag_dependents(&mut self, id: EntityId) -> Result<(), StoreError> {
        let dependents: Vec<EntityId> = self
            .inputs
            .iter()
            .filter(|(input, _)| *input == id)
            .map(|(_, command)| *command)
            .collect();
        self.flagged.extend(dependents);
        Ok(())
    }

    fn flag_dependent_directory(&mut self, id: EntityId) -> Result<(), StoreError> {
        let dirs: Vec<EntityId> = self
            .dir_links
            .iter()
            .filter(|(entity, _)| *entity == id)
            .map(|(_, dir)| *dir)
            .collect();
        self.create_list.extend(dirs);
        Ok(())
    }

    fn flag_consuming_commands(
        &mut self,
        id: EntityId,
        role: CommandRole,
    ) -> Result<bool, StoreError> {
        let commands: Vec<EntityId> = match role {
            CommandRole::Input => self
                .inputs
                .iter()
                .filter(|(input, _)| *input == id)
                .map(|(_, command)| *command)
                .collect(),
            CommandRole::Output => self
                .outputs
                .iter()
                .filter(|(_, output)| *output == id)
                .map(|(command, _)| *command)
                .collect(),
        };

        let mut changed = false;
        for command in commands {
            changed |= self.modify_list.insert(command);
        }
        Ok(changed)
    }

    fn flag_generated_dir(&mut self, id: EntityId, force: bool) -> Result<(), StoreError> {
        self.record(id)?;
        self.vanished_dirs.insert(id);
        if !force {
            self.modify_list.insert(id);
        }
        Ok(())
    }

    fn unflag_modify(&mut self, id: EntityId) -> Result<(), StoreError> {
        self.modify_list.shift_remove(&id);
        Ok(())
    }

    fn clear_ghost_tree(&mut self, id: EntityId) -> Result<(), StoreError> {
        let ghosts: Vec<EntityId> = self
            .children(id)?
            .into_iter()
            .filter(Entity::is_ghost)
            .map(|e| e.id)
            .collect();

        for ghost in ghosts {
            self.clear_ghost_tree(ghost)?;
            let removable = self
                .records
                .get(&ghost)
                .is_some_and(|r| r.entity.is_ghost() && r.children.is_empty())
                && !self.is_referenced(ghost);
            if removable {
                self.remove_record(ghost);
            }
        }
        Ok(())
    }

    fn delete_row(&mut self, id: EntityId) -> Result<(), StoreError> {
        if id.is_root() {
            return Err(StoreError::Backend {
                message: format!("refusing to delete root entity {id}"),
            });
        }

        let has_children = !self.record(id)?.children.is_empty();
        if has_children || self.is_referenced(id) {
            let record = self.record_mut(id)?;
            record.entity.kind = EntityKind::Ghost;
            record.entity.mtime = Mtime::Invalid;
            self.outputs.retain(|(_, output)| *output != id);
            self.modify_list.shift_remove(&id);
        } else {
            self.remove_record(id);
        }
        Ok(())
    }

    fn list_variants(&self) -> Result<Vec<Variant>, StoreError> {
        Ok(self.variants.clone())
    }

    fn is_transient(&self, id: EntityId) -> Result<bool, StoreError> {
        Ok(self.transient.contains(&id))
    }
}
