//! Entity kind transitions and kind-specific deletion policy.

use tracing::{debug, info};

use tupgraph_core::{
    CommandRole, Entity, EntityId, EntityKind, GraphError, GraphWarning, Mtime, NodeStore,
    SourceLink, WorkList,
};

use crate::tracker::FileTracker;
use crate::variant::VariantSet;

/// One unit of work in a deletion walk.
enum Step {
    /// Apply the deletion policy for an entity of the given kind.
    Visit(EntityId, EntityKind),
    /// Every child of this directory has been handled.
    Finish(EntityId),
}

impl<S: NodeStore> FileTracker<S> {
    /// Insert a new file under `dir`.
    ///
    /// The directory is scheduled for re-parse, and any generated
    /// directories above the file become normal directories.
    pub fn create_file(&mut self, dir: EntityId, name: &str, mtime: Mtime) -> Result<EntityId, GraphError> {
        let entity = self
            .store_mut()
            .insert_entity(dir, name, EntityKind::File, mtime, SourceLink::None)?;
        debug!(path = %self.display_path(entity.id).display(), %mtime, "Create");
        self.store_mut().enqueue(WorkList::Create, dir)?;
        self.make_dirs_normal(dir)?;
        Ok(entity.id)
    }

    /// Insert a command entity under `dir`.
    pub fn create_command(&mut self, dir: EntityId, command_line: &str) -> Result<EntityId, GraphError> {
        let entity = self.store_mut().insert_entity(
            dir,
            command_line,
            EntityKind::Command,
            Mtime::Invalid,
            SourceLink::None,
        )?;
        debug!(dir = %self.display_path(dir).display(), command = command_line, "Create command");
        Ok(entity.id)
    }

    /// Convert `dir` and every generated directory above it into normal
    /// directories, stopping at the first ancestor that is not generated.
    pub(crate) fn make_dirs_normal(&mut self, dir: EntityId) -> Result<(), GraphError> {
        let mut current = self.store().get(dir)?;
        while let Some(entity) = current.take()
            && entity.kind == EntityKind::GeneratedDir
        {
            info!(path = %self.display_path(entity.id).display(), "Converting to a normal directory");
            self.store_mut().set_kind(entity.id, EntityKind::Dir)?;
            self.store_mut().clear_ghost_tree(entity.id)?;
            current = match entity.parent {
                Some(parent) => self.store().get(parent)?,
                None => None,
            };
        }
        Ok(())
    }

    /// Promote a ghost to a real file now that content exists for it.
    pub(crate) fn ghost_to_file(&mut self, entity: &Entity) -> Result<(), GraphError> {
        debug!(path = %self.display_path(entity.id).display(), "Create(overwrite ghost)");
        self.store_mut().clear_ghost_tree(entity.id)?;
        self.store_mut().set_kind(entity.id, EntityKind::File)?;

        if let Some(parent) = entity.parent {
            match self.entity(parent)?.kind {
                EntityKind::Dir => self.store_mut().enqueue(WorkList::Create, parent)?,
                EntityKind::GeneratedDir => self.make_dirs_normal(parent)?,
                _ => {}
            }
        }
        self.store_mut().enqueue(WorkList::Modify, entity.id)?;
        Ok(())
    }

    /// Replace an entity of a non-file kind with a file of the same name.
    ///
    /// Returns the id now holding the name and whether a new row was
    /// inserted.
    pub(crate) fn replace_with_file(
        &mut self,
        entity: &Entity,
        mtime: Mtime,
    ) -> Result<(EntityId, bool), GraphError> {
        debug!(
            path = %self.display_path(entity.id).display(),
            old_kind = %entity.kind,
            "Create(overwrite)"
        );
        let Some(dir) = entity.parent else {
            return Err(GraphError::KindConflict {
                path: self.display_path(entity.id),
                kind: entity.kind,
                message: "Unable to overwrite a root directory with a file".to_string(),
            });
        };

        self.delete_entity(entity.id, entity.kind, true)?;

        match self.store().lookup_child(dir, &entity.name)? {
            None => Ok((self.create_file(dir, &entity.name, mtime)?, true)),
            Some(ghost) if ghost.is_ghost() => {
                self.ghost_to_file(&ghost)?;
                Ok((ghost.id, false))
            }
            Some(other) => Err(GraphError::Internal {
                message: format!(
                    "After attempting to delete node '{}', it still exists as type '{}'",
                    self.display_path(other.id).display(),
                    other.kind
                ),
            }),
        }
    }

    /// Apply the deletion policy for `kind` to an entity.
    ///
    /// Directories are emptied depth first before their own policy runs.
    /// Returns true if anything observable changed.
    pub(crate) fn delete_entity(
        &mut self,
        id: EntityId,
        kind: EntityKind,
        force: bool,
    ) -> Result<bool, GraphError> {
        let variants = self.variants()?;
        let mut modified = false;
        let mut stack = vec![Step::Visit(id, kind)];

        while let Some(step) = stack.pop() {
            match step {
                Step::Visit(id, kind) => {
                    let entity = self.entity(id)?;
                    debug!(path = %self.display_path(id).display(), %kind, force, "Delete");
                    if self.retain_config_file(&variants, &entity)? {
                        continue;
                    }

                    match kind {
                        // Ghosts may still be referenced; groups are reclaimed separately
                        EntityKind::Ghost | EntityKind::Group => {}
                        EntityKind::GeneratedDir => {
                            self.store_mut().flag_generated_dir(id, force)?;
                            self.notify_removed(id);
                        }
                        EntityKind::Dir => {
                            stack.push(Step::Finish(id));
                            let children = self.store().children(id)?;
                            stack.extend(
                                children
                                    .into_iter()
                                    .rev()
                                    .map(|child| Step::Visit(child.id, child.kind)),
                            );
                        }
                        EntityKind::File | EntityKind::GeneratedFile | EntityKind::Command => {
                            modified |= self.delete_file(&entity, kind, force)?;
                        }
                    }
                }
                Step::Finish(id) => {
                    self.finish_dir(&variants, id, force)?;
                    modified = true;
                }
            }
        }

        Ok(modified)
    }

    /// The configuration file keeps its identity: it turns back into a
    /// ghost and is queued for re-import instead of being removed.
    fn retain_config_file(&mut self, variants: &VariantSet, entity: &Entity) -> Result<bool, GraphError> {
        if entity.name != self.config().config_file_name {
            return Ok(false);
        }
        let Some(parent) = entity.parent else {
            return Ok(false);
        };
        if !variants.is_config_dir(parent) {
            return Ok(false);
        }

        debug!(path = %self.display_path(entity.id).display(), "Retain configuration file as ghost");
        self.store_mut().set_kind(entity.id, EntityKind::Ghost)?;
        self.store_mut().enqueue(WorkList::Config, entity.id)?;
        Ok(true)
    }

    /// Directory policy, run once the subtree is empty.
    fn finish_dir(&mut self, variants: &VariantSet, id: EntityId, force: bool) -> Result<(), GraphError> {
        let entity = self.entity(id)?;
        self.notify_removed(id);

        match self.variant_of(variants, id)? {
            Some(variant) if !variant.root_variant => {
                // Re-parse the source so the shadow can be re-created. The
                // source may already be gone if both trees were removed.
                if variant.enabled
                    && !force
                    && let Some(source) = entity.source.source_id()
                    && self.store().get(source)?.is_some()
                {
                    self.store_mut().enqueue(WorkList::Create, source)?;
                }
            }
            _ => {
                let build_file = self
                    .store()
                    .lookup_child(id, &self.config().build_file_name)?;
                if let Some(build_file) = build_file {
                    self.store_mut().flag_dependent_directory(build_file.id)?;
                }

                for variant in variants.shadows() {
                    if let Some(shadow) = self.shadow_counterpart(id, variant)? {
                        debug!(
                            path = %self.display_path(shadow.id).display(),
                            variant = %variant.name,
                            "Source directory removed"
                        );
                        self.store_mut()
                            .set_source_link(shadow.id, SourceLink::SourceRemoved)?;
                    }
                }

                if let Some(parent) = entity.parent
                    && self.entity(parent)?.kind == EntityKind::Dir
                {
                    self.store_mut().enqueue(WorkList::Create, parent)?;
                }
            }
        }

        self.store_mut().flag_dependents(id)?;
        self.store_mut().delete_row(id)?;
        Ok(())
    }

    /// File and command policy.
    fn delete_file(&mut self, entity: &Entity, kind: EntityKind, force: bool) -> Result<bool, GraphError> {
        let id = entity.id;

        // Removed outside the build: keep the row and let the producing
        // command put it back.
        if kind == EntityKind::GeneratedFile && !force {
            if entity.name == self.config().ignore_file_name {
                if let Some(dir) = entity.parent {
                    self.store_mut().enqueue(WorkList::Create, dir)?;
                }
                return Ok(false);
            }

            let newly_flagged = self
                .store_mut()
                .flag_consuming_commands(id, CommandRole::Output)?;
            self.store_mut().unflag_modify(id)?;

            if self.store().is_transient(id)? {
                return Ok(false);
            }
            if newly_flagged {
                let warning = GraphWarning::generated_file_deleted(self.display_path(id));
                self.warn(warning);
                return Ok(true);
            }
            return Ok(false);
        }

        if kind == EntityKind::File {
            self.store_mut().flag_dependents(id)?;
        }
        if kind.is_file() {
            self.store_mut()
                .flag_consuming_commands(id, CommandRole::Input)?;
            if !force && let Some(dir) = entity.parent {
                self.store_mut().enqueue(WorkList::Create, dir)?;
            }
        }
        self.store_mut().delete_row(id)?;
        Ok(true)
    }
}
