//! Change ingestion: observed filesystem state in, graph updates out.

use std::fs;
use std::io;

use tracing::debug;

use tupgraph_core::{
    CommandRole, EntityId, EntityKind, GraphError, GraphWarning, Mtime, NodeStore, SourceLink,
    WorkList,
};

use crate::resolve::{Resolution, ResolveMode};
use crate::tracker::FileTracker;

/// Result of ingesting a path that exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Entity now holding the path.
    pub id: EntityId,
    /// Whether anything was created or marked changed.
    pub modified: bool,
}

/// What [`FileTracker::observe_path`] found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    /// The path exists and was ingested.
    Present(Observation),
    /// The path is gone and was handed to deletion.
    Missing { modified: bool },
}

impl<S: NodeStore> FileTracker<S> {
    /// Record that `name` under `dir` exists with modification time `mtime`.
    ///
    /// Creates the entity if needed, promotes ghosts, replaces entities of
    /// other kinds, and schedules re-checks when the file changed. With
    /// `ignore_generated`, `force` does not apply to generated files, so
    /// the build's own writes are only noticed through their timestamps.
    pub fn observe_change(
        &mut self,
        dir: EntityId,
        name: &str,
        mtime: Mtime,
        force: bool,
        ignore_generated: bool,
    ) -> Result<Observation, GraphError> {
        let variants = self.variants()?;

        let (entity, new, changed) = match self.store().lookup_child(dir, name)? {
            None => {
                let id = self.create_file(dir, name, mtime)?;
                (self.entity(id)?, true, false)
            }
            Some(existing) => {
                let force = force && !(ignore_generated && existing.kind == EntityKind::GeneratedFile);
                let changed = existing.mtime != mtime || force;
                if changed {
                    debug!(
                        path = %self.display_path(existing.id).display(),
                        old_mtime = %existing.mtime,
                        new_mtime = %mtime,
                        force,
                        "Update"
                    );
                }

                let (id, new) = match existing.kind {
                    EntityKind::Ghost => {
                        self.ghost_to_file(&existing)?;
                        (existing.id, false)
                    }
                    EntityKind::File | EntityKind::GeneratedFile => (existing.id, false),
                    _ => self.replace_with_file(&existing, mtime)?,
                };
                let entity = self.entity(id)?;

                if changed {
                    if entity.kind == EntityKind::GeneratedFile
                        && self
                            .store_mut()
                            .flag_consuming_commands(id, CommandRole::Output)?
                    {
                        let warning = GraphWarning::generated_file_modified(self.display_path(id));
                        self.warn(warning);
                    }
                    self.store_mut().enqueue(WorkList::Modify, id)?;
                    self.store_mut().flag_dependents(id)?;
                    if entity.mtime != mtime {
                        self.store_mut().set_mtime(id, mtime)?;
                    }
                }
                (entity, new, changed)
            }
        };

        let modified = new || changed;
        if modified
            && entity.name == self.config().config_file_name
            && entity.parent.is_some_and(|parent| variants.is_config_dir(parent))
        {
            debug!(path = %self.display_path(entity.id).display(), "Configuration changed");
            self.store_mut().enqueue(WorkList::Config, entity.id)?;
        }

        Ok(Observation {
            id: entity.id,
            modified,
        })
    }

    /// Resolve `path` from `start` and observe its final component.
    ///
    /// Returns `None` when the path does not name anything trackable:
    /// hidden, outside the project without full deps, above the root, or
    /// a bare directory such as `.`.
    pub fn observe_change_at(
        &mut self,
        start: EntityId,
        path: &str,
        mode: ResolveMode,
        mtime: Mtime,
        force: bool,
        ignore_generated: bool,
    ) -> Result<Option<Observation>, GraphError> {
        let full_deps = self.config().full_deps;
        let (resolution, last) = self.resolve_dir(start, path, mode, full_deps)?;
        let (Resolution::Found(dir), Some(name)) = (resolution, last) else {
            return Ok(None);
        };
        self.observe_change(dir, &name, mtime, force, ignore_generated)
            .map(Some)
    }

    /// Record that a directory named `name` exists under `dir`.
    ///
    /// A new or promoted directory is scheduled for parsing, and generated
    /// directories above it become normal directories. Inside a shadow
    /// variant it is linked to the source directory it mirrors.
    pub fn observe_dir(&mut self, dir: EntityId, name: &str) -> Result<Observation, GraphError> {
        let existing = match self.store().lookup_child(dir, name)? {
            Some(entity) if entity.kind.is_dir() => {
                return Ok(Observation {
                    id: entity.id,
                    modified: false,
                });
            }
            Some(entity) if !entity.is_ghost() => {
                debug!(
                    path = %self.display_path(entity.id).display(),
                    old_kind = %entity.kind,
                    "Create(overwrite directory)"
                );
                self.delete_entity(entity.id, entity.kind, true)?;
                self.store().lookup_child(dir, name)?
            }
            other => other,
        };

        let id = match existing {
            None => {
                self.store_mut()
                    .insert_entity(dir, name, EntityKind::Dir, Mtime::Invalid, SourceLink::None)?
                    .id
            }
            Some(ghost) if ghost.is_ghost() => {
                self.store_mut().clear_ghost_tree(ghost.id)?;
                self.store_mut().set_kind(ghost.id, EntityKind::Dir)?;
                ghost.id
            }
            Some(other) => {
                return Err(GraphError::Internal {
                    message: format!(
                        "After attempting to delete node '{}', it still exists as type '{}'",
                        self.display_path(other.id).display(),
                        other.kind
                    ),
                });
            }
        };

        debug!(path = %self.display_path(id).display(), "Create directory");
        self.link_shadow_source(id)?;
        self.store_mut().enqueue(WorkList::Create, id)?;
        self.store_mut().enqueue(WorkList::Create, dir)?;
        self.make_dirs_normal(dir)?;
        Ok(Observation { id, modified: true })
    }

    /// Stat `name` under `dir` on disk and ingest whatever is there.
    ///
    /// Symlinks are not followed. Files are observed with `force` and
    /// `ignore_generated` set; a missing path is handed to
    /// [`observe_missing`](Self::observe_missing).
    pub fn observe_path(&mut self, dir: EntityId, name: &str) -> Result<PathState, GraphError> {
        let path = self.filesystem_path(dir)?.join(name);
        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_dir() => Ok(PathState::Present(self.observe_dir(dir, name)?)),
            Ok(meta) => {
                let mtime = meta
                    .modified()
                    .map(Mtime::from)
                    .map_err(|err| GraphError::io(&path, err))?;
                let seen = self.observe_change(dir, name, mtime, true, true)?;
                Ok(PathState::Present(seen))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(PathState::Missing {
                modified: self.observe_missing(dir, name)?,
            }),
            Err(err) => Err(GraphError::io(path, err)),
        }
    }

    /// Record that `name` under `dir` no longer exists.
    ///
    /// Unknown names are ignored; the file may have come and gone before
    /// anyone recorded it. Returns true if anything changed.
    pub fn observe_missing(&mut self, dir: EntityId, name: &str) -> Result<bool, GraphError> {
        let Some(entity) = self.store().lookup_child(dir, name)? else {
            debug!(path = %self.child_path(dir, name).display(), "Delete of untracked path ignored");
            return Ok(false);
        };

        // The ignore file is derived from the build file
        if entity.name == self.config().ignore_file_name {
            self.store_mut().enqueue(WorkList::Create, dir)?;
        }
        self.delete_entity(entity.id, entity.kind, false)
    }

    /// Handle a tracked entity a scan found missing.
    ///
    /// A variant's shadow root is removed outright so its whole source tree
    /// is not re-parsed. Other directories inside a shadow tree are
    /// re-created from their source, with a warning.
    pub fn reconcile_missing(&mut self, id: EntityId) -> Result<bool, GraphError> {
        let entity = self.entity(id)?;
        let variants = self.variants()?;

        let mut force = false;
        if let Some(variant) = self.variant_of(&variants, id)?
            && !variant.root_variant
        {
            if variant.directory_root == id {
                force = true;
            } else if entity.kind == EntityKind::Dir {
                let warning = GraphWarning::variant_directory_deleted(self.display_path(id));
                self.warn(warning);
            }
        }
        self.delete_entity(id, entity.kind, force)
    }

    /// Delete an entity on behalf of the build itself.
    pub fn delete_forced(&mut self, id: EntityId, kind: EntityKind) -> Result<bool, GraphError> {
        self.delete_entity(id, kind, true)
    }
}
