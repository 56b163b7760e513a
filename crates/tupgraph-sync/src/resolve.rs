//! Path resolution from a starting directory.

use compact_str::CompactString;
use tracing::debug;

use tupgraph_core::{
    Entity, EntityId, EntityKind, GraphError, Mtime, NodeStore, PathElements, SourceLink, WorkList,
};

use crate::probe::outside_mtime;
use crate::tracker::FileTracker;

/// What to do with path components that do not exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Every component must already exist.
    Forbidden,
    /// Create missing components as directories inside the project and as
    /// ghosts outside it. Used for source paths that may not exist yet.
    IgnoreDirs,
    /// Create missing components as generated directories, and claim
    /// existing ghosts as generated directories. Used for output paths.
    CreateDirs,
}

/// Outcome of a resolution that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The path resolved to this entity.
    Found(EntityId),
    /// The path is hidden, or outside the project without full deps.
    NoMatch,
    /// The path walked above a root; nothing up there is tracked.
    AboveRoot,
}

impl Resolution {
    /// Get the resolved entity, if any.
    pub fn id(&self) -> Option<EntityId> {
        match self {
            Self::Found(id) => Some(*id),
            _ => None,
        }
    }
}

impl<S: NodeStore> FileTracker<S> {
    /// Resolve `path` starting at `start`, creating placeholders as `mode`
    /// allows. `full_deps` enables tracking of paths outside the project.
    pub fn resolve_path(
        &mut self,
        start: EntityId,
        path: &str,
        mode: ResolveMode,
        full_deps: bool,
    ) -> Result<Resolution, GraphError> {
        let elements = PathElements::parse(path, self.config());
        if let Some(early) = self.screen(start, &elements, full_deps)? {
            return Ok(early);
        }
        self.walk(start, &elements, mode, full_deps)
    }

    /// Resolve every component but the last, returning the directory and
    /// the detached final component.
    ///
    /// The final component is `None` when the path is empty (such as `.`)
    /// or when nothing was found.
    pub fn resolve_dir(
        &mut self,
        start: EntityId,
        path: &str,
        mode: ResolveMode,
        full_deps: bool,
    ) -> Result<(Resolution, Option<CompactString>), GraphError> {
        let mut elements = PathElements::parse(path, self.config());
        if let Some(early) = self.screen(start, &elements, full_deps)? {
            return Ok((early, None));
        }

        let last = elements.pop_last();
        match self.walk(start, &elements, mode, full_deps)? {
            found @ Resolution::Found(_) => Ok((found, last)),
            other => Ok((other, None)),
        }
    }

    /// Look up an existing entity by path without creating anything.
    pub fn lookup_path(&mut self, start: EntityId, path: &str) -> Result<Option<Entity>, GraphError> {
        let (resolution, last) = match self.resolve_dir(start, path, ResolveMode::Forbidden, true) {
            Ok(resolved) => resolved,
            Err(GraphError::NotFound { .. }) => return Ok(None),
            Err(err) => return Err(err),
        };
        let Resolution::Found(dir) = resolution else {
            return Ok(None);
        };
        match last {
            Some(name) => Ok(self.store().lookup_child(dir, &name)?),
            None => Ok(self.store().get(dir)?),
        }
    }

    /// Find a directory by path from the project root. `/` names the
    /// filesystem root.
    pub fn find_dir(&mut self, path: &str) -> Result<Option<EntityId>, GraphError> {
        if path == "/" {
            return Ok(Some(EntityId::FILESYSTEM_ROOT));
        }
        Ok(self
            .lookup_path(EntityId::PROJECT_ROOT, path)?
            .map(|e| e.id))
    }

    /// Short-circuit paths that never reach the walk.
    fn screen(
        &self,
        start: EntityId,
        elements: &PathElements,
        full_deps: bool,
    ) -> Result<Option<Resolution>, GraphError> {
        if elements.is_hidden() {
            return Ok(Some(Resolution::NoMatch));
        }
        if !full_deps && elements.is_outside_project() {
            return Ok(Some(Resolution::NoMatch));
        }
        if elements.is_empty() {
            let anchor = anchor(start, elements);
            self.entity(anchor)?;
            return Ok(Some(Resolution::Found(anchor)));
        }
        Ok(None)
    }

    fn walk(
        &mut self,
        start: EntityId,
        elements: &PathElements,
        mode: ResolveMode,
        full_deps: bool,
    ) -> Result<Resolution, GraphError> {
        let outside = elements.is_outside_project();
        let mut current = self.entity(anchor(start, elements))?;

        for name in elements.elements() {
            if name.as_str() == ".." {
                match current.parent {
                    Some(parent) => current = self.entity(parent)?,
                    None => {
                        debug!(from = %self.display_path(current.id).display(), "Path leaves the tracked tree");
                        return Ok(Resolution::AboveRoot);
                    }
                }
                continue;
            }

            current = match self.store().lookup_child(current.id, name)? {
                Some(child) if mode == ResolveMode::CreateDirs => self.claim_output_dir(child)?,
                Some(child) => child,
                None => self.create_component(&current, name, mode, outside, full_deps)?,
            };
        }

        Ok(Resolution::Found(current.id))
    }

    /// An existing component on an output path must be a directory.
    fn claim_output_dir(&mut self, mut entity: Entity) -> Result<Entity, GraphError> {
        match entity.kind {
            EntityKind::Ghost => {
                debug!(path = %self.display_path(entity.id).display(), "Claim ghost as generated directory");
                self.store_mut().set_kind(entity.id, EntityKind::GeneratedDir)?;
                self.store_mut().enqueue(WorkList::Modify, entity.id)?;
                entity.kind = EntityKind::GeneratedDir;
                Ok(entity)
            }
            EntityKind::Dir | EntityKind::GeneratedDir => Ok(entity),
            kind => Err(GraphError::KindConflict {
                path: self.display_path(entity.id),
                kind,
                message: "Unable to output to a different directory".to_string(),
            }),
        }
    }

    fn create_component(
        &mut self,
        parent: &Entity,
        name: &str,
        mode: ResolveMode,
        outside: bool,
        full_deps: bool,
    ) -> Result<Entity, GraphError> {
        let kind = match mode {
            ResolveMode::Forbidden => {
                return Err(GraphError::NotFound {
                    path: self.child_path(parent.id, name),
                });
            }
            ResolveMode::CreateDirs => EntityKind::GeneratedDir,
            ResolveMode::IgnoreDirs if outside => EntityKind::Ghost,
            ResolveMode::IgnoreDirs => EntityKind::Dir,
        };

        let mtime = if outside && full_deps {
            outside_mtime(&self.filesystem_path(parent.id)?, name)?
        } else {
            Mtime::Invalid
        };

        let entity = self
            .store_mut()
            .insert_entity(parent.id, name, kind, mtime, SourceLink::None)?;
        debug!(path = %self.display_path(entity.id).display(), %kind, %mtime, "Create placeholder");
        Ok(entity)
    }
}

/// Where a walk begins: the filesystem root for outside paths, the project
/// root for rooted paths, the start directory otherwise.
fn anchor(start: EntityId, elements: &PathElements) -> EntityId {
    if elements.is_outside_project() {
        EntityId::FILESYSTEM_ROOT
    } else if elements.is_rooted() {
        EntityId::PROJECT_ROOT
    } else {
        start
    }
}
