//! The tracker handle that owns the store.

use std::path::PathBuf;

use compact_str::CompactString;
use tokio::sync::broadcast;
use tracing::warn;

use tupgraph_core::{Entity, EntityId, GraphError, GraphWarning, NodeStore, StoreError, TrackerConfig};

/// Buffer size for directory removal notifications.
const REMOVAL_CHANNEL_SIZE: usize = 100;

/// Keeps a node store consistent with what the filesystem says.
///
/// Every operation assumes exclusive access to the store until it returns;
/// the caller serializes events. An error means the operation stopped part
/// way and the store holds whatever was applied before the failing step.
pub struct FileTracker<S> {
    store: S,
    config: TrackerConfig,
    removed_tx: broadcast::Sender<EntityId>,
    warnings: Vec<GraphWarning>,
}

impl<S: NodeStore> FileTracker<S> {
    /// Create a tracker over a store.
    pub fn new(store: S, config: TrackerConfig) -> Self {
        let (removed_tx, _) = broadcast::channel(REMOVAL_CHANNEL_SIZE);
        Self {
            store,
            config,
            removed_tx,
            warnings: Vec::new(),
        }
    }

    /// Subscribe to ids of directories as they are structurally removed.
    pub fn subscribe(&self) -> broadcast::Receiver<EntityId> {
        self.removed_tx.subscribe()
    }

    /// Get the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the underlying store mutably.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Consume the tracker, returning the store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Get the tracker configuration.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Warnings raised since the last [`take_warnings`](Self::take_warnings).
    pub fn warnings(&self) -> &[GraphWarning] {
        &self.warnings
    }

    /// Drain accumulated warnings.
    pub fn take_warnings(&mut self) -> Vec<GraphWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// Reconstruct an entity's normalized path from its parent chain.
    ///
    /// Project entities are relative (`.` for the root itself); entities
    /// under the filesystem root are absolute.
    pub fn entity_path(&self, id: EntityId) -> Result<String, GraphError> {
        let (root, names) = self.ancestry(id)?;
        if root == EntityId::FILESYSTEM_ROOT {
            Ok(format!("/{}", names.join("/")))
        } else if names.is_empty() {
            Ok(".".to_string())
        } else {
            Ok(names.join("/"))
        }
    }

    /// Get the on-disk location of an entity.
    pub fn filesystem_path(&self, id: EntityId) -> Result<PathBuf, GraphError> {
        let (root, names) = self.ancestry(id)?;
        let mut path = if root == EntityId::FILESYSTEM_ROOT {
            PathBuf::from("/")
        } else {
            self.config.project_root.clone()
        };
        path.extend(names.iter().map(|n| n.as_str()));
        Ok(path)
    }

    pub(crate) fn entity(&self, id: EntityId) -> Result<Entity, GraphError> {
        self.store
            .get(id)?
            .ok_or(GraphError::Store(StoreError::MissingEntity { id }))
    }

    /// Path for messages; falls back to the id when the chain is broken.
    pub(crate) fn display_path(&self, id: EntityId) -> PathBuf {
        self.entity_path(id)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(format!("<entity {id}>")))
    }

    /// Display path of a named child that may not exist yet.
    pub(crate) fn child_path(&self, parent: EntityId, name: &str) -> PathBuf {
        if parent == EntityId::PROJECT_ROOT {
            PathBuf::from(name)
        } else {
            self.display_path(parent).join(name)
        }
    }

    pub(crate) fn warn(&mut self, warning: GraphWarning) {
        warn!(kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    pub(crate) fn notify_removed(&self, id: EntityId) {
        // No subscribers is fine
        let _ = self.removed_tx.send(id);
    }

    /// Walk to the root, returning it and the names below it in order.
    pub(crate) fn ancestry(&self, id: EntityId) -> Result<(EntityId, Vec<CompactString>), GraphError> {
        let mut names = Vec::new();
        let mut current = self.entity(id)?;
        while let Some(parent) = current.parent {
            names.push(current.name);
            current = self.entity(parent)?;
        }
        names.reverse();
        Ok((current.id, names))
    }
}
