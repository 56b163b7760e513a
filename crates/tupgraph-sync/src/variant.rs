//! Shadow tree lookup for out-of-tree build variants.

use tracing::debug;

use tupgraph_core::{Entity, EntityId, GraphError, NodeStore, SourceLink, Variant};

use crate::tracker::FileTracker;

/// The variant list, read once per top-level operation and passed down.
#[derive(Debug, Clone, Default)]
pub(crate) struct VariantSet {
    variants: Vec<Variant>,
}

impl VariantSet {
    pub(crate) fn new(variants: Vec<Variant>) -> Self {
        Self { variants }
    }

    /// Enabled variants other than the source tree itself.
    pub(crate) fn shadows(&self) -> impl Iterator<Item = &Variant> {
        self.variants
            .iter()
            .filter(|v| v.enabled && !v.root_variant)
    }

    /// Check whether a configuration file in `dir` configures a variant.
    pub(crate) fn is_config_dir(&self, dir: EntityId) -> bool {
        dir == EntityId::PROJECT_ROOT || self.shadow_rooted_at(dir).is_some()
    }

    fn shadow_rooted_at(&self, id: EntityId) -> Option<&Variant> {
        self.variants
            .iter()
            .find(|v| !v.root_variant && v.directory_root == id)
    }

    fn root(&self) -> Option<&Variant> {
        self.variants.iter().find(|v| v.root_variant)
    }
}

impl<S: NodeStore> FileTracker<S> {
    pub(crate) fn variants(&self) -> Result<VariantSet, GraphError> {
        Ok(VariantSet::new(self.store().list_variants()?))
    }

    /// Find the variant whose tree holds `id`.
    ///
    /// The nearest shadow root wins; anything else under the project root
    /// belongs to the root variant. Entities outside the project belong to
    /// no variant.
    pub(crate) fn variant_of(
        &self,
        variants: &VariantSet,
        id: EntityId,
    ) -> Result<Option<Variant>, GraphError> {
        let mut current = id;
        loop {
            if let Some(variant) = variants.shadow_rooted_at(current) {
                return Ok(Some(variant.clone()));
            }
            if current == EntityId::PROJECT_ROOT {
                return Ok(variants.root().cloned());
            }
            match self.entity(current)?.parent {
                Some(parent) => current = parent,
                None => return Ok(None),
            }
        }
    }

    /// Find the counterpart of a source entity in a variant's shadow tree.
    ///
    /// Mirrors the source's ancestor chain below the variant's directory
    /// root using plain lookups. Any missing link means there is no
    /// counterpart.
    pub(crate) fn shadow_counterpart(
        &self,
        source: EntityId,
        variant: &Variant,
    ) -> Result<Option<Entity>, GraphError> {
        let (root, names) = self.ancestry(source)?;
        if root != EntityId::PROJECT_ROOT {
            return Ok(None);
        }

        let mut current = self.store().get(variant.directory_root)?;
        for name in &names {
            let Some(dir) = current else {
                return Ok(None);
            };
            current = self.store().lookup_child(dir.id, name)?;
        }
        Ok(current)
    }

    /// Find the source directory a shadow entity mirrors.
    fn source_counterpart(&self, shadow: EntityId, variant: &Variant) -> Result<Option<Entity>, GraphError> {
        let mut names = Vec::new();
        let mut current = shadow;
        while current != variant.directory_root {
            let entity = self.entity(current)?;
            let Some(parent) = entity.parent else {
                return Ok(None);
            };
            names.push(entity.name);
            current = parent;
        }

        let mut found = self.store().get(EntityId::PROJECT_ROOT)?;
        for name in names.iter().rev() {
            let Some(dir) = found else {
                return Ok(None);
            };
            found = self.store().lookup_child(dir.id, name)?;
        }
        Ok(found)
    }

    /// Point an unlinked directory inside a shadow variant at the source
    /// directory it mirrors.
    ///
    /// Returns true if a link was recorded.
    pub fn link_shadow_source(&mut self, id: EntityId) -> Result<bool, GraphError> {
        let entity = self.entity(id)?;
        if !entity.kind.is_dir() || entity.source != SourceLink::None {
            return Ok(false);
        }

        let variants = self.variants()?;
        let Some(variant) = self.variant_of(&variants, id)? else {
            return Ok(false);
        };
        if variant.root_variant {
            return Ok(false);
        }
        let Some(source) = self.source_counterpart(id, &variant)? else {
            return Ok(false);
        };
        if !source.kind.is_dir() {
            return Ok(false);
        }

        debug!(
            path = %self.display_path(id).display(),
            source = %self.display_path(source.id).display(),
            "Link shadow directory"
        );
        self.store_mut()
            .set_source_link(id, SourceLink::Source(source.id))?;
        Ok(true)
    }
}
