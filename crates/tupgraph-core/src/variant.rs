//! Build variant descriptors.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

/// A shadow of the source tree used for out-of-tree builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    /// Display name, usually the shadow directory's path.
    pub name: CompactString,
    /// Whether builds currently run in this variant.
    pub enabled: bool,
    /// True for the implicit variant that is the source tree itself.
    pub root_variant: bool,
    /// Directory the shadow tree is rooted at.
    pub directory_root: EntityId,
}

impl Variant {
    /// The identity variant covering the project root.
    pub fn root() -> Self {
        Self {
            name: CompactString::new("."),
            enabled: true,
            root_variant: true,
            directory_root: EntityId::PROJECT_ROOT,
        }
    }

    /// An enabled shadow variant rooted at `directory_root`.
    pub fn shadow(name: impl Into<CompactString>, directory_root: EntityId) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            root_variant: false,
            directory_root,
        }
    }

    /// Set whether the variant is enabled.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}
