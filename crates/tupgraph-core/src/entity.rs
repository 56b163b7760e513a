//! Entity types tracked by the node graph.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Opaque identifier for an entity in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Never a valid entity.
    pub const NONE: Self = Self(0);

    /// The project root directory (`.`).
    pub const PROJECT_ROOT: Self = Self(1);

    /// The filesystem root (`/`), anchoring entities outside the project.
    pub const FILESYSTEM_ROOT: Self = Self(2);

    /// Create a new EntityId from a u64.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Check if this is one of the two parentless roots.
    pub fn is_root(self) -> bool {
        self == Self::PROJECT_ROOT || self == Self::FILESYSTEM_ROOT
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Modification time as stored for an entity.
///
/// The two sentinels order before every real timestamp.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum Mtime {
    /// Nothing exists on disk, or the time was never recorded.
    #[default]
    Invalid,
    /// A directory outside the project exists but carries no tracked time.
    ExternalDirectory,
    /// A real modification time.
    At {
        /// Seconds relative to the Unix epoch.
        secs: i64,
        /// Nanoseconds within the second.
        nanos: u32,
    },
}

impl Mtime {
    /// Create a real timestamp.
    pub fn new(secs: i64, nanos: u32) -> Self {
        Self::At { secs, nanos }
    }

    /// Check if this is a real timestamp rather than a sentinel.
    pub fn is_real(&self) -> bool {
        matches!(self, Self::At { .. })
    }
}

impl From<SystemTime> for Mtime {
    fn from(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => Self::At {
                secs: i64::try_from(after.as_secs()).unwrap_or(i64::MAX),
                nanos: after.subsec_nanos(),
            },
            Err(err) => {
                let before = err.duration();
                let mut secs = 0i64.saturating_sub_unsigned(before.as_secs());
                let mut nanos = before.subsec_nanos();
                if nanos > 0 {
                    secs = secs.saturating_sub(1);
                    nanos = 1_000_000_000 - nanos;
                }
                Self::At { secs, nanos }
            }
        }
    }
}

impl fmt::Display for Mtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid => write!(f, "invalid"),
            Self::ExternalDirectory => write!(f, "external-directory"),
            Self::At { secs, nanos } => write!(f, "{secs}.{nanos:09}"),
        }
    }
}

/// Kind of entity in the graph.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "kebab-case")]
pub enum EntityKind {
    /// Source file provided by the user.
    File,
    /// Source directory.
    Dir,
    /// File written by a command.
    GeneratedFile,
    /// Directory that only exists to hold command outputs.
    GeneratedDir,
    /// Placeholder referenced by something but not backed by content.
    Ghost,
    /// Named collection of outputs.
    Group,
    /// A command line to execute.
    Command,
}

impl EntityKind {
    /// Check if this kind can contain children on disk.
    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Dir | Self::GeneratedDir)
    }

    /// Check if this kind is a plain or generated file.
    pub fn is_file(&self) -> bool {
        matches!(self, Self::File | Self::GeneratedFile)
    }

    /// Check if this kind is produced by the build rather than the user.
    pub fn is_generated(&self) -> bool {
        matches!(self, Self::GeneratedFile | Self::GeneratedDir)
    }
}

/// Link from a variant shadow entity back to the source tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SourceLink {
    /// Not a shadow entity.
    #[default]
    None,
    /// Shadows the given source entity.
    Source(EntityId),
    /// The source entity was removed.
    SourceRemoved,
}

impl SourceLink {
    /// Get the linked source entity, if any.
    pub fn source_id(&self) -> Option<EntityId> {
        match self {
            Self::Source(id) => Some(*id),
            _ => None,
        }
    }
}

/// Pending-work queue drained by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum WorkList {
    /// Directories needing re-parse.
    Create,
    /// Entities needing re-execution or re-check.
    Modify,
    /// Configuration files needing re-import.
    Config,
}

/// Which side of a command an entity sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandRole {
    /// The entity is read by the command.
    Input,
    /// The entity is written by the command.
    Output,
}

/// A single node in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier for this entity.
    pub id: EntityId,

    /// Name within the parent directory.
    pub name: CompactString,

    /// Entity kind.
    pub kind: EntityKind,

    /// Containing directory (None for the roots).
    pub parent: Option<EntityId>,

    /// Last recorded modification time.
    pub mtime: Mtime,

    /// Source link for variant shadow entities.
    #[serde(default)]
    pub source: SourceLink,
}

impl Entity {
    /// Create a new entity.
    pub fn new(
        id: EntityId,
        name: impl Into<CompactString>,
        kind: EntityKind,
        parent: Option<EntityId>,
        mtime: Mtime,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            parent,
            mtime,
            source: SourceLink::None,
        }
    }

    /// Set the source link.
    pub fn with_source(mut self, source: SourceLink) -> Self {
        self.source = source;
        self
    }

    /// Check if this entity is a ghost.
    pub fn is_ghost(&self) -> bool {
        self.kind == EntityKind::Ghost
    }
}
