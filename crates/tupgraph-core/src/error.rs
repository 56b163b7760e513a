//! Error and warning types for graph maintenance.

use std::path::PathBuf;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::{EntityId, EntityKind};

/// Errors reported by a [`NodeStore`](crate::NodeStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity does not exist.
    #[error("Entity {id} does not exist")]
    MissingEntity { id: EntityId },

    /// Parent entity does not exist.
    #[error("Parent entity {id} does not exist")]
    MissingParent { id: EntityId },

    /// A child with this name already exists.
    #[error("Entity {parent} already has a child named '{name}'")]
    DuplicateName {
        parent: EntityId,
        name: CompactString,
    },

    /// The backing storage failed.
    #[error("Store backend error: {message}")]
    Backend { message: String },
}

/// Errors that abort a graph operation.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A path component or entity that must exist does not.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// An entity exists with a kind incompatible with the operation.
    #[error("{message}: '{path}' is a {kind}")]
    KindConflict {
        path: PathBuf,
        kind: EntityKind,
        message: String,
    },

    /// Filesystem probe failed for a reason other than absence.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The state machine found its own premises violated.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl GraphError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Kind of user-visible warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// A generated file was written by something other than its command.
    GeneratedFileModified,
    /// A generated file was removed by something other than the build.
    GeneratedFileDeleted,
    /// A directory inside a variant shadow tree was removed.
    VariantDirectoryDeleted,
}

/// Non-fatal warning raised while maintaining the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphWarning {
    /// Path of the entity the warning is about.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl GraphWarning {
    /// Create a new warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a generated-file-modified warning.
    pub fn generated_file_modified(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let message = format!(
            "generated file '{}' was modified outside of the build. This file will be \
             overwritten on the next update, unless the rule that creates it is also removed.",
            path.display()
        );
        Self::new(path, message, WarningKind::GeneratedFileModified)
    }

    /// Create a generated-file-deleted warning.
    pub fn generated_file_deleted(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let message = format!(
            "generated file '{}' was deleted outside of the build. This file may be \
             re-created on the next update.",
            path.display()
        );
        Self::new(path, message, WarningKind::GeneratedFileDeleted)
    }

    /// Create a variant-directory-deleted warning.
    pub fn variant_directory_deleted(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let message = format!(
            "variant directory '{}' was deleted outside of the build. This directory will be \
             re-created, unless the corresponding source directory was also removed.",
            path.display()
        );
        Self::new(path, message, WarningKind::VariantDirectoryDeleted)
    }
}
