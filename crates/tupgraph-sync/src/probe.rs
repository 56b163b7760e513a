//! Timestamp probe for entities outside the project tree.

use std::fs;
use std::io;
use std::path::Path;

use tupgraph_core::{GraphError, Mtime};

/// Read the modification time of `name` inside `parent`, without following
/// symlinks.
///
/// A missing parent or child yields [`Mtime::Invalid`]. An existing
/// directory yields [`Mtime::ExternalDirectory`], so a directory appearing
/// where nothing was before is distinguishable from one that was always
/// there. Any other I/O failure is an error.
pub fn outside_mtime(parent: &Path, name: &str) -> Result<Mtime, GraphError> {
    match fs::metadata(parent) {
        Ok(meta) if !meta.is_dir() => return Ok(Mtime::Invalid),
        Ok(_) => {}
        Err(err) if is_missing(&err) => return Ok(Mtime::Invalid),
        Err(err) => return Err(GraphError::io(parent, err)),
    }

    let path = parent.join(name);
    match fs::symlink_metadata(&path) {
        Ok(meta) if meta.is_dir() => Ok(Mtime::ExternalDirectory),
        Ok(meta) => meta
            .modified()
            .map(Mtime::from)
            .map_err(|err| GraphError::io(&path, err)),
        Err(err) if is_missing(&err) => Ok(Mtime::Invalid),
        Err(err) => Err(GraphError::io(&path, err)),
    }
}

fn is_missing(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}
