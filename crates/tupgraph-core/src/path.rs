//! Path tokenization into normalized elements.

use compact_str::CompactString;

use crate::config::TrackerConfig;

/// Markers detected while tokenizing a path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathFlags {
    /// A component names a hidden directory.
    pub hidden: bool,
    /// Absolute path under the project root; resolve from the project root.
    pub rooted: bool,
    /// Absolute path outside the project; resolve from the filesystem root.
    pub outside_project: bool,
}

/// A slash-separated path split into normalized components.
///
/// Empty and `.` components are dropped and `name/..` pairs fold away.
/// Leading `..` components of relative paths are kept so the resolver can
/// walk above its starting directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathElements {
    elements: Vec<CompactString>,
    flags: PathFlags,
}

impl PathElements {
    /// Tokenize a path relative to the configured project root.
    pub fn parse(path: &str, config: &TrackerConfig) -> Self {
        let absolute = path.starts_with('/');
        let mut elements = normalize(path, absolute);
        let mut flags = PathFlags::default();

        if absolute {
            let root = config.project_root.to_string_lossy();
            let root_elements = normalize(&root, true);
            if elements.starts_with(&root_elements) {
                elements.drain(..root_elements.len());
                flags.rooted = true;
            } else {
                flags.outside_project = true;
            }
        }

        flags.hidden = elements.iter().any(|e| config.is_hidden_name(e));

        Self { elements, flags }
    }

    /// Get the components in order.
    pub fn elements(&self) -> &[CompactString] {
        &self.elements
    }

    /// Get the detected markers.
    pub fn flags(&self) -> PathFlags {
        self.flags
    }

    /// Check if no components remain.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Get the number of components.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Check if the path names a hidden directory.
    pub fn is_hidden(&self) -> bool {
        self.flags.hidden
    }

    /// Check if the path is absolute under the project root.
    pub fn is_rooted(&self) -> bool {
        self.flags.rooted
    }

    /// Check if the path escapes the project.
    pub fn is_outside_project(&self) -> bool {
        self.flags.outside_project
    }

    /// Detach and return the final component.
    pub fn pop_last(&mut self) -> Option<CompactString> {
        self.elements.pop()
    }
}

fn normalize(path: &str, absolute: bool) -> Vec<CompactString> {
    let mut elements: Vec<CompactString> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if elements.last().is_some_and(|last| last.as_str() != "..") {
                    elements.pop();
                } else if !absolute {
                    // Nothing sits above the filesystem root
                    elements.push(CompactString::new(".."));
                }
            }
            name => elements.push(CompactString::new(name)),
        }
    }
    elements
}
