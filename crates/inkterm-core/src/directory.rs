//! Logical working directory and the `cd` builtin.
//!
//! The tracked directory is purely lexical. It is never checked against the
//! filesystem here; a directory that does not exist surfaces later, when a
//! command is spawned in it.

use std::path::{Component, Path, PathBuf};

use crate::error::ShellError;

pub const CHANGE_DIRECTORY: &str = "cd";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryTracker {
    current: PathBuf,
    home: PathBuf,
}

impl DirectoryTracker {
    pub fn new(current: impl Into<PathBuf>, home: impl Into<PathBuf>) -> Self {
        Self {
            current: current.into(),
            home: home.into(),
        }
    }

    pub fn current(&self) -> &Path {
        &self.current
    }

    /// Run `cd` with `args`. Exactly one argument is accepted.
    pub fn change_directory(&mut self, args: &[String]) -> Result<&Path, ShellError> {
        let [target] = args else {
            return Err(ShellError::MalformedCommand {
                command: CHANGE_DIRECTORY.to_string(),
                expected: 1,
                received: args.len(),
            });
        };

        self.current = self.resolve(target);
        log::debug!("directory changed to {}", self.current.display());
        Ok(&self.current)
    }

    fn resolve(&self, target: &str) -> PathBuf {
        if let Some(rest) = target.strip_prefix('~') {
            return normalize(&self.home.join(rest.trim_start_matches('/')));
        }

        let target = Path::new(target);
        if target.is_absolute() {
            target.to_path_buf()
        } else {
            normalize(&self.current.join(target))
        }
    }
}

/// Collapse `.` and `..` components without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }

    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}
