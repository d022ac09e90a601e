use std::path::{Path, PathBuf};

use super::WorkspaceCommandError;

const WORKSPACE_FILE_NAMES: &[&str] = &["WORKSPACE", "WORKSPACE.bazel"];

pub fn is_workspace_root(path: &Path) -> bool {
    WORKSPACE_FILE_NAMES
        .iter()
        .any(|name| path.join(name).is_file())
}

/// A bazel workspace on disk, identified by its canonical root directory.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BazelWorkspace {
    root: PathBuf,
    name: String,
}

impl BazelWorkspace {
    pub fn open(root: &Path) -> Result<BazelWorkspace, WorkspaceCommandError> {
        let root = root
            .canonicalize()
            .map_err(|source| WorkspaceCommandError::Io {
                context: format!("Unable to resolve workspace root {:?}", root),
                source,
            })?;
        if !is_workspace_root(&root) {
            return Err(WorkspaceCommandError::NotAWorkspace(root));
        }
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(BazelWorkspace { root, name })
    }

    /// Opens the closest directory at or above `path` that is a workspace root.
    pub fn find_enclosing(path: &Path) -> Result<BazelWorkspace, WorkspaceCommandError> {
        let start = path
            .canonicalize()
            .map_err(|source| WorkspaceCommandError::Io {
                context: format!("Unable to resolve {:?}", path),
                source,
            })?;
        match start.ancestors().find(|dir| is_workspace_root(dir)) {
            Some(root) => BazelWorkspace::open(root),
            None => Err(WorkspaceCommandError::NotAWorkspace(start)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
