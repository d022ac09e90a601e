use std::path::PathBuf;

use thiserror::Error;

use crate::bazel_command::{BazelCommandError, BazelCommandLineToolConfigurationError};
use crate::label_utils::LabelError;

#[derive(Error, Debug)]
pub enum WorkspaceCommandError {
    #[error(transparent)]
    Command(#[from] BazelCommandError),
    #[error("{0:?} is not a bazel workspace, it has no WORKSPACE or WORKSPACE.bazel file")]
    NotAWorkspace(PathBuf),
    #[error(transparent)]
    Label(#[from] LabelError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
}

impl From<BazelCommandLineToolConfigurationError> for WorkspaceCommandError {
    fn from(e: BazelCommandLineToolConfigurationError) -> Self {
        WorkspaceCommandError::Command(BazelCommandError::Configuration(e))
    }
}

impl WorkspaceCommandError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkspaceCommandError::Command(e) if e.is_cancelled())
    }

    pub fn configuration_error(&self) -> Option<&BazelCommandLineToolConfigurationError> {
        match self {
            WorkspaceCommandError::Command(BazelCommandError::Configuration(e)) => Some(e),
            _ => None,
        }
    }
}
