use std::path::{Path, PathBuf};

use bzlsdk_bazel_wrapper::bazel_subprocess_wrapper::{ExecutionError, LineSelector, ProcessResult};
use thiserror::Error;

use crate::label_utils::LabelError;
use crate::model::BazelVersion;

mod announce_rc;
mod build;
mod clean;
mod executor;
mod info;
mod launcher;
mod query;
mod version;

pub use announce_rc::{AnnounceRcCommand, BazelWorkspaceCommandOptions};
pub use build::{BuildCommand, BuildWithAspectsCommand};
pub use clean::CleanCommand;
pub use executor::{BazelBinary, BazelCommandExecutor, BazelExecutableSetting};
pub use info::InfoCommand;
pub use launcher::{DebugTarget, Launcher, LauncherBuilder, RunCommand, TestCommand};
pub use query::{QueryCommand, QueryForTargetProtoCommand};
pub use version::VersionCommand;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BazelVerb {
    Build,
    Query,
    Info,
    Run,
    Test,
    Clean,
    Version,
}

impl BazelVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            BazelVerb::Build => "build",
            BazelVerb::Query => "query",
            BazelVerb::Info => "info",
            BazelVerb::Run => "run",
            BazelVerb::Test => "test",
            BazelVerb::Clean => "clean",
            BazelVerb::Version => "version",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BazelCommandLineToolConfigurationError {
    #[error("The path to the bazel executable has not been set")]
    NotSet,
    #[error("The bazel executable {0:?} does not exist")]
    NotFound(PathBuf),
    #[error("The bazel executable {0:?} can not be executed")]
    NotExecutable(PathBuf),
    #[error("Bazel {found} is too old, at least {minimum} is required")]
    TooOld {
        found: String,
        minimum: BazelVersion,
    },
}

#[derive(Error, Debug)]
pub enum BazelCommandError {
    #[error(transparent)]
    Configuration(#[from] BazelCommandLineToolConfigurationError),
    #[error(transparent)]
    Execution(ExecutionError),
    #[error("Cancelled `{command}`")]
    Cancelled { command: String },
    #[error("`bazel {verb}` failed with exit code {exit_code}: {stderr}")]
    ExecutionFailed {
        verb: &'static str,
        exit_code: i32,
        stderr: String,
    },
    #[error("Unable to use temporary file: {0}")]
    TempFile(#[from] std::io::Error),
    #[error("Unable to launch: {0}")]
    Launcher(String),
    #[error(transparent)]
    Label(#[from] LabelError),
    #[error("Unable to read `bazel {verb}` output: {message}")]
    Output {
        verb: &'static str,
        message: String,
    },
}

impl From<ExecutionError> for BazelCommandError {
    fn from(e: ExecutionError) -> Self {
        match e {
            ExecutionError::Cancelled { command } => BazelCommandError::Cancelled { command },
            other => BazelCommandError::Execution(other),
        }
    }
}

impl BazelCommandError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BazelCommandError::Cancelled { .. })
    }

    pub(crate) fn failed(verb: BazelVerb, result: &ProcessResult) -> Self {
        BazelCommandError::ExecutionFailed {
            verb: verb.as_str(),
            exit_code: result.exit_code,
            stderr: result.stderr.trim().to_string(),
        }
    }
}

/// One bazel invocation. The executor prepares the command line, runs it and
/// hands the process result back, consuming the command so it can not be reused.
pub trait BazelCommand: Send {
    type Output;

    fn verb(&self) -> BazelVerb;

    fn working_directory(&self) -> &Path;

    fn startup_args(&self) -> Vec<String> {
        Vec::new()
    }

    /// Everything after the verb. Temp files the command needs are created here.
    fn prepare_command_line(
        &mut self,
        version: &BazelVersion,
    ) -> Result<Vec<String>, BazelCommandError>;

    /// When set, stdout is written to this file instead of being captured.
    fn stdout_file(&self) -> Option<PathBuf> {
        None
    }

    fn take_stdout_selector(&mut self) -> Option<Box<dyn LineSelector>> {
        None
    }

    fn take_stderr_selector(&mut self) -> Option<Box<dyn LineSelector>> {
        None
    }

    /// Run this program with the prepared arguments instead of bazel.
    fn launch_executable(&self) -> Option<PathBuf> {
        None
    }

    fn console_name(&self) -> &str {
        "bazel"
    }

    fn generate_result(self, result: ProcessResult) -> Result<Self::Output, BazelCommandError>;
}

pub(crate) fn temp_file(prefix: &str, suffix: &str) -> std::io::Result<tempfile::NamedTempFile> {
    tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile()
}
