use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bzlsdk_bazel_wrapper::bazel_subprocess_wrapper::{ExecutionError, WorkProgressMonitor};

use super::WorkspaceCommandError;
use crate::bazel_command::{
    BazelCommandError, BazelCommandExecutor, BazelCommandLineToolConfigurationError,
    InfoCommand, VersionCommand,
};
use crate::model::BazelVersion;

/// Checks that the configured binary runs and is recent enough, remembering
/// the version it reported.
pub(crate) async fn check_bazel_version(
    executor: &BazelCommandExecutor,
    working_directory: &Path,
    monitor: &dyn WorkProgressMonitor,
) -> Result<BazelVersion, WorkspaceCommandError> {
    let binary = executor.bazel_binary()?;
    let not_executable =
        || BazelCommandLineToolConfigurationError::NotExecutable(binary.executable.clone());

    let version = match executor
        .execute(VersionCommand::new(working_directory), monitor)
        .await
    {
        Ok(version) => version,
        Err(BazelCommandError::ExecutionFailed { exit_code, .. }) => {
            warn!("{:?} version exited with {}", binary.executable, exit_code);
            return Err(not_executable().into());
        }
        Err(BazelCommandError::Execution(ExecutionError::Spawn { source, .. })) => {
            warn!("Unable to start {:?}: {}", binary.executable, source);
            return Err(not_executable().into());
        }
        Err(e) => return Err(e.into()),
    };

    let version = version.ok_or_else(|| BazelCommandLineToolConfigurationError::TooOld {
        found: String::from("unknown"),
        minimum: BazelVersion::MINIMUM,
    })?;
    if !version.is_supported() {
        return Err(BazelCommandLineToolConfigurationError::TooOld {
            found: version.to_string(),
            minimum: BazelVersion::MINIMUM,
        }
        .into());
    }
    info!("Using bazel {} from {:?}", version, binary.executable);
    executor
        .setting()
        .record_version(&binary.executable, version.clone());
    Ok(version)
}

/// Runs the commands that do not need a workspace.
#[derive(Debug, Clone)]
pub struct BazelGlobalCommandRunner {
    executor: BazelCommandExecutor,
    working_directory: PathBuf,
}

impl BazelGlobalCommandRunner {
    pub fn new(executor: BazelCommandExecutor) -> Self {
        Self {
            executor,
            working_directory: std::env::temp_dir(),
        }
    }

    pub async fn run_bazel_version_check(
        &self,
        monitor: &dyn WorkProgressMonitor,
    ) -> Result<BazelVersion, WorkspaceCommandError> {
        check_bazel_version(&self.executor, &self.working_directory, monitor).await
    }

    pub async fn run_bazel_info(
        &self,
        key: Option<&str>,
        monitor: &dyn WorkProgressMonitor,
    ) -> Result<BTreeMap<String, String>, WorkspaceCommandError> {
        Ok(self
            .executor
            .execute(InfoCommand::new(&self.working_directory, key), monitor)
            .await?)
    }
}
