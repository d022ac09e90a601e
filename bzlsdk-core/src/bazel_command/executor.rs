use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bzlsdk_bazel_wrapper::bazel_subprocess_wrapper::{
    CommandConsoleFactory, ProcessInvocation, ProcessRunner, StdoutSink, WorkProgressMonitor,
};
use tokio::sync::watch;

use super::{BazelCommand, BazelCommandError, BazelCommandLineToolConfigurationError};
use crate::model::BazelVersion;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BazelBinary {
    pub executable: PathBuf,
    /// Known once a version check has run against this executable.
    pub version: Option<BazelVersion>,
}

/// The bazel binary shared by every runner. Updates are visible to all holders
/// immediately, and `subscribe` lets a runner notice that the binary changed.
#[derive(Clone, Debug)]
pub struct BazelExecutableSetting {
    sender: Arc<watch::Sender<Option<BazelBinary>>>,
}

impl BazelExecutableSetting {
    pub fn new(executable: Option<PathBuf>) -> Self {
        let (sender, _) = watch::channel(executable.map(|executable| BazelBinary {
            executable,
            version: None,
        }));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn set_executable(&self, executable: PathBuf) {
        info!("Bazel executable set to {:?}", executable);
        self.sender.send_replace(Some(BazelBinary {
            executable,
            version: None,
        }));
    }

    /// Remembers the version of `executable`, ignored if the setting moved on meanwhile.
    pub fn record_version(&self, executable: &Path, version: BazelVersion) {
        self.sender.send_if_modified(|current| match current {
            Some(binary) if binary.executable == executable => {
                let changed = binary.version.as_ref() != Some(&version);
                binary.version = Some(version);
                changed
            }
            _ => false,
        });
    }

    pub fn current(&self) -> Option<BazelBinary> {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<BazelBinary>> {
        self.sender.subscribe()
    }
}

pub fn validate_executable(path: &Path) -> Result<(), BazelCommandLineToolConfigurationError> {
    let metadata = std::fs::metadata(path)
        .map_err(|_| BazelCommandLineToolConfigurationError::NotFound(path.to_path_buf()))?;
    if !metadata.is_file() {
        return Err(BazelCommandLineToolConfigurationError::NotExecutable(
            path.to_path_buf(),
        ));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(BazelCommandLineToolConfigurationError::NotExecutable(
                path.to_path_buf(),
            ));
        }
    }
    Ok(())
}

/// Turns commands into process invocations and feeds the results back.
#[derive(Clone)]
pub struct BazelCommandExecutor {
    runner: Arc<dyn ProcessRunner>,
    setting: BazelExecutableSetting,
    env: BTreeMap<String, String>,
    console_factory: Option<Arc<dyn CommandConsoleFactory>>,
}

impl std::fmt::Debug for BazelCommandExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BazelCommandExecutor")
            .field("setting", &self.setting)
            .field("env", &self.env)
            .finish()
    }
}

impl BazelCommandExecutor {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        setting: BazelExecutableSetting,
        env: BTreeMap<String, String>,
    ) -> Self {
        Self {
            runner,
            setting,
            env,
            console_factory: None,
        }
    }

    pub fn with_console_factory(mut self, console_factory: Arc<dyn CommandConsoleFactory>) -> Self {
        self.console_factory = Some(console_factory);
        self
    }

    pub fn setting(&self) -> &BazelExecutableSetting {
        &self.setting
    }

    /// The configured binary, checked to exist and be executable.
    pub fn bazel_binary(&self) -> Result<BazelBinary, BazelCommandLineToolConfigurationError> {
        let binary = self
            .setting
            .current()
            .ok_or(BazelCommandLineToolConfigurationError::NotSet)?;
        validate_executable(&binary.executable)?;
        Ok(binary)
    }

    pub async fn execute<C: BazelCommand>(
        &self,
        mut command: C,
        monitor: &dyn WorkProgressMonitor,
    ) -> Result<C::Output, BazelCommandError> {
        let verb = command.verb();
        let (executable, version, direct_launch) = match command.launch_executable() {
            Some(launch) => {
                let version = self
                    .setting
                    .current()
                    .and_then(|b| b.version)
                    .unwrap_or_default();
                (launch, version, true)
            }
            None => {
                let binary = self.bazel_binary()?;
                (binary.executable, binary.version.unwrap_or_default(), false)
            }
        };

        let args = command.prepare_command_line(&version)?;
        let mut argv = vec![executable.to_string_lossy().to_string()];
        if !direct_launch {
            argv.extend(command.startup_args());
            argv.push(verb.as_str().to_string());
        }
        argv.extend(args);

        let mut invocation = ProcessInvocation::new(argv, command.working_directory());
        invocation.env = self.env.clone();
        if let Some(path) = command.stdout_file() {
            invocation.stdout = StdoutSink::File(path);
        }
        invocation.stdout_selector = command.take_stdout_selector();
        invocation.stderr_selector = command.take_stderr_selector();
        invocation.console = self
            .console_factory
            .as_ref()
            .map(|factory| factory.get(command.console_name()));

        debug!("Running {}", invocation.command_line());
        monitor.sub_task(&format!("bazel {}", verb.as_str()));
        let result = self.runner.run(invocation, monitor).await?;
        command.generate_result(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bazel_command::{CleanCommand, RunCommand, VersionCommand};
    use crate::label_utils::BazelLabel;
    use crate::test_tools::{fake_bazel_binary, FakeProcessRunner, ScriptedOutput};
    use bzlsdk_bazel_wrapper::bazel_subprocess_wrapper::NullProgressMonitor;

    #[test]
    fn test_validate_executable() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("bazel");
        assert_eq!(
            validate_executable(&missing),
            Err(BazelCommandLineToolConfigurationError::NotFound(missing.clone()))
        );

        std::fs::write(&missing, "#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        assert_eq!(
            validate_executable(&missing),
            Err(BazelCommandLineToolConfigurationError::NotExecutable(missing.clone()))
        );

        let bazel = fake_bazel_binary(dir.path());
        assert_eq!(validate_executable(&bazel), Ok(()));
        assert!(validate_executable(dir.path()).is_err());
    }

    #[test]
    fn test_setting_notifies_subscribers() {
        let setting = BazelExecutableSetting::new(None);
        let mut rx = setting.subscribe();
        assert_eq!(setting.current(), None);

        setting.set_executable(PathBuf::from("/opt/bazel"));
        assert!(rx.has_changed().unwrap());
        rx.mark_unchanged();

        setting.record_version(Path::new("/opt/bazel"), BazelVersion::new(6, 4, 0));
        assert!(rx.has_changed().unwrap());
        assert_eq!(
            setting.current().unwrap().version,
            Some(BazelVersion::new(6, 4, 0))
        );
        rx.mark_unchanged();

        setting.record_version(Path::new("/somewhere/else"), BazelVersion::new(7, 0, 0));
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_unset_binary_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(FakeProcessRunner::default());
        let executor = BazelCommandExecutor::new(
            runner.clone(),
            BazelExecutableSetting::new(None),
            BTreeMap::default(),
        );

        let err = executor
            .execute(CleanCommand::new(dir.path()), &NullProgressMonitor::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BazelCommandError::Configuration(BazelCommandLineToolConfigurationError::NotSet)
        ));
        assert_eq!(runner.invocation_count(), 0);
    }

    #[tokio::test]
    async fn test_prepends_binary_and_passes_env() {
        let dir = tempfile::tempdir().unwrap();
        let bazel = fake_bazel_binary(dir.path());
        let runner = Arc::new(FakeProcessRunner::default());
        runner.push_response(ScriptedOutput::stdout(0, "Build label: 6.4.0\n"));
        let mut env = BTreeMap::default();
        env.insert(String::from("PULLER_TIMEOUT"), String::from("3000"));
        let executor = BazelCommandExecutor::new(
            runner.clone(),
            BazelExecutableSetting::new(Some(bazel.clone())),
            env,
        );

        let version = executor
            .execute(VersionCommand::new(dir.path()), &NullProgressMonitor::default())
            .await
            .unwrap();

        assert_eq!(version, Some(BazelVersion::new(6, 4, 0)));
        let recorded = runner.invocations();
        assert_eq!(
            recorded[0].argv,
            vec![bazel.to_string_lossy().to_string(), String::from("version")]
        );
        assert_eq!(
            recorded[0].env.get("PULLER_TIMEOUT").map(|s| s.as_str()),
            Some("3000")
        );
    }

    #[tokio::test]
    async fn test_launch_executable_skips_bazel() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(FakeProcessRunner::default());
        runner.push_response(ScriptedOutput::stdout(0, "hello\n"));
        let executor = BazelCommandExecutor::new(
            runner.clone(),
            BazelExecutableSetting::new(None),
            BTreeMap::default(),
        );

        let command = RunCommand::new(
            dir.path(),
            BazelLabel::parse("//app:main").unwrap(),
            vec![String::from("--flag")],
            None,
        )
        .unwrap();
        executor
            .execute(command, &NullProgressMonitor::default())
            .await
            .unwrap();

        let recorded = runner.invocations();
        assert!(recorded[0].argv[0].ends_with("bazel-bin/app/main"));
        assert_eq!(recorded[0].argv[1], "--flag");
    }
}
