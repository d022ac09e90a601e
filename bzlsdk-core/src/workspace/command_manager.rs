use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bzlsdk_bazel_wrapper::bazel_subprocess_wrapper::{
    CommandConsoleFactory, ProcessRunner, SubprocessRunner,
};
use tokio::sync::Mutex;

use super::{
    BazelGlobalCommandRunner, BazelWorkspace, BazelWorkspaceCommandRunner, WorkspaceCommandError,
};
use crate::bazel_command::{BazelCommandExecutor, BazelExecutableSetting};
use crate::config::Config;

/// Entry point for running bazel: owns the bazel binary setting and hands out
/// one command runner per workspace root.
pub struct BazelCommandManager {
    config: Config,
    setting: BazelExecutableSetting,
    process_runner: Arc<dyn ProcessRunner>,
    console_factory: Option<Arc<dyn CommandConsoleFactory>>,
    global_runner: BazelGlobalCommandRunner,
    workspace_runners: Mutex<HashMap<PathBuf, Arc<BazelWorkspaceCommandRunner>>>,
}

impl BazelCommandManager {
    pub fn new(config: Config) -> Self {
        let runner = Arc::new(SubprocessRunner::new(config.wrap_execution_into_shell));
        Self::with_process_runner(config, runner)
    }

    pub fn with_process_runner(config: Config, process_runner: Arc<dyn ProcessRunner>) -> Self {
        let setting = BazelExecutableSetting::new(Some(config.bazel_executable.clone()));
        let global_runner = BazelGlobalCommandRunner::new(BazelCommandExecutor::new(
            process_runner.clone(),
            setting.clone(),
            config.bazel_env(),
        ));
        Self {
            config,
            setting,
            process_runner,
            console_factory: None,
            global_runner,
            workspace_runners: Mutex::new(HashMap::default()),
        }
    }

    /// Output of workspace commands goes to consoles made by `factory`. Only
    /// affects runners created afterwards.
    pub fn with_console_factory(mut self, factory: Arc<dyn CommandConsoleFactory>) -> Self {
        self.console_factory = Some(factory);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn global_runner(&self) -> &BazelGlobalCommandRunner {
        &self.global_runner
    }

    pub fn set_bazel_executable(&self, executable: PathBuf) {
        self.setting.set_executable(executable);
    }

    pub fn bazel_executable(&self) -> Option<PathBuf> {
        self.setting.current().map(|b| b.executable)
    }

    fn executor(&self) -> BazelCommandExecutor {
        let executor = BazelCommandExecutor::new(
            self.process_runner.clone(),
            self.setting.clone(),
            self.config.bazel_env(),
        );
        match self.console_factory.as_ref() {
            Some(factory) => executor.with_console_factory(factory.clone()),
            None => executor,
        }
    }

    /// The runner for the workspace rooted at `workspace_root`, created on first use.
    pub async fn workspace_command_runner(
        &self,
        workspace_root: &Path,
    ) -> Result<Arc<BazelWorkspaceCommandRunner>, WorkspaceCommandError> {
        let workspace = BazelWorkspace::open(workspace_root)?;
        let mut runners = self.workspace_runners.lock().await;
        if let Some(runner) = runners.get(workspace.root()) {
            return Ok(runner.clone());
        }

        debug!("Creating command runner for {:?}", workspace.root());
        let root = workspace.root().to_path_buf();
        let runner = Arc::new(BazelWorkspaceCommandRunner::new(
            workspace,
            self.executor(),
            &self.config,
        ));
        runners.insert(root, runner.clone());
        Ok(runner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_tools::{fake_bazel_binary, fake_workspace, FakeProcessRunner, ScriptedOutput};
    use bzlsdk_bazel_wrapper::bazel_subprocess_wrapper::NullProgressMonitor;

    fn manager(runner: Arc<FakeProcessRunner>) -> BazelCommandManager {
        BazelCommandManager::with_process_runner(Config::default(), runner)
    }

    #[tokio::test]
    async fn test_one_runner_per_workspace() {
        let manager = manager(Arc::new(FakeProcessRunner::default()));
        let first = fake_workspace();
        let second = fake_workspace();
        std::fs::create_dir(first.path().join("sub")).unwrap();

        let a = manager.workspace_command_runner(first.path()).await.unwrap();
        let b = manager
            .workspace_command_runner(&first.path().join("sub").join(".."))
            .await
            .unwrap();
        let c = manager.workspace_command_runner(second.path()).await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn test_non_workspace_is_rejected() {
        let manager = manager(Arc::new(FakeProcessRunner::default()));
        let dir = tempfile::tempdir().unwrap();
        let err = manager.workspace_command_runner(dir.path()).await.unwrap_err();
        assert!(matches!(err, WorkspaceCommandError::NotAWorkspace(_)));
    }

    #[tokio::test]
    async fn test_executable_setting_is_shared() {
        let runner = Arc::new(FakeProcessRunner::default());
        let manager = manager(runner.clone());
        let workspace = fake_workspace();
        let workspace_runner = manager
            .workspace_command_runner(workspace.path())
            .await
            .unwrap();

        let bazel = fake_bazel_binary(workspace.path());
        manager.set_bazel_executable(bazel.clone());
        assert_eq!(manager.bazel_executable(), Some(bazel.clone()));

        runner.push_response(ScriptedOutput::stdout(0, "Build label: 6.4.0\n"));
        let version = workspace_runner
            .run_bazel_version_check(&NullProgressMonitor::default())
            .await
            .unwrap();
        assert_eq!(version.to_string(), "6.4.0");
        assert_eq!(runner.invocations()[0].argv[0], bazel.to_string_lossy());
        assert_eq!(
            manager.setting.current().and_then(|b| b.version),
            Some(version)
        );
    }
}
