use std::path::{Path, PathBuf};

use bzlsdk_bazel_wrapper::bazel_subprocess_wrapper::ProcessResult;

use super::{BazelCommand, BazelCommandError, BazelVerb};
use crate::label_utils::BazelLabel;
use crate::model::{BazelVersion, TargetKindRegistry};

/// Where a launched JVM should connect its debugger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DebugTarget {
    pub host: String,
    pub port: u16,
}

impl DebugTarget {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }
}

fn concrete_label(label: &BazelLabel) -> Result<(), BazelCommandError> {
    if !label.is_concrete() {
        return Err(BazelCommandError::Launcher(format!(
            "`{}` does not name a single target",
            label
        )));
    }
    Ok(())
}

/// Runs the launcher script bazel leaves in `bazel-bin` instead of going
/// through `bazel run`, so only one process has to be managed.
#[derive(Debug)]
pub struct RunCommand {
    working_directory: PathBuf,
    executable: PathBuf,
    args: Vec<String>,
}

impl RunCommand {
    pub fn new(
        workspace_root: &Path,
        label: BazelLabel,
        args: Vec<String>,
        debug_port: Option<u16>,
    ) -> Result<Self, BazelCommandError> {
        concrete_label(&label)?;
        let target_name = label.target_name().unwrap_or_else(|| label.package_name());

        let mut executable = workspace_root.join("bazel-bin");
        for segment in label.package_path().split('/').filter(|s| !s.is_empty()) {
            executable.push(segment);
        }
        if cfg!(windows) {
            executable.push(format!("{}.exe", target_name));
        } else {
            executable.push(target_name);
        }
        if executable.exists() {
            info!("Launch executable: {:?}", executable);
        } else {
            error!("Launch executable does not exist: {:?}", executable);
        }

        let mut launch_args = Vec::new();
        if let Some(port) = debug_port {
            launch_args.push(format!("--debug={}", port));
        }
        launch_args.extend(args);

        Ok(Self {
            working_directory: workspace_root.to_path_buf(),
            executable,
            args: launch_args,
        })
    }
}

impl BazelCommand for RunCommand {
    type Output = ProcessResult;

    fn verb(&self) -> BazelVerb {
        BazelVerb::Run
    }

    fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    fn prepare_command_line(
        &mut self,
        _version: &BazelVersion,
    ) -> Result<Vec<String>, BazelCommandError> {
        Ok(self.args.clone())
    }

    fn launch_executable(&self) -> Option<PathBuf> {
        Some(self.executable.clone())
    }

    fn console_name(&self) -> &str {
        "bazel run"
    }

    // The exit code belongs to the launched program, not to us.
    fn generate_result(self, result: ProcessResult) -> Result<Self::Output, BazelCommandError> {
        Ok(result)
    }
}

#[derive(Debug)]
pub struct TestCommand {
    working_directory: PathBuf,
    label: BazelLabel,
    args: Vec<String>,
    debug: Option<DebugTarget>,
}

impl TestCommand {
    pub fn new(
        working_directory: &Path,
        label: BazelLabel,
        args: Vec<String>,
        debug: Option<DebugTarget>,
    ) -> Self {
        Self {
            working_directory: working_directory.to_path_buf(),
            label,
            args,
            debug,
        }
    }
}

impl BazelCommand for TestCommand {
    type Output = ProcessResult;

    fn verb(&self) -> BazelVerb {
        BazelVerb::Test
    }

    fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    fn prepare_command_line(
        &mut self,
        _version: &BazelVersion,
    ) -> Result<Vec<String>, BazelCommandError> {
        let mut args: Vec<String> = [
            "--test_output=streamed",
            "--test_strategy=exclusive",
            "--test_timeout=9999",
            "--nocache_test_results",
            "--runs_per_test=1",
            "--flaky_test_attempts=1",
        ]
        .iter()
        .map(|a| a.to_string())
        .collect();
        args.extend(self.args.iter().cloned());
        if let Some(debug) = self.debug.as_ref() {
            args.push(format!(
                "--test_arg=--wrapper_script_flag=--debug={}:{}",
                debug.host, debug.port
            ));
        }
        args.push(String::from("--"));
        args.push(self.label.to_string());
        Ok(args)
    }

    fn console_name(&self) -> &str {
        "bazel test"
    }

    fn generate_result(self, result: ProcessResult) -> Result<Self::Output, BazelCommandError> {
        Ok(result)
    }
}

#[derive(Debug)]
pub enum Launcher {
    Run(RunCommand),
    Test(TestCommand),
}

impl BazelCommand for Launcher {
    type Output = ProcessResult;

    fn verb(&self) -> BazelVerb {
        match self {
            Launcher::Run(c) => c.verb(),
            Launcher::Test(c) => c.verb(),
        }
    }

    fn working_directory(&self) -> &Path {
        match self {
            Launcher::Run(c) => c.working_directory(),
            Launcher::Test(c) => c.working_directory(),
        }
    }

    fn prepare_command_line(
        &mut self,
        version: &BazelVersion,
    ) -> Result<Vec<String>, BazelCommandError> {
        match self {
            Launcher::Run(c) => c.prepare_command_line(version),
            Launcher::Test(c) => c.prepare_command_line(version),
        }
    }

    fn launch_executable(&self) -> Option<PathBuf> {
        match self {
            Launcher::Run(c) => c.launch_executable(),
            Launcher::Test(c) => c.launch_executable(),
        }
    }

    fn console_name(&self) -> &str {
        match self {
            Launcher::Run(c) => c.console_name(),
            Launcher::Test(c) => c.console_name(),
        }
    }

    fn generate_result(self, result: ProcessResult) -> Result<Self::Output, BazelCommandError> {
        match self {
            Launcher::Run(c) => c.generate_result(result),
            Launcher::Test(c) => c.generate_result(result),
        }
    }
}

/// Picks `bazel test` or a direct run for a target based on its rule kind.
#[derive(Debug)]
pub struct LauncherBuilder<'a> {
    registry: &'a TargetKindRegistry,
    workspace_root: PathBuf,
    label: Option<BazelLabel>,
    kind: Option<String>,
    args: Vec<String>,
    debug: Option<DebugTarget>,
}

impl<'a> LauncherBuilder<'a> {
    pub fn new(registry: &'a TargetKindRegistry, workspace_root: &Path) -> Self {
        Self {
            registry,
            workspace_root: workspace_root.to_path_buf(),
            label: None,
            kind: None,
            args: Vec::new(),
            debug: None,
        }
    }

    pub fn label(mut self, label: BazelLabel) -> Self {
        self.label = Some(label);
        self
    }

    pub fn target_kind(mut self, kind: &str) -> Self {
        self.kind = Some(kind.to_string());
        self
    }

    pub fn args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn debug(mut self, debug: DebugTarget) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn build(self) -> Result<Launcher, BazelCommandError> {
        let label = self
            .label
            .ok_or_else(|| BazelCommandError::Launcher(String::from("no target label set")))?;
        let kind_name = self
            .kind
            .ok_or_else(|| BazelCommandError::Launcher(format!("no target kind set for {}", label)))?;
        concrete_label(&label)?;

        let kind = self.registry.get(&kind_name).ok_or_else(|| {
            BazelCommandError::Launcher(format!("unknown target kind `{}` for {}", kind_name, label))
        })?;
        if kind.testable {
            Ok(Launcher::Test(TestCommand::new(
                &self.workspace_root,
                label,
                self.args,
                self.debug,
            )))
        } else if kind.runnable {
            Ok(Launcher::Run(RunCommand::new(
                &self.workspace_root,
                label,
                self.args,
                self.debug.map(|d| d.port),
            )?))
        } else {
            Err(BazelCommandError::Launcher(format!(
                "{} is a `{}`, which can not be launched",
                label, kind.name
            )))
        }
    }
}
