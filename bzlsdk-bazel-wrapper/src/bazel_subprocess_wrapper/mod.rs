use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

mod bazel_wrapper_error;
pub mod progress;
pub mod shell;
mod subprocess_runner;

pub use bazel_wrapper_error::ExecutionError;
pub use progress::{
    CommandConsole, CommandConsoleFactory, LogConsole, LogConsoleFactory, NullProgressMonitor,
    WorkProgressMonitor,
};
pub use subprocess_runner::SubprocessRunner;

/// How often a running child is checked for completion and cancellation.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Picks the lines of a stream worth keeping, optionally rewriting them.
/// Selectors see every line in order and may carry state between lines.
pub trait LineSelector: Send {
    fn select(&mut self, line: &str) -> Option<String>;
}

impl<F> LineSelector for F
where
    F: FnMut(&str) -> Option<String> + Send,
{
    fn select(&mut self, line: &str) -> Option<String> {
        self(line)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StdoutSink {
    Capture,
    /// Raw bytes are written to this file, nothing is captured.
    File(PathBuf),
}

pub struct ProcessInvocation {
    pub argv: Vec<String>,
    pub working_directory: PathBuf,
    pub env: BTreeMap<String, String>,
    pub stdout: StdoutSink,
    pub stdout_selector: Option<Box<dyn LineSelector>>,
    pub stderr_selector: Option<Box<dyn LineSelector>>,
    pub console: Option<Arc<dyn CommandConsole>>,
}

impl std::fmt::Debug for ProcessInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessInvocation")
            .field("argv", &self.argv)
            .field("working_directory", &self.working_directory)
            .field("env", &self.env)
            .field("stdout", &self.stdout)
            .finish()
    }
}

impl ProcessInvocation {
    pub fn new(argv: Vec<String>, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            argv,
            working_directory: working_directory.into(),
            env: BTreeMap::default(),
            stdout: StdoutSink::Capture,
            stdout_selector: None,
            stderr_selector: None,
            console: None,
        }
    }

    pub fn command_line(&self) -> String {
        shell::to_quoted_string_for_shell(&self.argv)
    }

    /// Completes this invocation from output produced without a real process,
    /// applying the same sinks and selectors a subprocess run would. Used by
    /// process runner test doubles.
    pub fn simulate_output(
        self,
        exit_code: i32,
        stdout: &[u8],
        stderr: &str,
    ) -> Result<ProcessResult, ExecutionError> {
        let command = self.command_line();
        let mut out = LineCollector::new(self.stdout_selector, self.console.clone(), false);
        let mut err = LineCollector::new(self.stderr_selector, self.console, true);

        let redirected = match &self.stdout {
            StdoutSink::File(path) => {
                std::fs::write(path, stdout)
                    .map_err(|source| ExecutionError::Io { command, source })?;
                true
            }
            StdoutSink::Capture => {
                for line in String::from_utf8_lossy(stdout).lines() {
                    out.push(line);
                }
                false
            }
        };
        for line in stderr.lines() {
            err.push(line);
        }

        let (stdout_text, selected_stdout_lines) = out.finish();
        let (stderr, selected_stderr_lines) = err.finish();
        Ok(ProcessResult {
            exit_code,
            stdout: if redirected { None } else { Some(stdout_text) },
            stderr,
            selected_stdout_lines,
            selected_stderr_lines,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessResult {
    pub exit_code: i32,
    /// None when stdout was redirected to a file.
    pub stdout: Option<String>,
    pub stderr: String,
    pub selected_stdout_lines: Vec<String>,
    pub selected_stderr_lines: Vec<String>,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Seam between the command layer and real processes, so tests can simulate bazel.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        invocation: ProcessInvocation,
        monitor: &dyn WorkProgressMonitor,
    ) -> Result<ProcessResult, ExecutionError>;
}

// Without a selector every line is kept.
pub(crate) struct LineCollector {
    selector: Option<Box<dyn LineSelector>>,
    console: Option<Arc<dyn CommandConsole>>,
    is_stderr: bool,
    captured: String,
    selected: Vec<String>,
}

impl LineCollector {
    pub(crate) fn new(
        selector: Option<Box<dyn LineSelector>>,
        console: Option<Arc<dyn CommandConsole>>,
        is_stderr: bool,
    ) -> Self {
        Self {
            selector,
            console,
            is_stderr,
            captured: String::new(),
            selected: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, line: &str) {
        self.captured.push_str(line);
        self.captured.push('\n');

        let kept = match self.selector.as_mut() {
            Some(selector) => selector.select(line),
            None => Some(line.to_string()),
        };
        if let Some(kept) = kept {
            if let Some(console) = self.console.as_ref() {
                if self.is_stderr {
                    console.print_error(&kept);
                } else {
                    console.print_output(&kept);
                }
            }
            self.selected.push(kept);
        }
    }

    pub(crate) fn finish(self) -> (String, Vec<String>) {
        (self.captured, self.selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingConsole {
        lines: Mutex<Vec<String>>,
    }

    impl CommandConsole for RecordingConsole {
        fn print_output(&self, line: &str) {
            self.lines.lock().unwrap().push(format!("out:{}", line));
        }
        fn print_error(&self, line: &str) {
            self.lines.lock().unwrap().push(format!("err:{}", line));
        }
    }

    #[test]
    fn simulated_output_applies_selectors() {
        let mut invocation = ProcessInvocation::new(vec![String::from("bazel")], "/tmp");
        invocation.stdout_selector = Some(Box::new(|l: &str| {
            l.strip_prefix("Build label: ").map(|v| v.to_string())
        }));

        let result = invocation
            .simulate_output(0, b"Build label: 6.4.0\nBuild time: x\n", "warming up\n")
            .unwrap();

        assert_eq!(result.selected_stdout_lines, vec!["6.4.0"]);
        assert_eq!(result.selected_stderr_lines, vec!["warming up"]);
        assert_eq!(
            result.stdout.as_deref(),
            Some("Build label: 6.4.0\nBuild time: x\n")
        );
    }

    #[test]
    fn simulated_output_honours_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");
        let mut invocation = ProcessInvocation::new(vec![String::from("bazel")], dir.path());
        invocation.stdout = StdoutSink::File(target.clone());

        let result = invocation.simulate_output(0, &[1, 2, 3], "").unwrap();

        assert_eq!(result.stdout, None);
        assert!(result.selected_stdout_lines.is_empty());
        assert_eq!(std::fs::read(target).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn console_receives_selected_lines_only() {
        let console = Arc::new(RecordingConsole::default());
        let mut collector = LineCollector::new(
            Some(Box::new(|l: &str| {
                if l.starts_with("ERROR") {
                    Some(l.to_string())
                } else {
                    None
                }
            })),
            Some(console.clone()),
            true,
        );
        collector.push("INFO: fine");
        collector.push("ERROR: broken");

        let (captured, selected) = collector.finish();
        assert_eq!(captured, "INFO: fine\nERROR: broken\n");
        assert_eq!(selected, vec!["ERROR: broken"]);
        assert_eq!(*console.lines.lock().unwrap(), vec!["err:ERROR: broken"]);
    }
}
