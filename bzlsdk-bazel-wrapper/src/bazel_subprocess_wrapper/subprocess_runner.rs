use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use super::{
    shell, ExecutionError, LineCollector, ProcessInvocation, ProcessResult, ProcessRunner,
    StdoutSink, WorkProgressMonitor, POLL_INTERVAL,
};

type DrainResult = std::io::Result<(Option<String>, Vec<String>)>;

/// Runs invocations as real child processes.
#[derive(Clone, Debug)]
pub struct SubprocessRunner {
    wrap_execution_into_shell: bool,
}

impl Default for SubprocessRunner {
    fn default() -> Self {
        Self {
            wrap_execution_into_shell: !cfg!(windows),
        }
    }
}

impl SubprocessRunner {
    pub fn new(wrap_execution_into_shell: bool) -> Self {
        Self {
            wrap_execution_into_shell,
        }
    }

    pub fn wraps_execution_into_shell(&self) -> bool {
        self.wrap_execution_into_shell
    }
}

#[async_trait]
impl ProcessRunner for SubprocessRunner {
    async fn run(
        &self,
        invocation: ProcessInvocation,
        monitor: &dyn WorkProgressMonitor,
    ) -> Result<ProcessResult, ExecutionError> {
        let command_line = invocation.command_line();
        let ProcessInvocation {
            argv,
            working_directory,
            env,
            stdout,
            stdout_selector,
            stderr_selector,
            console,
        } = invocation;

        if argv.is_empty() {
            return Err(ExecutionError::EmptyCommandLine);
        }
        if monitor.is_canceled() {
            return Err(ExecutionError::Cancelled {
                command: command_line,
            });
        }

        let argv = if self.wrap_execution_into_shell {
            shell::wrap_execution_into_shell(&argv)?
        } else {
            argv
        };
        debug!("Executing {:?} in {:?}", argv, working_directory);

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .current_dir(&working_directory)
            .envs(&env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so cancelling also takes down whatever the shell spawned.
        #[cfg(unix)]
        cmd.process_group(0);

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|source| ExecutionError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        let child_stdout = child.stdout.take();
        let child_stderr = child.stderr.take();
        let (child_stdout, child_stderr) = match (child_stdout, child_stderr) {
            (Some(o), Some(e)) => (o, e),
            _ => {
                kill_process_tree(&mut child).await;
                return Err(ExecutionError::Io {
                    command: command_line,
                    source: std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        "child pipes were not captured",
                    ),
                });
            }
        };

        let stdout_task: JoinHandle<DrainResult> = {
            let collector = LineCollector::new(stdout_selector, console.clone(), false);
            tokio::spawn(async move {
                match stdout {
                    StdoutSink::File(path) => copy_to_file(child_stdout, path).await,
                    StdoutSink::Capture => drain_lines(child_stdout, collector).await,
                }
            })
        };
        let stderr_task: JoinHandle<DrainResult> = {
            let collector = LineCollector::new(stderr_selector, console, true);
            tokio::spawn(drain_lines(child_stderr, collector))
        };

        let status = loop {
            match tokio::time::timeout(POLL_INTERVAL, child.wait()).await {
                Ok(Ok(status)) => break status,
                Ok(Err(source)) => {
                    kill_process_tree(&mut child).await;
                    stdout_task.abort();
                    stderr_task.abort();
                    return Err(ExecutionError::Io {
                        command: command_line,
                        source,
                    });
                }
                Err(_elapsed) => {
                    if monitor.is_canceled() {
                        info!("Cancelling `{}`", command_line);
                        kill_process_tree(&mut child).await;
                        stdout_task.abort();
                        stderr_task.abort();
                        return Err(ExecutionError::Cancelled {
                            command: command_line,
                        });
                    }
                }
            }
        };

        let (stdout, selected_stdout_lines) = join_drain(stdout_task, &command_line).await?;
        let (stderr, selected_stderr_lines) = join_drain(stderr_task, &command_line).await?;
        let exit_code = status.code().unwrap_or(-1);

        info!(
            "Finished `{}` with exit code {} in {}",
            command_line,
            exit_code,
            humantime::format_duration(std::time::Duration::from_millis(
                started.elapsed().as_millis() as u64
            ))
        );

        Ok(ProcessResult {
            exit_code,
            stdout,
            stderr: stderr.unwrap_or_default(),
            selected_stdout_lines,
            selected_stderr_lines,
        })
    }
}

async fn join_drain(
    task: JoinHandle<DrainResult>,
    command_line: &str,
) -> Result<(Option<String>, Vec<String>), ExecutionError> {
    let to_io = |source: std::io::Error| ExecutionError::Io {
        command: command_line.to_string(),
        source,
    };
    task.await
        .map_err(|join_err| to_io(std::io::Error::new(std::io::ErrorKind::Other, join_err)))?
        .map_err(to_io)
}

async fn drain_lines<R: AsyncRead + Unpin>(reader: R, mut collector: LineCollector) -> DrainResult {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        collector.push(line.trim_end_matches(|c: char| c == '\n' || c == '\r'));
    }
    let (captured, selected) = collector.finish();
    Ok((Some(captured), selected))
}

async fn copy_to_file<R: AsyncRead + Unpin>(mut reader: R, path: PathBuf) -> DrainResult {
    let mut file = tokio::fs::File::create(&path).await?;
    tokio::io::copy(&mut reader, &mut file).await?;
    file.flush().await?;
    Ok((None, Vec::new()))
}

async fn kill_process_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;
        if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
            if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
                debug!("Unable to kill process group {}: {}", pid, e);
            }
        }
    }
    if let Err(e) = child.start_kill() {
        debug!("Unable to kill child process: {}", e);
    }
    if let Err(e) = child.wait().await {
        warn!("Failed waiting on killed child process: {}", e);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::bazel_subprocess_wrapper::NullProgressMonitor;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn sh(script: &str) -> Vec<String> {
        vec![
            String::from("/bin/sh"),
            String::from("-c"),
            String::from(script),
        ]
    }

    #[tokio::test]
    async fn captures_both_streams() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SubprocessRunner::new(false);
        let invocation = ProcessInvocation::new(sh("echo out; echo err 1>&2; exit 3"), dir.path());

        let result = runner
            .run(invocation, &NullProgressMonitor::default())
            .await
            .unwrap();

        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stdout.as_deref(), Some("out\n"));
        assert_eq!(result.stderr, "err\n");
        assert_eq!(result.selected_stderr_lines, vec!["err"]);
    }

    #[tokio::test]
    async fn redirects_stdout_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("stdout.txt");
        let runner = SubprocessRunner::new(false);
        let mut invocation = ProcessInvocation::new(sh("printf 'a\\nb'"), dir.path());
        invocation.stdout = StdoutSink::File(target.clone());

        let result = runner
            .run(invocation, &NullProgressMonitor::default())
            .await
            .unwrap();

        assert_eq!(result.stdout, None);
        assert_eq!(std::fs::read_to_string(target).unwrap(), "a\nb");
    }

    #[tokio::test]
    async fn passes_extra_environment() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SubprocessRunner::new(false);
        let mut invocation = ProcessInvocation::new(sh("echo $PULLER_TIMEOUT"), dir.path());
        invocation
            .env
            .insert(String::from("PULLER_TIMEOUT"), String::from("3000"));

        let result = runner
            .run(invocation, &NullProgressMonitor::default())
            .await
            .unwrap();
        assert_eq!(result.selected_stdout_lines, vec!["3000"]);
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SubprocessRunner::new(false);
        let invocation = ProcessInvocation::new(
            vec![String::from("/definitely/not/a/bazel")],
            dir.path(),
        );

        let err = runner
            .run(invocation, &NullProgressMonitor::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Spawn { .. }));
    }

    #[tokio::test]
    async fn cancellation_kills_the_process() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let runner = SubprocessRunner::new(false);
        let invocation = ProcessInvocation::new(
            sh(&format!("sleep 2; touch {}", marker.display())),
            dir.path(),
        );

        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        });

        let started = Instant::now();
        let err = runner.run(invocation, &token).await.unwrap_err();

        assert!(matches!(err, ExecutionError::Cancelled { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn already_cancelled_never_spawns() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SubprocessRunner::new(false);
        let monitor = NullProgressMonitor::default();
        monitor.set_canceled(true);

        let err = runner
            .run(ProcessInvocation::new(sh("exit 0"), dir.path()), &monitor)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Cancelled { .. }));
    }
}
