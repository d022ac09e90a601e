use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use bzlsdk_bazel_wrapper::bazel_subprocess_wrapper::{
    ExecutionError, ProcessInvocation, ProcessResult, ProcessRunner, StdoutSink,
    WorkProgressMonitor,
};

type SideEffect = Box<dyn FnOnce(&ProcessInvocation) + Send>;

/// What a simulated bazel prints for one invocation.
pub(crate) struct ScriptedOutput {
    exit_code: i32,
    stdout: Vec<u8>,
    stderr: String,
    side_effect: Option<SideEffect>,
}

impl ScriptedOutput {
    pub(crate) fn new(exit_code: i32, stdout: impl Into<Vec<u8>>, stderr: &str) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.to_string(),
            side_effect: None,
        }
    }

    pub(crate) fn stdout(exit_code: i32, stdout: &str) -> Self {
        Self::new(exit_code, stdout.as_bytes().to_vec(), "")
    }

    pub(crate) fn stderr(exit_code: i32, stderr: &str) -> Self {
        Self::new(exit_code, Vec::new(), stderr)
    }

    /// Runs before output is produced, e.g. to write files named on the command line.
    pub(crate) fn with_side_effect<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&ProcessInvocation) + Send + 'static,
    {
        self.side_effect = Some(Box::new(f));
        self
    }
}

#[derive(Clone, Debug)]
pub(crate) struct RecordedInvocation {
    pub argv: Vec<String>,
    pub working_directory: PathBuf,
    pub env: BTreeMap<String, String>,
    pub stdout: StdoutSink,
}

impl RecordedInvocation {
    pub(crate) fn has_arg(&self, arg: &str) -> bool {
        self.argv.iter().any(|a| a == arg)
    }

    pub(crate) fn arg_value(&self, prefix: &str) -> Option<&str> {
        self.argv.iter().find_map(|a| a.strip_prefix(prefix))
    }
}

/// Process runner that never spawns anything. Responses are handed out in the
/// order they were pushed; once exhausted every invocation exits 0 silently.
#[derive(Default)]
pub(crate) struct FakeProcessRunner {
    responses: Mutex<VecDeque<ScriptedOutput>>,
    recorded: Mutex<Vec<RecordedInvocation>>,
}

impl FakeProcessRunner {
    pub(crate) fn push_response(&self, response: ScriptedOutput) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub(crate) fn invocations(&self) -> Vec<RecordedInvocation> {
        self.recorded.lock().unwrap().clone()
    }

    pub(crate) fn invocation_count(&self) -> usize {
        self.recorded.lock().unwrap().len()
    }
}

#[async_trait]
impl ProcessRunner for FakeProcessRunner {
    async fn run(
        &self,
        invocation: ProcessInvocation,
        monitor: &dyn WorkProgressMonitor,
    ) -> Result<ProcessResult, ExecutionError> {
        self.recorded.lock().unwrap().push(RecordedInvocation {
            argv: invocation.argv.clone(),
            working_directory: invocation.working_directory.clone(),
            env: invocation.env.clone(),
            stdout: invocation.stdout.clone(),
        });
        if monitor.is_canceled() {
            return Err(ExecutionError::Cancelled {
                command: invocation.command_line(),
            });
        }

        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ScriptedOutput::new(0, Vec::new(), ""));
        if let Some(side_effect) = response.side_effect {
            side_effect(&invocation);
        }
        invocation.simulate_output(response.exit_code, &response.stdout, &response.stderr)
    }
}

/// An executable stand-in for the bazel binary, it is never actually run.
pub(crate) fn fake_bazel_binary(dir: &Path) -> PathBuf {
    let path = dir.join("bazel");
    std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    path
}

pub(crate) fn fake_workspace() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("WORKSPACE"), "").unwrap();
    dir
}

/// A target the simulated aspect build reports: label, rule kind and deps.
pub(crate) struct FakeAspectTarget {
    pub label: &'static str,
    pub kind: &'static str,
    pub deps: Vec<&'static str>,
}

pub(crate) fn aspect_target(
    label: &'static str,
    kind: &'static str,
    deps: &[&'static str],
) -> FakeAspectTarget {
    FakeAspectTarget {
        label,
        kind,
        deps: deps.to_vec(),
    }
}

fn aspect_build_events(targets: &[FakeAspectTarget], output_dir: &Path) -> Vec<u8> {
    use bzlsdk_protos::build_event_stream::{
        build_event::Payload, build_event_id, build_event_id::Id, file, BuildEvent,
        BuildEventId, File, NamedSetOfFiles, OutputGroup, TargetComplete,
    };
    use prost::Message;

    let mut buf = Vec::new();
    for (idx, target) in targets.iter().enumerate() {
        let json_path = output_dir.join(format!("target_{}.bzljavasdk-build.json", idx));
        let json = serde_json::json!({
            "label": target.label,
            "kind": target.kind,
            "dependencies": target.deps,
            "build_file_artifact_location": "BUILD",
        });
        std::fs::write(&json_path, json.to_string()).unwrap();

        let set_id = idx.to_string();
        let named_set = BuildEvent {
            id: Some(BuildEventId {
                id: Some(Id::NamedSet(build_event_id::NamedSetOfFilesId {
                    id: set_id.clone(),
                })),
            }),
            payload: Some(Payload::NamedSetOfFiles(NamedSetOfFiles {
                files: vec![File {
                    name: json_path.file_name().unwrap().to_string_lossy().to_string(),
                    file: Some(file::File::Uri(format!("file://{}", json_path.display()))),
                    ..Default::default()
                }],
                file_sets: Vec::new(),
            })),
            ..Default::default()
        };
        let completed = BuildEvent {
            id: Some(BuildEventId {
                id: Some(Id::TargetCompleted(build_event_id::TargetCompletedId {
                    label: target.label.to_string(),
                    aspect: String::from("@@bzljavasdk_aspect//:bzljavasdk_aspect.bzl%bzljavasdk_aspect"),
                    configuration: None,
                })),
            }),
            payload: Some(Payload::Completed(TargetComplete {
                success: true,
                output_group: vec![OutputGroup {
                    name: String::from("intellij-info-java-direct-deps"),
                    file_sets: vec![build_event_id::NamedSetOfFilesId { id: set_id }],
                    ..Default::default()
                }],
                ..Default::default()
            })),
            ..Default::default()
        };
        named_set.encode_length_delimited(&mut buf).unwrap();
        completed.encode_length_delimited(&mut buf).unwrap();
    }
    buf
}

/// An aspect build that writes one JSON file per target and a BEP file naming them.
pub(crate) fn aspect_build_response(
    output_dir: &Path,
    targets: Vec<FakeAspectTarget>,
) -> ScriptedOutput {
    let output_dir = output_dir.to_path_buf();
    ScriptedOutput::new(0, Vec::new(), "").with_side_effect(move |invocation| {
        let bep = invocation
            .argv
            .iter()
            .find_map(|a| a.strip_prefix("--build_event_binary_file="))
            .expect("aspect build without a BEP file");
        std::fs::write(bep, aspect_build_events(&targets, &output_dir)).unwrap();
    })
}
