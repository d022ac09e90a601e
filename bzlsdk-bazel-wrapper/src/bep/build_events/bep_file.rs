use std::io::BufReader;
use std::path::{Path, PathBuf};

use bzlsdk_protos::build_event_stream::BuildEvent;
use bzlsdk_protos::DelimitedMessageReader;

use super::hydrated_stream::{
    ActionFailedErrorInfo, BazelAbortErrorInfo, BuildFinishedInfo, HydratedInfo, HydratorState,
    TargetCompleteInfo,
};

/// Everything we keep from one `--build_event_binary_file`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuildEventOutput {
    pub targets: Vec<TargetCompleteInfo>,
    pub failed_actions: Vec<ActionFailedErrorInfo>,
    pub aborted: Vec<BazelAbortErrorInfo>,
    pub finished: Option<BuildFinishedInfo>,
}

impl BuildEventOutput {
    pub fn from_hydrated(infos: impl IntoIterator<Item = HydratedInfo>) -> Self {
        let mut output = BuildEventOutput::default();
        for info in infos {
            match info {
                HydratedInfo::TargetComplete(tc) => output.targets.push(tc),
                HydratedInfo::ActionFailed(af) => output.failed_actions.push(af),
                HydratedInfo::BazelAbort(ba) => output.aborted.push(ba),
                HydratedInfo::BuildFinished(bf) => output.finished = Some(bf),
                HydratedInfo::Progress(_) => {}
            }
        }
        output
    }

    /// `(label, path)` for every local file in an output group accepted by `group_filter`.
    pub fn artifacts<F>(&self, group_filter: F) -> Vec<(String, PathBuf)>
    where
        F: Fn(&str) -> bool,
    {
        let mut artifacts = Vec::new();
        for target in self.targets.iter() {
            for group in target.output_groups.keys() {
                if group_filter(group) {
                    artifacts.extend(
                        target
                            .group_paths(group)
                            .into_iter()
                            .map(|p| (target.label.clone(), p)),
                    );
                }
            }
        }
        artifacts
    }
}

/// Streams a binary BEP file. A truncated or undecodable tail is logged and the
/// events read so far are kept, bazel may not have finished writing when
/// `--keep_going` builds are interrupted.
pub fn read_build_event_file(path: &Path) -> std::io::Result<BuildEventOutput> {
    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut hydrator = HydratorState::default();
    let mut infos = Vec::new();

    for event in DelimitedMessageReader::<_, BuildEvent>::new(reader) {
        match event {
            Ok(event) => infos.extend(hydrator.consume(event)),
            Err(e) => {
                log::warn!("Stopped reading build events from {:?}: {}", path, e);
                break;
            }
        }
    }
    infos.extend(hydrator.finish());

    Ok(BuildEventOutput::from_hydrated(infos))
}

#[cfg(test)]
mod tests {
    use super::super::hydrated_stream::test_events::*;
    use super::*;
    use prost::Message;

    fn write_events(path: &Path, events: &[BuildEvent]) -> Vec<u8> {
        let mut buf = Vec::new();
        for e in events {
            e.encode_length_delimited(&mut buf).unwrap();
        }
        std::fs::write(path, &buf).unwrap();
        buf
    }

    #[test]
    fn reads_aspect_artifacts_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let bep = dir.path().join("bep.bin");
        write_events(
            &bep,
            &[
                target_configured("//a:b", "java_library rule"),
                named_set("0", vec![file("file:///o/a/b.jar")], &[]),
                target_completed("//a:b", "", true, &[("default", &["0"])]),
                named_set("1", vec![file("file:///o/a/b.bzljavasdk-build.json")], &[]),
                target_completed(
                    "//a:b",
                    "@@bzlsdk_aspect//:aspect.bzl%bzlsdk_aspect",
                    true,
                    &[("intellij-info-java", &["1"])],
                ),
            ],
        );

        let output = read_build_event_file(&bep).unwrap();

        assert_eq!(output.targets.len(), 2);
        assert_eq!(
            output.artifacts(|g| g.starts_with("intellij-info-")),
            vec![(
                String::from("//a:b"),
                PathBuf::from("/o/a/b.bzljavasdk-build.json")
            )]
        );
    }

    #[test]
    fn truncated_file_keeps_earlier_events() {
        let dir = tempfile::tempdir().unwrap();
        let bep = dir.path().join("bep.bin");
        let mut buf = write_events(
            &bep,
            &[
                named_set("0", vec![file("file:///o/x")], &[]),
                target_completed("//x:x", "", true, &[("default", &["0"])]),
            ],
        );
        let mut tail = Vec::new();
        target_completed("//y:y", "", true, &[])
            .encode_length_delimited(&mut tail)
            .unwrap();
        buf.extend_from_slice(&tail[..tail.len() / 2]);
        std::fs::write(&bep, &buf).unwrap();

        let output = read_build_event_file(&bep).unwrap();
        assert_eq!(output.targets.len(), 1);
        assert_eq!(output.targets[0].label, "//x:x");
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_build_event_file(&dir.path().join("nope.bin")).is_err());
    }
}
