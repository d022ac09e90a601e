// Walks the build event stream keeping enough state (rule kinds, named file
// sets) to hand back self contained records for the events we care about.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use bzlsdk_protos::build_event_stream::{
    self, aborted::AbortReason, build_event::Payload, build_event_id::Id, NamedSetOfFiles,
};

/// Local path of a BEP file entry. Only `file://` URIs are local; everything
/// else (bytestream URIs, inline contents) is skipped.
pub fn file_path(file: &build_event_stream::File) -> Option<PathBuf> {
    match file.file.as_ref()? {
        build_event_stream::file::File::Uri(uri) => match uri.strip_prefix("file://") {
            Some(path) => Some(PathBuf::from(path)),
            None => {
                log::warn!("Path isn't a file, so skipping...{:?}", uri);
                None
            }
        },
        build_event_stream::file::File::Contents(_) => None,
        build_event_stream::file::File::SymlinkTargetPath(_) => None,
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct ActionFailedErrorInfo {
    pub label: String,
    pub exit_code: i32,
    pub stdout: Option<build_event_stream::File>,
    pub stderr: Option<build_event_stream::File>,
    pub target_kind: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BazelAbortErrorInfo {
    pub label: Option<String>,
    pub reason: Option<AbortReason>,
    pub description: String,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ProgressInfo {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BuildFinishedInfo {
    pub exit_code_name: String,
    pub exit_code: i32,
}

#[derive(Clone, PartialEq, Debug)]
pub struct TargetCompleteInfo {
    pub label: String,
    pub aspect: Option<String>,
    pub success: bool,
    pub target_kind: Option<String>,
    /// Output group name to every file in it, nested file sets flattened.
    pub output_groups: BTreeMap<String, Vec<build_event_stream::File>>,
}

impl TargetCompleteInfo {
    pub fn group_paths(&self, group: &str) -> Vec<PathBuf> {
        self.output_groups
            .get(group)
            .map(|files| files.iter().filter_map(file_path).collect())
            .unwrap_or_default()
    }
}

#[derive(Clone, PartialEq, Debug)]
pub enum HydratedInfo {
    BazelAbort(BazelAbortErrorInfo),
    ActionFailed(ActionFailedErrorInfo),
    Progress(ProgressInfo),
    TargetComplete(TargetCompleteInfo),
    BuildFinished(BuildFinishedInfo),
}

impl HydratedInfo {
    pub fn label(&self) -> Option<&str> {
        match self {
            HydratedInfo::BazelAbort(ba) => ba.label.as_deref(),
            HydratedInfo::ActionFailed(af) => Some(af.label.as_str()),
            HydratedInfo::Progress(_) => None,
            HydratedInfo::TargetComplete(tc) => Some(tc.label.as_str()),
            HydratedInfo::BuildFinished(_) => None,
        }
    }
}

#[derive(Clone, Debug)]
struct PendingTargetComplete {
    label: String,
    aspect: Option<String>,
    completed: build_event_stream::TargetComplete,
}

// Returns false if any referenced set hasn't been seen yet.
fn recursive_lookup(
    lut: &HashMap<String, NamedSetOfFiles>,
    results: &mut Vec<build_event_stream::File>,
    mut ids: Vec<String>,
) -> bool {
    let mut visited = HashSet::new();
    while let Some(head) = ids.pop() {
        if !visited.insert(head.clone()) {
            continue;
        }
        match lut.get(&head) {
            Some(r) => {
                results.extend(r.files.iter().cloned());
                ids.extend(r.file_sets.iter().map(|e| e.id.clone()));
            }
            None => return false,
        }
    }
    true
}

fn resolve_output_groups(
    completed: &build_event_stream::TargetComplete,
    named_set_of_files_lookup: &HashMap<String, NamedSetOfFiles>,
) -> (BTreeMap<String, Vec<build_event_stream::File>>, bool) {
    let mut found_everything = true;
    let mut output_groups = BTreeMap::new();
    for group in completed.output_group.iter() {
        let mut files = group.inline_files.clone();
        found_everything &= recursive_lookup(
            named_set_of_files_lookup,
            &mut files,
            group.file_sets.iter().map(|fs| fs.id.clone()).collect(),
        );
        output_groups.insert(group.name.clone(), files);
    }
    (output_groups, found_everything)
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn label_of_event_id(id: Option<&Id>) -> Option<String> {
    match id? {
        Id::TargetCompleted(t) => non_empty(t.label.clone()),
        Id::TargetConfigured(t) => non_empty(t.label.clone()),
        Id::ActionCompleted(a) => non_empty(a.label.clone()),
        _ => None,
    }
}

#[derive(Default, Debug)]
pub struct HydratorState {
    named_set_of_files_lookup: HashMap<String, NamedSetOfFiles>,
    rule_kind_lookup: HashMap<String, String>,
    buffered_tce: Vec<PendingTargetComplete>,
}

impl HydratorState {
    fn target_complete_info(
        &self,
        pending: &PendingTargetComplete,
        output_groups: BTreeMap<String, Vec<build_event_stream::File>>,
    ) -> TargetCompleteInfo {
        TargetCompleteInfo {
            label: pending.label.clone(),
            aspect: pending.aspect.clone(),
            success: pending.completed.success,
            target_kind: self.rule_kind_lookup.get(&pending.label).cloned(),
            output_groups,
        }
    }

    fn try_complete(&mut self, pending: PendingTargetComplete) -> Option<TargetCompleteInfo> {
        let (output_groups, found_everything) =
            resolve_output_groups(&pending.completed, &self.named_set_of_files_lookup);
        if found_everything {
            Some(self.target_complete_info(&pending, output_groups))
        } else {
            self.buffered_tce.push(pending);
            None
        }
    }

    pub fn consume(&mut self, event: build_event_stream::BuildEvent) -> Vec<HydratedInfo> {
        let id = event.id.and_then(|id| id.id);
        let payload = match event.payload {
            Some(payload) => payload,
            None => return Vec::default(),
        };

        match payload {
            Payload::Configured(configured) => {
                if let Some(Id::TargetConfigured(cfg_id)) = id {
                    let kind = configured
                        .target_kind
                        .strip_suffix(" rule")
                        .unwrap_or(&configured.target_kind)
                        .to_string();
                    self.rule_kind_lookup.insert(cfg_id.label, kind);
                }
                Vec::default()
            }
            Payload::NamedSetOfFiles(named_set_of_files) => {
                if let Some(Id::NamedSet(set_id)) = id {
                    self.named_set_of_files_lookup
                        .insert(set_id.id, named_set_of_files);
                }
                let pending: Vec<PendingTargetComplete> = self.buffered_tce.drain(..).collect();
                pending
                    .into_iter()
                    .filter_map(|p| self.try_complete(p))
                    .map(HydratedInfo::TargetComplete)
                    .collect()
            }
            Payload::Completed(completed) => {
                let (label, aspect) = match id {
                    Some(Id::TargetCompleted(t)) => (t.label, non_empty(t.aspect)),
                    _ => return Vec::default(),
                };
                self.try_complete(PendingTargetComplete {
                    label,
                    aspect,
                    completed,
                })
                .map(HydratedInfo::TargetComplete)
                .into_iter()
                .collect()
            }
            Payload::Action(action) => {
                if action.success {
                    return Vec::default();
                }
                let label = label_of_event_id(id.as_ref()).unwrap_or_default();
                vec![HydratedInfo::ActionFailed(ActionFailedErrorInfo {
                    target_kind: self.rule_kind_lookup.get(&label).cloned(),
                    label,
                    exit_code: action.exit_code,
                    stdout: action.stdout,
                    stderr: action.stderr,
                })]
            }
            Payload::Aborted(aborted) => vec![HydratedInfo::BazelAbort(BazelAbortErrorInfo {
                label: label_of_event_id(id.as_ref()),
                reason: AbortReason::try_from(aborted.reason).ok(),
                description: aborted.description,
            })],
            Payload::Progress(progress) => vec![HydratedInfo::Progress(ProgressInfo {
                stdout: progress.stdout,
                stderr: progress.stderr,
            })],
            Payload::Finished(finished) => {
                let exit_code = finished.exit_code.unwrap_or_default();
                vec![HydratedInfo::BuildFinished(BuildFinishedInfo {
                    exit_code_name: exit_code.name,
                    exit_code: exit_code.code,
                })]
            }
            Payload::Started(_) => Vec::default(),
        }
    }

    /// Emits any target completions still waiting on file sets, with whatever
    /// files could be resolved. Used once the stream has ended.
    pub fn finish(&mut self) -> Vec<HydratedInfo> {
        let pending: Vec<PendingTargetComplete> = self.buffered_tce.drain(..).collect();
        pending
            .into_iter()
            .map(|p| {
                log::warn!(
                    "Target {} completed but some of its file sets never arrived",
                    p.label
                );
                let (output_groups, _) =
                    resolve_output_groups(&p.completed, &self.named_set_of_files_lookup);
                HydratedInfo::TargetComplete(self.target_complete_info(&p, output_groups))
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod test_events {
    use bzlsdk_protos::build_event_stream::{
        build_event::Payload, build_event_id, build_event_id::Id, file, BuildEvent, BuildEventId,
        File, NamedSetOfFiles, OutputGroup, TargetComplete, TargetConfigured,
    };

    pub fn file(uri: &str) -> File {
        File {
            name: uri.rsplit('/').next().unwrap_or(uri).to_string(),
            file: Some(file::File::Uri(uri.to_string())),
            ..Default::default()
        }
    }

    pub fn named_set(id: &str, files: Vec<File>, children: &[&str]) -> BuildEvent {
        BuildEvent {
            id: Some(BuildEventId {
                id: Some(Id::NamedSet(build_event_id::NamedSetOfFilesId {
                    id: id.to_string(),
                })),
            }),
            payload: Some(Payload::NamedSetOfFiles(NamedSetOfFiles {
                files,
                file_sets: children
                    .iter()
                    .map(|c| build_event_id::NamedSetOfFilesId { id: c.to_string() })
                    .collect(),
            })),
            ..Default::default()
        }
    }

    pub fn target_completed(
        label: &str,
        aspect: &str,
        success: bool,
        groups: &[(&str, &[&str])],
    ) -> BuildEvent {
        BuildEvent {
            id: Some(BuildEventId {
                id: Some(Id::TargetCompleted(build_event_id::TargetCompletedId {
                    label: label.to_string(),
                    aspect: aspect.to_string(),
                    configuration: None,
                })),
            }),
            payload: Some(Payload::Completed(TargetComplete {
                success,
                output_group: groups
                    .iter()
                    .map(|(name, sets)| OutputGroup {
                        name: name.to_string(),
                        file_sets: sets
                            .iter()
                            .map(|s| build_event_id::NamedSetOfFilesId { id: s.to_string() })
                            .collect(),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            })),
            ..Default::default()
        }
    }

    pub fn target_configured(label: &str, kind: &str) -> BuildEvent {
        BuildEvent {
            id: Some(BuildEventId {
                id: Some(Id::TargetConfigured(build_event_id::TargetConfiguredId {
                    label: label.to_string(),
                    aspect: String::default(),
                })),
            }),
            payload: Some(Payload::Configured(TargetConfigured {
                target_kind: kind.to_string(),
                ..Default::default()
            })),
            ..Default::default()
        }
    }
}
