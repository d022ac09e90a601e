use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use bzlsdk_bazel_wrapper::bazel_subprocess_wrapper::WorkProgressMonitor;

use super::{load_aspect_files, AspectOptions, AspectTargetInfo, OutputGroup};
use crate::bazel_command::{BazelCommandError, BazelCommandExecutor, BuildWithAspectsCommand};
use crate::label_utils::{BazelLabel, TargetPart};

pub type AspectInfoMap = BTreeMap<BazelLabel, BTreeSet<AspectTargetInfo>>;

/// Runs the dependency-info aspect and caches what it reports per requested label.
///
/// Entries stay cached until flushed. A second map keeps the last successful
/// result for every label and is never flushed, it is the fallback for when a
/// broken BUILD file stops the aspect from producing anything.
#[derive(Debug)]
pub struct BazelWorkspaceAspectProcessor {
    workspace_root: PathBuf,
    aspects: AspectOptions,
    current: AspectInfoMap,
    last_good: AspectInfoMap,
    cache_hits: u64,
}

impl BazelWorkspaceAspectProcessor {
    pub fn new(workspace_root: &Path, aspects: AspectOptions) -> Self {
        Self {
            workspace_root: workspace_root.to_path_buf(),
            aspects,
            current: BTreeMap::default(),
            last_good: BTreeMap::default(),
            cache_hits: 0,
        }
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits
    }

    pub fn is_cached(&self, label: &BazelLabel) -> bool {
        self.current.contains_key(label)
    }

    pub async fn get_aspect_target_infos(
        &mut self,
        executor: &BazelCommandExecutor,
        build_options: &[String],
        labels: &BTreeSet<BazelLabel>,
        caller: &str,
        monitor: &dyn WorkProgressMonitor,
    ) -> Result<AspectInfoMap, BazelCommandError> {
        let mut results = AspectInfoMap::new();
        let mut missing = Vec::new();
        for label in labels {
            match self.current.get(label) {
                Some(infos) => {
                    debug!("Aspect data found in cache for {} [caller: {}]", label, caller);
                    self.cache_hits += 1;
                    results.insert(label.clone(), infos.clone());
                }
                None => {
                    debug!("Aspect data not in cache for {} [caller: {}]", label, caller);
                    missing.push(label.clone());
                }
            }
        }
        if missing.is_empty() {
            return Ok(results);
        }

        let batch_size = self.aspects.config().batch_size.max(1);
        info!(
            "Running aspects for {} targets in batches of {} [caller: {}]",
            missing.len(),
            batch_size,
            caller
        );
        for batch in missing.chunks(batch_size) {
            self.load_batch(executor, build_options, batch, caller, monitor, &mut results)
                .await?;
        }
        Ok(results)
    }

    async fn load_batch(
        &mut self,
        executor: &BazelCommandExecutor,
        build_options: &[String],
        batch: &[BazelLabel],
        caller: &str,
        monitor: &dyn WorkProgressMonitor,
        results: &mut AspectInfoMap,
    ) -> Result<(), BazelCommandError> {
        let command = BuildWithAspectsCommand::new(
            &self.workspace_root,
            self.aspects.clone(),
            build_options.to_vec(),
            batch.to_vec(),
        );
        let output = executor.execute(command, monitor).await?;

        let aspect_files: BTreeSet<PathBuf> = output
            .artifacts(|group| {
                OutputGroup::Info.is_prefix_of(group) || OutputGroup::Resolve.is_prefix_of(group)
            })
            .into_iter()
            .map(|(_, path)| path)
            .filter(|path| self.aspects.is_aspect_output(path))
            .collect();
        let loaded = load_aspect_files(aspect_files.iter());

        if loaded.is_empty() {
            // Usually a broken BUILD file, hand out whatever worked last time.
            for label in batch {
                match self.last_good.get(label) {
                    Some(infos) => {
                        warn!("Aspect produced nothing for {}, using last good result", label);
                        results.insert(label.clone(), infos.clone());
                    }
                    None => warn!(
                        "Aspect execution failed for {} [caller: {}]",
                        label, caller
                    ),
                }
            }
            return Ok(());
        }

        let mut owned = AspectInfoMap::new();
        for label in batch {
            owned.extend(assign_to_owning_label(label, &loaded));
        }
        for (label, infos) in owned {
            self.last_good.insert(label.clone(), infos.clone());
            self.current.insert(label, infos);
        }
        for label in batch {
            let infos = match self.current.get(label) {
                Some(infos) => infos.clone(),
                None => {
                    error!(
                        "Aspect data missing for {} after a successful run [caller: {}]",
                        label, caller
                    );
                    BTreeSet::new()
                }
            };
            results.insert(label.clone(), infos);
        }
        Ok(())
    }

    pub fn flush_all(&mut self) {
        self.current.clear();
    }

    pub fn flush_for_target(&mut self, label: &BazelLabel) {
        self.current.remove(label);
    }

    pub fn flush_for_targets<'a, I>(&mut self, labels: I)
    where
        I: IntoIterator<Item = &'a BazelLabel>,
    {
        for label in labels {
            self.current.remove(label);
        }
    }

    /// Drops every entry whose package is `package` or nested below it, returning
    /// the affected packages.
    pub fn flush_for_package(&mut self, package: &BazelLabel) -> BTreeSet<String> {
        let mut flushed = BTreeSet::new();
        self.current.retain(|label, _| {
            if label.is_in_package_tree(package) {
                flushed.insert(label.package_path_with_repository());
                false
            } else {
                true
            }
        });
        flushed
    }
}

fn same_target(requested: &BazelLabel, candidate: &BazelLabel) -> bool {
    requested.package_path_with_repository() == candidate.package_path_with_repository()
        && requested.target_name() == candidate.target_name()
}

fn in_requested_packages(requested: &BazelLabel, candidate: &BazelLabel) -> bool {
    match requested.target() {
        TargetPart::WildcardAllPackages => candidate.is_in_package_tree(requested),
        _ => requested.package_path_with_repository() == candidate.package_path_with_repository(),
    }
}

/// A concrete label owns the closure of its own info. A wildcard owns the loaded
/// infos of its packages, and each of those targets gets its own entry.
fn assign_to_owning_label(
    requested: &BazelLabel,
    loaded: &BTreeMap<BazelLabel, AspectTargetInfo>,
) -> AspectInfoMap {
    let mut owned = AspectInfoMap::new();
    if requested.is_concrete() {
        if let Some(info) = loaded
            .iter()
            .find(|(label, _)| same_target(requested, label))
            .map(|(_, info)| info)
        {
            owned.insert(requested.clone(), transitive_closure(info, loaded));
        }
    } else {
        let mut members = BTreeSet::new();
        for (label, info) in loaded.iter() {
            if in_requested_packages(requested, label) {
                owned.insert(label.clone(), transitive_closure(info, loaded));
                members.insert(info.clone());
            }
        }
        owned.insert(requested.clone(), members);
    }
    owned
}

/// Every info reachable from `root` through dependencies we have infos for.
/// The root itself only counts for tests and imports, whose own jars are needed
/// on the classpath.
fn transitive_closure(
    root: &AspectTargetInfo,
    loaded: &BTreeMap<BazelLabel, AspectTargetInfo>,
) -> BTreeSet<AspectTargetInfo> {
    let mut closure = BTreeSet::new();
    let mut visited: BTreeSet<String> = BTreeSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(root);

    while let Some(info) = queue.pop_front() {
        if !visited.insert(info.label.clone()) {
            continue;
        }
        if !std::ptr::eq(info, root) {
            closure.insert(info.clone());
        }
        for dep in info.dependencies.iter() {
            if visited.contains(dep) {
                continue;
            }
            match BazelLabel::parse(dep).ok().and_then(|l| loaded.get(&l)) {
                Some(dep_info) => queue.push_back(dep_info),
                None => trace!("No aspect data for {}, leaving it out", dep),
            }
        }
    }

    if root.is_kind("java_test") || root.is_kind("java_import") {
        closure.insert(root.clone());
    }
    closure
}
