use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use bzlsdk_bazel_wrapper::bazel_subprocess_wrapper::{ProcessResult, WorkProgressMonitor};
use bzlsdk_protos::blaze_query;
use tokio::sync::{watch, Mutex, MutexGuard};

use super::global_runner::check_bazel_version;
use super::{BazelWorkspace, WorkspaceCommandError};
use crate::aspect::{AspectInfoMap, AspectOptions, BazelWorkspaceAspectProcessor};
use crate::bazel_command::{
    AnnounceRcCommand, BazelBinary, BazelCommandExecutor, BazelWorkspaceCommandOptions,
    BuildCommand, CleanCommand, DebugTarget, InfoCommand, LauncherBuilder, QueryCommand,
    QueryForTargetProtoCommand,
};
use crate::bazel_query::{
    build_files_from_targets, package_rules_query, source_file_paths, source_files_query,
    BuildFileCache, QueryCache,
};
use crate::config::Config;
use crate::label_utils::{group_by_package, BazelLabel, TargetPart};
use crate::model::{BazelBuildFile, BazelProblem, BazelVersion, TargetKindRegistry};

const EXECUTION_ROOT: &str = "execution_root";
const OUTPUT_BASE: &str = "output_base";
const BAZEL_BIN: &str = "bazel-bin";

struct RunnerState {
    build_options: Vec<String>,
    info_paths: BTreeMap<&'static str, PathBuf>,
    query_cache: QueryCache,
    build_files: BuildFileCache,
    aspects: BazelWorkspaceAspectProcessor,
    binary_changes: watch::Receiver<Option<BazelBinary>>,
}

/// Runs bazel against one workspace and caches what it learns about the
/// workspace's targets. Every operation holds the runner's lock for its whole
/// duration, so calls on one runner never overlap.
pub struct BazelWorkspaceCommandRunner {
    workspace: BazelWorkspace,
    executor: BazelCommandExecutor,
    target_kinds: TargetKindRegistry,
    state: Mutex<RunnerState>,
}

impl std::fmt::Debug for BazelWorkspaceCommandRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BazelWorkspaceCommandRunner")
            .field("workspace", &self.workspace)
            .field("executor", &self.executor)
            .finish()
    }
}

impl BazelWorkspaceCommandRunner {
    pub fn new(workspace: BazelWorkspace, executor: BazelCommandExecutor, config: &Config) -> Self {
        let binary_changes = executor.setting().subscribe();
        let aspects =
            BazelWorkspaceAspectProcessor::new(workspace.root(), AspectOptions::new(config.aspects.clone()));
        Self {
            workspace,
            executor,
            target_kinds: TargetKindRegistry::default(),
            state: Mutex::new(RunnerState {
                build_options: config.build_options.clone(),
                info_paths: BTreeMap::default(),
                query_cache: QueryCache::new(config.query_cache_capacity),
                build_files: BuildFileCache::default(),
                aspects,
                binary_changes,
            }),
        }
    }

    pub fn workspace(&self) -> &BazelWorkspace {
        &self.workspace
    }

    pub fn executor(&self) -> &BazelCommandExecutor {
        &self.executor
    }

    pub fn target_kinds(&self) -> &TargetKindRegistry {
        &self.target_kinds
    }

    fn root(&self) -> &Path {
        self.workspace.root()
    }

    // Paths bazel info reported may not hold for a different binary.
    async fn lock(&self) -> MutexGuard<'_, RunnerState> {
        let mut state = self.state.lock().await;
        if state.binary_changes.has_changed().unwrap_or(false) {
            state.binary_changes.mark_unchanged();
            if !state.info_paths.is_empty() {
                info!(
                    "Bazel executable changed, forgetting bazel info for {:?}",
                    self.root()
                );
                state.info_paths.clear();
            }
        }
        state
    }

    async fn info_path(
        &self,
        key: &'static str,
        monitor: &dyn WorkProgressMonitor,
    ) -> Result<PathBuf, WorkspaceCommandError> {
        let mut state = self.lock().await;
        if let Some(path) = state.info_paths.get(key) {
            return Ok(path.clone());
        }

        let values = self
            .executor
            .execute(InfoCommand::new(self.root(), Some(key)), monitor)
            .await?;
        let raw = values
            .get(key)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| WorkspaceCommandError::Io {
                context: format!("bazel info did not report {}", key),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })?;
        let path = match tokio::fs::canonicalize(&raw).await {
            Ok(path) => path,
            Err(e) => {
                error!("Unable to canonicalize {} {:?}: {}", key, raw, e);
                raw
            }
        };
        state.info_paths.insert(key, path.clone());
        Ok(path)
    }

    pub async fn compute_bazel_workspace_exec_root(
        &self,
        monitor: &dyn WorkProgressMonitor,
    ) -> Result<PathBuf, WorkspaceCommandError> {
        self.info_path(EXECUTION_ROOT, monitor).await
    }

    pub async fn compute_bazel_workspace_output_base(
        &self,
        monitor: &dyn WorkProgressMonitor,
    ) -> Result<PathBuf, WorkspaceCommandError> {
        self.info_path(OUTPUT_BASE, monitor).await
    }

    pub async fn compute_bazel_workspace_bin(
        &self,
        monitor: &dyn WorkProgressMonitor,
    ) -> Result<PathBuf, WorkspaceCommandError> {
        self.info_path(BAZEL_BIN, monitor).await
    }

    pub async fn set_build_options(&self, build_options: Vec<String>) {
        self.lock().await.build_options = build_options;
    }

    /// Builds `targets`. Errors in the code being built come back as problems,
    /// an empty list means the build succeeded.
    pub async fn run_bazel_build(
        &self,
        targets: &BTreeSet<BazelLabel>,
        extra_args: &[String],
        monitor: &dyn WorkProgressMonitor,
    ) -> Result<Vec<BazelProblem>, WorkspaceCommandError> {
        let state = self.lock().await;
        let command = BuildCommand::new(
            self.root(),
            state.build_options.clone(),
            extra_args.to_vec(),
            targets.iter().cloned().collect(),
        );
        let problems = self.executor.execute(command, monitor).await?;
        if !problems.is_empty() {
            info!("Build of {} targets reported {} problems", targets.len(), problems.len());
        }
        Ok(problems)
    }

    pub async fn compute_bazel_query(
        &self,
        query: &str,
        monitor: &dyn WorkProgressMonitor,
    ) -> Result<Vec<String>, WorkspaceCommandError> {
        let mut state = self.lock().await;
        if let Some(lines) = state.query_cache.get(query) {
            debug!("Query cache hit for `{}`", query);
            return Ok(lines.clone());
        }
        let lines = self
            .executor
            .execute(QueryCommand::new(self.root(), query, false), monitor)
            .await?;
        state.query_cache.put(query, lines.clone());
        Ok(lines)
    }

    pub async fn flush_query_cache(&self) {
        self.lock().await.query_cache.clear();
    }

    /// Runs `query` with `--output=streamed_proto`, uncached.
    pub async fn query_targets(
        &self,
        query: &str,
        keep_going: bool,
        monitor: &dyn WorkProgressMonitor,
    ) -> Result<Vec<blaze_query::Target>, WorkspaceCommandError> {
        let _state = self.lock().await;
        Ok(self
            .executor
            .execute(
                QueryForTargetProtoCommand::new(self.root(), query, keep_going),
                monitor,
            )
            .await?)
    }

    /// Workspace relative paths of the source files `label` depends on.
    pub async fn query_source_files_for_target(
        &self,
        label: &BazelLabel,
        monitor: &dyn WorkProgressMonitor,
    ) -> Result<BTreeSet<String>, WorkspaceCommandError> {
        let _state = self.lock().await;
        let lines = self
            .executor
            .execute(
                QueryCommand::new(self.root(), &source_files_query(label), false),
                monitor,
            )
            .await?;
        Ok(source_file_paths(lines.iter()))
    }

    /// The rules of every package `labels` point into. Recursive patterns such as
    /// `//a/...` cover every package below them and are always queried. With no
    /// labels, a single build file standing for the whole workspace.
    pub async fn query_bazel_targets_in_build_file(
        &self,
        labels: &BTreeSet<BazelLabel>,
        monitor: &dyn WorkProgressMonitor,
    ) -> Result<Vec<BazelBuildFile>, WorkspaceCommandError> {
        if labels.is_empty() {
            return Ok(vec![BazelBuildFile::new(BazelLabel::parse("//...")?)]);
        }

        let (recursive, packaged): (Vec<&BazelLabel>, Vec<&BazelLabel>) =
            labels.iter().partition(|l| l.is_recursive());

        let mut state = self.lock().await;
        let mut build_files: BTreeMap<String, BazelBuildFile> = BTreeMap::new();
        let mut misses: BTreeMap<String, BazelLabel> = BTreeMap::new();
        for (package, members) in group_by_package(packaged) {
            match state.build_files.get(&package) {
                Some(build_file) => {
                    debug!("Build file cache hit, package: {}", package);
                    build_files.insert(package, build_file.clone());
                }
                None => {
                    if let Some(member) = members.into_iter().next() {
                        misses.insert(package, member);
                    }
                }
            }
        }
        if misses.is_empty() && recursive.is_empty() {
            return Ok(build_files.into_values().collect());
        }

        let query = package_rules_query(misses.keys(), recursive.iter().copied());
        let targets = self
            .executor
            .execute(
                QueryForTargetProtoCommand::new(self.root(), &query, true),
                monitor,
            )
            .await?;
        for (package, build_file) in build_files_from_targets(&misses, targets) {
            let requested = misses.contains_key(&package)
                || recursive
                    .iter()
                    .any(|root| build_file.label.is_in_package_tree(root));
            if requested {
                build_files.insert(package.clone(), build_file.clone());
            }
            state.build_files.insert(package, build_file);
        }
        Ok(build_files.into_values().collect())
    }

    pub async fn get_aspect_target_infos(
        &self,
        labels: &BTreeSet<BazelLabel>,
        caller: &str,
        monitor: &dyn WorkProgressMonitor,
    ) -> Result<AspectInfoMap, WorkspaceCommandError> {
        let mut guard = self.lock().await;
        let state = &mut *guard;
        Ok(state
            .aspects
            .get_aspect_target_infos(
                &self.executor,
                &state.build_options,
                labels,
                caller,
                monitor,
            )
            .await?)
    }

    /// Aspect data for every target in each package, keyed by `pkg:*` and by target.
    pub async fn get_aspect_target_infos_for_packages(
        &self,
        packages: &BTreeSet<BazelLabel>,
        caller: &str,
        monitor: &dyn WorkProgressMonitor,
    ) -> Result<AspectInfoMap, WorkspaceCommandError> {
        let labels: BTreeSet<BazelLabel> = packages
            .iter()
            .map(|p| p.with_target(TargetPart::WildcardStar))
            .collect();
        self.get_aspect_target_infos(&labels, caller, monitor).await
    }

    pub async fn aspect_cache_hits(&self) -> u64 {
        self.lock().await.aspects.cache_hits()
    }

    pub async fn flush_aspect_info_cache(&self) {
        self.lock().await.aspects.flush_all();
    }

    pub async fn flush_aspect_info_cache_for_target(&self, label: &BazelLabel) {
        self.lock().await.aspects.flush_for_target(label);
    }

    pub async fn flush_aspect_info_cache_for_targets(&self, labels: &BTreeSet<BazelLabel>) {
        self.lock().await.aspects.flush_for_targets(labels);
    }

    /// Forgets aspect data and build files for `package` and every package
    /// below it. Returns the packages that had something cached.
    pub async fn flush_aspect_info_cache_for_package(&self, package: &BazelLabel) -> BTreeSet<String> {
        let mut state = self.lock().await;
        let mut flushed = state.aspects.flush_for_package(package);
        flushed.extend(state.build_files.flush_package_tree(package));
        debug!("Flushed {} packages under {}", flushed.len(), package);
        flushed
    }

    /// Failures are logged, a clean that did not happen is not worth failing over.
    pub async fn run_bazel_clean(&self, monitor: &dyn WorkProgressMonitor) {
        let _state = self.lock().await;
        if let Err(e) = self
            .executor
            .execute(CleanCommand::new(self.root()), monitor)
            .await
        {
            error!("bazel clean failed in {:?}: {}", self.root(), e);
        }
    }

    pub async fn run_bazel_version_check(
        &self,
        monitor: &dyn WorkProgressMonitor,
    ) -> Result<BazelVersion, WorkspaceCommandError> {
        let _state = self.lock().await;
        check_bazel_version(&self.executor, self.root(), monitor).await
    }

    pub async fn populate_workspace_command_options(
        &self,
        monitor: &dyn WorkProgressMonitor,
    ) -> Result<BazelWorkspaceCommandOptions, WorkspaceCommandError> {
        let _state = self.lock().await;
        let options = self
            .executor
            .execute(AnnounceRcCommand::new(self.root()), monitor)
            .await?;
        debug!("{} for {}", options, self.workspace.name());
        Ok(options)
    }

    /// Runs a binary or test target, `kind` decides which.
    pub async fn launch(
        &self,
        label: BazelLabel,
        kind: &str,
        args: Vec<String>,
        debug: Option<DebugTarget>,
        monitor: &dyn WorkProgressMonitor,
    ) -> Result<ProcessResult, WorkspaceCommandError> {
        let _state = self.lock().await;
        let mut builder = LauncherBuilder::new(&self.target_kinds, self.root())
            .label(label)
            .target_kind(kind)
            .args(args);
        if let Some(debug) = debug {
            builder = builder.debug(debug);
        }
        let launcher = builder.build()?;
        Ok(self.executor.execute(launcher, monitor).await?)
    }
}
