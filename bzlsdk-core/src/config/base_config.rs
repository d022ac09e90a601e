use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::AspectConfig;

#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Clone)]
pub struct Config {
    /// The bazel binary every runner invokes. Can be changed at runtime through
    /// the command manager.
    #[serde(default = "default_bazel_executable")]
    pub bazel_executable: PathBuf,

    /// Run bazel through the user's login shell so it sees the same environment
    /// as a terminal would.
    #[serde(default = "default_wrap_execution_into_shell")]
    pub wrap_execution_into_shell: bool,

    /// Added to the environment of every bazel invocation, overriding the built in defaults.
    #[serde(default)]
    pub extra_env: BTreeMap<String, String>,

    /// Passed to every `bazel build`.
    #[serde(default)]
    pub build_options: Vec<String>,

    /// How many distinct query results are remembered per workspace.
    #[serde(default = "default_query_cache_capacity")]
    pub query_cache_capacity: usize,

    #[serde(rename = "Aspects", default = "AspectConfig::default")]
    pub aspects: AspectConfig,
}

pub fn default_bazel_executable() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(r"C:\tools\msys64\usr\bin\bazel.exe")
    } else {
        PathBuf::from("/usr/local/bin/bazel")
    }
}

fn default_wrap_execution_into_shell() -> bool {
    !cfg!(windows)
}

fn default_query_cache_capacity() -> usize {
    crate::bazel_query::DEFAULT_QUERY_CACHE_CAPACITY
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bazel_executable: default_bazel_executable(),
            wrap_execution_into_shell: default_wrap_execution_into_shell(),
            extra_env: BTreeMap::default(),
            build_options: Vec::default(),
            query_cache_capacity: default_query_cache_capacity(),
            aspects: AspectConfig::default(),
        }
    }
}

impl Config {
    /// Environment for bazel invocations, `PULLER_TIMEOUT` first so config can override it.
    pub fn bazel_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::default();
        env.insert(String::from("PULLER_TIMEOUT"), String::from("3000"));
        env.extend(self.extra_env.clone());
        env
    }
}
