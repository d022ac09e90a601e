use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::label_utils::{BazelLabel, LabelError};

#[derive(Error, Debug)]
pub enum AspectInfoError {
    #[error("Unable to read aspect output {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Aspect output {path:?} is not valid json: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Aspect output {path:?} has an invalid label: {source}")]
    Label { path: PathBuf, source: LabelError },
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AspectOutputJars {
    #[serde(default)]
    pub jar: Option<String>,
    #[serde(default)]
    pub interface_jar: Option<String>,
    #[serde(default)]
    pub source_jar: Option<String>,
}

/// What the aspect wrote for one target, e.g.
///
/// ```json
/// {
///   "build_file_artifact_location": "helloworld/BUILD",
///   "dependencies": ["//proto:helloworld_java_proto"],
///   "generated_jars": [],
///   "jars": [{"jar": "bazel-out/k8-fastbuild/bin/helloworld/libhelloworld.jar"}],
///   "kind": "java_library",
///   "label": "//helloworld:helloworld",
///   "sources": ["helloworld/src/main/java/helloworld/HelloWorld.java"]
/// }
/// ```
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AspectTargetInfo {
    pub label: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub build_file_artifact_location: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub jars: Vec<AspectOutputJars>,
    #[serde(default)]
    pub generated_jars: Vec<AspectOutputJars>,
    #[serde(default)]
    pub main_class: Option<String>,
    #[serde(skip)]
    pub aspect_data_file: Option<PathBuf>,
}

impl AspectTargetInfo {
    pub fn load(path: &Path) -> Result<AspectTargetInfo, AspectInfoError> {
        let content = std::fs::read_to_string(path).map_err(|source| AspectInfoError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut info: AspectTargetInfo =
            serde_json::from_str(&content).map_err(|source| AspectInfoError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        info.aspect_data_file = Some(path.to_path_buf());
        Ok(info)
    }

    pub fn bazel_label(&self) -> Result<BazelLabel, LabelError> {
        BazelLabel::parse(&self.label)
    }

    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind
            .as_deref()
            .map(|k| k.eq_ignore_ascii_case(kind))
            .unwrap_or(false)
    }
}

/// Loads every readable aspect output, keyed by the label inside it. Broken or
/// missing files are logged and left out; with `--keep_going` some targets never
/// get their file written.
pub fn load_aspect_files<'a, I>(paths: I) -> BTreeMap<BazelLabel, AspectTargetInfo>
where
    I: IntoIterator<Item = &'a PathBuf>,
{
    let mut infos = BTreeMap::new();
    for path in paths {
        let loaded = AspectTargetInfo::load(path).and_then(|info| {
            let label = info
                .bazel_label()
                .map_err(|source| AspectInfoError::Label {
                    path: path.clone(),
                    source,
                })?;
            Ok((label, info))
        });
        match loaded {
            Ok((label, info)) => {
                debug!("Aspect for {} loaded from {:?}", label, path);
                infos.insert(label, info);
            }
            Err(e) => warn!("Skipping aspect output: {}", e),
        }
    }
    infos
}
