use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::aspect::LanguageClass;

/// Where the dependency-info aspect lives and how it is applied.
#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Clone)]
pub struct AspectConfig {
    /// Name the aspect repository is mounted under with `--override_repository`.
    #[serde(default = "default_repository_name")]
    pub repository_name: String,

    /// Local directory holding the aspect repository. When unset builds run
    /// without `--override_repository` and the repository must already be
    /// known to the workspace.
    pub repository_directory: Option<PathBuf>,

    /// Aspect within the repository, `//:file.bzl%aspect_name`.
    #[serde(default = "default_aspect")]
    pub aspect: String,

    #[serde(default = "default_languages")]
    pub languages: Vec<LanguageClass>,

    #[serde(default = "default_direct_deps_only")]
    pub direct_deps_only: bool,

    /// Only aspect outputs with this suffix are loaded.
    #[serde(default = "default_output_file_suffix")]
    pub output_file_suffix: String,

    /// Upper bound of targets handed to a single aspect build.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_repository_name() -> String {
    String::from("bzljavasdk_aspect")
}

fn default_aspect() -> String {
    String::from("//:bzljavasdk_aspect.bzl%bzljavasdk_aspect")
}

fn default_languages() -> Vec<LanguageClass> {
    vec![LanguageClass::Java]
}

fn default_direct_deps_only() -> bool {
    true
}

fn default_output_file_suffix() -> String {
    String::from(".bzljavasdk-build.json")
}

fn default_batch_size() -> usize {
    25
}

impl Default for AspectConfig {
    fn default() -> Self {
        Self {
            repository_name: default_repository_name(),
            repository_directory: None,
            aspect: default_aspect(),
            languages: default_languages(),
            direct_deps_only: default_direct_deps_only(),
            output_file_suffix: default_output_file_suffix(),
            batch_size: default_batch_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_default() {
        let config: AspectConfig = toml::from_str("").unwrap();
        assert_eq!(config, AspectConfig::default());
        assert_eq!(config.batch_size, 25);
    }

    #[test]
    fn test_overrides() {
        let config: AspectConfig = toml::from_str(
            r#"
            repository_directory = "/opt/aspects"
            languages = ["java", "python", "go"]
            direct_deps_only = false
            batch_size = 10
        "#,
        )
        .unwrap();

        assert_eq!(
            config.repository_directory,
            Some(PathBuf::from("/opt/aspects"))
        );
        assert_eq!(
            config.languages,
            vec![LanguageClass::Java, LanguageClass::Python, LanguageClass::Go]
        );
        assert!(!config.direct_deps_only);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.repository_name, "bzljavasdk_aspect");
    }
}
