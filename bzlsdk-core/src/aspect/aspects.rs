use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::AspectConfig;
use crate::model::BazelVersion;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LanguageClass {
    Java,
    Kotlin,
    Scala,
    Python,
    Go,
    #[serde(alias = "cpp")]
    C,
}

impl LanguageClass {
    fn output_group_suffix(&self) -> &'static str {
        match self {
            LanguageClass::Java => "java",
            LanguageClass::Kotlin => "kt",
            LanguageClass::Scala => "scala",
            LanguageClass::Python => "py",
            LanguageClass::Go => "go",
            LanguageClass::C => "cpp",
        }
    }

    // The aspect does not offer `-direct-deps` groups for these.
    fn allows_direct_deps_trimming(&self) -> bool {
        !matches!(self, LanguageClass::C | LanguageClass::Go)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OutputGroup {
    Info,
    Resolve,
}

impl OutputGroup {
    pub fn prefix(&self) -> &'static str {
        match self {
            OutputGroup::Info => "intellij-info-",
            OutputGroup::Resolve => "intellij-resolve-",
        }
    }

    pub fn is_prefix_of(&self, output_group_name: &str) -> bool {
        output_group_name.starts_with(self.prefix())
    }
}

/// Command line fragments that apply the dependency-info aspect to a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AspectOptions {
    config: AspectConfig,
}

impl AspectOptions {
    pub fn new(config: AspectConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AspectConfig {
        &self.config
    }

    pub fn aspect_flag(&self, version: &BazelVersion) -> String {
        let repository_prefix = if version.at_least(6, 0, 0) { "@@" } else { "@" };
        format!(
            "--aspects={}{}{}",
            repository_prefix, self.config.repository_name, self.config.aspect
        )
    }

    pub fn flags(&self, version: &BazelVersion) -> Vec<String> {
        let mut flags = Vec::new();
        if let Some(directory) = self.config.repository_directory.as_ref() {
            flags.push(format!(
                "--override_repository={}={}",
                self.config.repository_name,
                directory.display()
            ));
        }
        flags.push(self.aspect_flag(version));
        flags
    }

    pub fn output_group_names(&self, output_groups: &[OutputGroup]) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for output_group in output_groups {
            if *output_group == OutputGroup::Info {
                names.insert(format!("{}generic", output_group.prefix()));
            }
            for language in self.config.languages.iter() {
                let direct_deps_only =
                    self.config.direct_deps_only && language.allows_direct_deps_trimming();
                let mut name = format!("{}{}", output_group.prefix(), language.output_group_suffix());
                if direct_deps_only {
                    name.push_str("-direct-deps");
                }
                names.insert(name);
            }
        }
        names
    }

    /// `--output_groups=` value for dependency resolution builds.
    pub fn output_groups_flag(&self) -> String {
        let names: Vec<String> = self
            .output_group_names(&[OutputGroup::Info, OutputGroup::Resolve])
            .into_iter()
            .collect();
        format!("--output_groups={}", names.join(","))
    }

    pub fn is_aspect_output(&self, path: &std::path::Path) -> bool {
        path.to_string_lossy()
            .ends_with(self.config.output_file_suffix.as_str())
    }
}
