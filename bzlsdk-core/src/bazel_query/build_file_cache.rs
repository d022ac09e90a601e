use std::collections::{BTreeMap, BTreeSet};

use bzlsdk_protos::blaze_query;

use crate::label_utils::{BazelLabel, TargetPart};
use crate::model::BazelBuildFile;

/// The label a package's `BazelBuildFile` is filed under, `//a/b` for anything in
/// `//a/b`. The root package has no package label of its own and uses `//:*`.
pub fn build_file_label(label: &BazelLabel) -> BazelLabel {
    label
        .package_label()
        .unwrap_or_else(|_| label.with_target(TargetPart::WildcardStar))
}

/// `kind(rule, set(//a:* //b:* //c/...))`, every rule of the given packages and
/// of the package trees below the recursive patterns.
pub fn package_rules_query<'a, P, R>(packages: P, recursive: R) -> String
where
    P: IntoIterator<Item = &'a String>,
    R: IntoIterator<Item = &'a BazelLabel>,
{
    let patterns: Vec<String> = packages
        .into_iter()
        .map(|p| format!("{}:*", p))
        .chain(recursive.into_iter().map(|l| l.to_string()))
        .collect();
    format!("kind(rule, set({}))", patterns.join(" "))
}

/// Files the query result under the requested packages. Packages the query said
/// nothing about still get an empty build file so they are not queried again.
pub fn build_files_from_targets(
    packages: &BTreeMap<String, BazelLabel>,
    targets: Vec<blaze_query::Target>,
) -> BTreeMap<String, BazelBuildFile> {
    let mut build_files: BTreeMap<String, BazelBuildFile> = packages
        .iter()
        .map(|(key, label)| (key.clone(), BazelBuildFile::new(build_file_label(label))))
        .collect();

    for target in targets {
        let rule = match target.rule {
            Some(rule) => rule,
            None => continue,
        };
        let label = match BazelLabel::parse(&rule.name) {
            Ok(label) => label,
            Err(e) => {
                warn!("Skipping query result `{}`: {}", rule.name, e);
                continue;
            }
        };
        let key = label.package_path_with_repository();
        build_files
            .entry(key)
            .or_insert_with(|| BazelBuildFile::new(build_file_label(&label)))
            .add_target(&rule.rule_class, label);
    }
    build_files
}

/// `BazelBuildFile`s keyed by `package_path_with_repository`, filled by query
/// and emptied by package flushes.
#[derive(Debug, Default)]
pub struct BuildFileCache {
    files: BTreeMap<String, BazelBuildFile>,
}

impl BuildFileCache {
    pub fn get(&self, package: &str) -> Option<&BazelBuildFile> {
        self.files.get(package)
    }

    pub fn insert(&mut self, package: String, build_file: BazelBuildFile) {
        debug!("Build file cache put, package: {}", package);
        self.files.insert(package, build_file);
    }

    /// Drops `package` and everything nested below it, returning the removed keys.
    pub fn flush_package_tree(&mut self, package: &BazelLabel) -> BTreeSet<String> {
        let mut flushed = BTreeSet::new();
        self.files.retain(|key, build_file| {
            if build_file.label.is_in_package_tree(package) {
                flushed.insert(key.clone());
                false
            } else {
                true
            }
        });
        flushed
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
