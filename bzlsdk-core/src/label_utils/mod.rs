use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LabelError {
    #[error("Label is empty")]
    Empty,
    #[error("Label `{0}` must not end with `:`")]
    TrailingColon(String),
    #[error("Label `{0}` must not end with `/`")]
    TrailingSlash(String),
    #[error("Label `{0}` uses `\\` instead of `/`")]
    Backslash(String),
    #[error("Label `{0}` is malformed: {1}")]
    Malformed(String, &'static str),
    #[error("Label `{0}` has no package label")]
    NoPackage(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TargetPart {
    Named(String),
    /// `//a/b/c`, the target named after the last package segment.
    Default,
    /// `:all`
    WildcardAll,
    /// `:*` or `:all-targets`
    WildcardStar,
    /// `/...`
    WildcardAllPackages,
}

/// A parsed bazel label such as `//a/b:c`, `@repo//a:b`, `//a/...` or `//a:all`.
///
/// Equality, ordering and hashing use the normalized label string only.
#[derive(Clone, Debug)]
pub struct BazelLabel {
    repository: Option<String>,
    package_path: String,
    target: TargetPart,
    full_label: String,
}

impl BazelLabel {
    pub fn parse(raw: &str) -> Result<BazelLabel, LabelError> {
        let label = raw.trim();
        if label.is_empty() {
            return Err(LabelError::Empty);
        }
        if label.contains('\\') {
            return Err(LabelError::Backslash(label.to_string()));
        }
        // The root label on its own means every package.
        let label = if label == "//" { "//..." } else { label };
        if label.ends_with(':') {
            return Err(LabelError::TrailingColon(label.to_string()));
        }
        if label.ends_with('/') {
            return Err(LabelError::TrailingSlash(label.to_string()));
        }

        let (repository, local) = match label.strip_prefix('@') {
            Some(rest) => {
                let rest = rest.trim_start_matches('@');
                match rest.find("//") {
                    // `@//` and `@@//` name the main repository
                    Some(0) => (None, &rest[2..]),
                    Some(idx) => (Some(&rest[..idx]), &rest[idx + 2..]),
                    // `@foo` is shorthand for `@foo//:foo`
                    None => (Some(rest), ""),
                }
            }
            None => (None, label),
        };
        if let Some(repo) = repository {
            if repo.is_empty() || repo.contains('/') || repo.contains(':') {
                return Err(LabelError::Malformed(
                    label.to_string(),
                    "invalid repository name",
                ));
            }
        }

        let local = local
            .strip_prefix("//")
            .or_else(|| local.strip_prefix('/'))
            .unwrap_or(local);

        let (package_path, target) = if let Some(repo) = repository.filter(|_| local.is_empty()) {
            (String::new(), TargetPart::Named(repo.to_string()))
        } else {
            parse_local_part(label, local)?
        };

        Ok(BazelLabel::from_parts(
            repository.map(|r| r.to_string()),
            package_path,
            target,
        ))
    }

    /// Builds `//package_path:target_name`, tolerating stray slashes and a leading colon.
    pub fn from_package_and_target(
        package_path: &str,
        target_name: &str,
    ) -> Result<BazelLabel, LabelError> {
        let package_path = package_path.trim().trim_start_matches('/').trim_end_matches('/');
        let target_name = target_name.trim().trim_start_matches(':');
        if target_name.is_empty() {
            return BazelLabel::parse(&format!("//{}", package_path));
        }
        BazelLabel::parse(&format!("//{}:{}", package_path, target_name))
    }

    fn from_parts(repository: Option<String>, package_path: String, target: TargetPart) -> Self {
        let mut full_label = String::new();
        if let Some(repo) = repository.as_ref() {
            full_label.push('@');
            full_label.push_str(repo);
        }
        full_label.push_str("//");
        full_label.push_str(&package_path);
        match &target {
            TargetPart::Named(name) => {
                full_label.push(':');
                full_label.push_str(name);
            }
            TargetPart::Default => {}
            TargetPart::WildcardAll => full_label.push_str(":all"),
            TargetPart::WildcardStar => full_label.push_str(":*"),
            TargetPart::WildcardAllPackages => {
                if !package_path.is_empty() {
                    full_label.push('/');
                }
                full_label.push_str("...");
            }
        }
        BazelLabel {
            repository,
            package_path,
            target,
            full_label,
        }
    }

    pub fn label_path(&self) -> &str {
        &self.full_label
    }

    pub fn target(&self) -> &TargetPart {
        &self.target
    }

    /// Package path without repository or leading slashes, `a/b` for `@r//a/b:c`.
    pub fn package_path(&self) -> &str {
        &self.package_path
    }

    /// `//a/b` or `@repo//a/b`.
    pub fn package_path_with_repository(&self) -> String {
        match self.repository.as_ref() {
            Some(repo) => format!("@{}//{}", repo, self.package_path),
            None => format!("//{}", self.package_path),
        }
    }

    /// Last segment of the package path, empty for the root package.
    pub fn package_name(&self) -> &str {
        self.package_path
            .rsplit('/')
            .next()
            .unwrap_or(self.package_path.as_str())
    }

    pub fn target_name(&self) -> Option<&str> {
        match &self.target {
            TargetPart::Named(name) => Some(name.as_str()),
            TargetPart::Default => Some(self.package_name()),
            TargetPart::WildcardAll => Some("all"),
            TargetPart::WildcardStar => Some("*"),
            TargetPart::WildcardAllPackages => None,
        }
    }

    pub fn is_default_target(&self) -> bool {
        self.target == TargetPart::Default
    }

    pub fn is_concrete(&self) -> bool {
        matches!(self.target, TargetPart::Named(_) | TargetPart::Default)
    }

    /// `//a/...`, a pattern over every package below `a`.
    pub fn is_recursive(&self) -> bool {
        matches!(self.target, TargetPart::WildcardAllPackages)
    }

    pub fn is_external_repo_label(&self) -> bool {
        self.repository.is_some()
    }

    pub fn external_repository_name(&self) -> Option<&str> {
        self.repository.as_deref()
    }

    /// The package itself as a label, `//a/b` for `//a/b:c` or `//a/b/...`.
    pub fn package_label(&self) -> Result<BazelLabel, LabelError> {
        if self.package_path.is_empty() {
            return Err(LabelError::NoPackage(self.full_label.clone()));
        }
        Ok(BazelLabel::from_parts(
            self.repository.clone(),
            self.package_path.clone(),
            TargetPart::Default,
        ))
    }

    /// Same package, different target part.
    pub fn with_target(&self, target: TargetPart) -> BazelLabel {
        BazelLabel::from_parts(self.repository.clone(), self.package_path.clone(), target)
    }

    /// True if this label's package is `root`'s package or nested below it, in
    /// the same repository.
    pub fn is_in_package_tree(&self, root: &BazelLabel) -> bool {
        if self.repository != root.repository {
            return false;
        }
        is_package_nested(&self.package_path, &root.package_path)
    }
}

pub fn is_package_nested(package_path: &str, root: &str) -> bool {
    root.is_empty()
        || package_path == root
        || (package_path.starts_with(root) && package_path[root.len()..].starts_with('/'))
}

fn parse_local_part(label: &str, local: &str) -> Result<(String, TargetPart), LabelError> {
    let (package_path, target) = match local.rfind(':') {
        Some(idx) => {
            let target = &local[idx + 1..];
            let target = match target {
                "all" => TargetPart::WildcardAll,
                "*" | "all-targets" => TargetPart::WildcardStar,
                name => TargetPart::Named(name.to_string()),
            };
            (&local[..idx], target)
        }
        None => (local, TargetPart::Default),
    };

    // `a/...`, `a/...:all` and `a/...:*` all address every package below `a`.
    let (package_path, target) = if package_path == "..." || package_path.ends_with("/...") {
        match target {
            TargetPart::Default | TargetPart::WildcardAll | TargetPart::WildcardStar => (
                package_path.trim_end_matches("...").trim_end_matches('/'),
                TargetPart::WildcardAllPackages,
            ),
            TargetPart::Named(_) | TargetPart::WildcardAllPackages => {
                return Err(LabelError::Malformed(
                    label.to_string(),
                    "`...` cannot be combined with a target name",
                ))
            }
        }
    } else {
        (package_path, target)
    };

    if package_path.contains(':') {
        return Err(LabelError::Malformed(label.to_string(), "more than one `:`"));
    }
    if !package_path.is_empty() && package_path.split('/').any(|segment| segment.is_empty()) {
        return Err(LabelError::Malformed(
            label.to_string(),
            "empty package path segment",
        ));
    }
    if package_path.is_empty() && target == TargetPart::Default {
        return Err(LabelError::Malformed(label.to_string(), "no package or target"));
    }

    Ok((package_path.to_string(), target))
}

impl fmt::Display for BazelLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_label)
    }
}

impl FromStr for BazelLabel {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BazelLabel::parse(s)
    }
}

impl PartialEq for BazelLabel {
    fn eq(&self, other: &Self) -> bool {
        self.full_label == other.full_label
    }
}

impl Eq for BazelLabel {}

impl Hash for BazelLabel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.full_label.hash(state)
    }
}

impl PartialOrd for BazelLabel {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BazelLabel {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.full_label.cmp(&other.full_label)
    }
}

/// Buckets labels by `package_path_with_repository`.
pub fn group_by_package<'a, I>(labels: I) -> BTreeMap<String, BTreeSet<BazelLabel>>
where
    I: IntoIterator<Item = &'a BazelLabel>,
{
    let mut grouped: BTreeMap<String, BTreeSet<BazelLabel>> = BTreeMap::new();
    for label in labels {
        grouped
            .entry(label.package_path_with_repository())
            .or_default()
            .insert(label.clone());
    }
    grouped
}
