use std::fmt;

use crate::label_utils::BazelLabel;

/// One error or warning reported by a bazel build, tied to a workspace relative
/// resource such as a java source or a BUILD file.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BazelProblem {
    pub resource_path: String,
    pub line_number: u32,
    pub description: String,
    pub is_error: bool,
}

impl BazelProblem {
    pub fn create_error(
        resource_path: impl Into<String>,
        line_number: u32,
        description: impl Into<String>,
    ) -> Self {
        Self {
            resource_path: resource_path.into(),
            line_number,
            description: description.into(),
            is_error: true,
        }
    }

    pub fn create_warning(
        resource_path: impl Into<String>,
        line_number: u32,
        description: impl Into<String>,
    ) -> Self {
        Self {
            is_error: false,
            ..Self::create_error(resource_path, line_number, description)
        }
    }

    /// Picks the label whose package holds the resource, preferring the deepest package.
    pub fn owning_label<'a, I>(&self, labels: I) -> Option<&'a BazelLabel>
    where
        I: IntoIterator<Item = &'a BazelLabel>,
    {
        let mut best: Option<(&'a BazelLabel, usize)> = None;
        for label in labels {
            if let Some(relative) = self.relative_resource_path(label) {
                let better = match best {
                    Some((_, shortest)) => relative.len() < shortest,
                    None => true,
                };
                if better {
                    best = Some((label, relative.len()));
                }
            }
        }
        best.map(|(label, _)| label)
    }

    /// Rebases the resource path onto the package of `label`, `None` if the
    /// resource lives elsewhere.
    pub fn relativized_to(&self, label: &BazelLabel) -> Option<BazelProblem> {
        self.relative_resource_path(label).map(|rel| BazelProblem {
            resource_path: rel.to_string(),
            ..self.clone()
        })
    }

    fn relative_resource_path(&self, label: &BazelLabel) -> Option<&str> {
        let package_path = label.package_path();
        let rest = self.resource_path.strip_prefix(package_path)?;
        if rest.len() > 1 && rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }
}

impl fmt::Display for BazelProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}:{} {}",
            if self.is_error { "ERROR" } else { "WARNING" },
            self.resource_path,
            self.line_number,
            self.description
        )
    }
}
