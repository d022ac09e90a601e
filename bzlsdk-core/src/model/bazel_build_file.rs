use std::collections::{BTreeMap, BTreeSet};

use crate::label_utils::BazelLabel;

/// The rules declared in one package, as reported by `bazel query`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BazelBuildFile {
    pub label: BazelLabel,
    type_to_targets: BTreeMap<String, BTreeSet<BazelLabel>>,
    target_to_type: BTreeMap<BazelLabel, String>,
}

impl BazelBuildFile {
    pub fn new(label: BazelLabel) -> Self {
        Self {
            label,
            type_to_targets: BTreeMap::default(),
            target_to_type: BTreeMap::default(),
        }
    }

    pub fn add_target(&mut self, rule_type: &str, target: BazelLabel) {
        if let Some(previous) = self.target_to_type.insert(target.clone(), rule_type.to_string()) {
            if previous != rule_type {
                if let Some(targets) = self.type_to_targets.get_mut(&previous) {
                    targets.remove(&target);
                }
            }
        }
        self.type_to_targets
            .entry(rule_type.to_string())
            .or_default()
            .insert(target);
    }

    pub fn rule_types(&self) -> impl Iterator<Item = &str> {
        self.type_to_targets.keys().map(|k| k.as_str())
    }

    pub fn targets_of_type(&self, rule_type: &str) -> Option<&BTreeSet<BazelLabel>> {
        self.type_to_targets.get(rule_type)
    }

    pub fn rule_type_of(&self, target: &BazelLabel) -> Option<&str> {
        self.target_to_type.get(target).map(|s| s.as_str())
    }

    pub fn all_targets(&self) -> impl Iterator<Item = &BazelLabel> {
        self.target_to_type.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.target_to_type.is_empty()
    }
}
