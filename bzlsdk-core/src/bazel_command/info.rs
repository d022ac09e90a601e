use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bzlsdk_bazel_wrapper::bazel_subprocess_wrapper::ProcessResult;
use tempfile::NamedTempFile;

use super::{temp_file, BazelCommand, BazelCommandError, BazelVerb};
use crate::model::BazelVersion;

/// `bazel info [key]`, stdout goes to a temp file since it can be large.
#[derive(Debug)]
pub struct InfoCommand {
    working_directory: PathBuf,
    key: Option<String>,
    output_file: Option<NamedTempFile>,
}

impl InfoCommand {
    pub fn new(working_directory: &Path, key: Option<&str>) -> Self {
        Self {
            working_directory: working_directory.to_path_buf(),
            key: key.map(|k| k.to_string()),
            output_file: None,
        }
    }
}

pub fn parse_info_output(key: Option<&str>, output: &str) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    match key {
        Some(key) => {
            let value: Vec<&str> = output
                .lines()
                .filter(|l| !l.starts_with("INFO:"))
                .collect();
            values.insert(key.to_string(), value.join("\n").trim().to_string());
        }
        None => {
            for line in output.lines() {
                if let Some((k, v)) = line.split_once(':') {
                    values.insert(k.trim().to_string(), v.trim().to_string());
                }
            }
        }
    }
    values
}

impl BazelCommand for InfoCommand {
    type Output = BTreeMap<String, String>;

    fn verb(&self) -> BazelVerb {
        BazelVerb::Info
    }

    fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    fn prepare_command_line(
        &mut self,
        _version: &BazelVersion,
    ) -> Result<Vec<String>, BazelCommandError> {
        self.output_file = Some(temp_file("bazel_info_", ".txt")?);
        Ok(self.key.iter().cloned().collect())
    }

    fn stdout_file(&self) -> Option<PathBuf> {
        self.output_file.as_ref().map(|f| f.path().to_path_buf())
    }

    fn generate_result(self, result: ProcessResult) -> Result<Self::Output, BazelCommandError> {
        if !result.success() {
            return Err(BazelCommandError::failed(self.verb(), &result));
        }
        let output = match self.output_file.as_ref() {
            Some(file) => std::fs::read_to_string(file.path())?,
            None => result.stdout.clone().unwrap_or_default(),
        };
        Ok(parse_info_output(self.key.as_deref(), &output))
    }
}
