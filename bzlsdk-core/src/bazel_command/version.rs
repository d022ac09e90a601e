use std::path::{Path, PathBuf};

use bzlsdk_bazel_wrapper::bazel_subprocess_wrapper::{LineSelector, ProcessResult};

use super::{BazelCommand, BazelCommandError, BazelVerb};
use crate::model::BazelVersion;

const BUILD_LABEL_PREFIX: &str = "Build label:";

/// `bazel version`. Yields `None` when the output has no usable build label,
/// which is what development builds of bazel print.
#[derive(Debug)]
pub struct VersionCommand {
    working_directory: PathBuf,
}

impl VersionCommand {
    pub fn new(working_directory: &Path) -> Self {
        Self {
            working_directory: working_directory.to_path_buf(),
        }
    }
}

impl BazelCommand for VersionCommand {
    type Output = Option<BazelVersion>;

    fn verb(&self) -> BazelVerb {
        BazelVerb::Version
    }

    fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    fn prepare_command_line(
        &mut self,
        _version: &BazelVersion,
    ) -> Result<Vec<String>, BazelCommandError> {
        Ok(Vec::new())
    }

    fn take_stdout_selector(&mut self) -> Option<Box<dyn LineSelector>> {
        Some(Box::new(|line: &str| {
            line.strip_prefix(BUILD_LABEL_PREFIX)
                .map(|v| v.trim().to_string())
        }))
    }

    fn generate_result(self, result: ProcessResult) -> Result<Self::Output, BazelCommandError> {
        if !result.success() {
            return Err(BazelCommandError::failed(self.verb(), &result));
        }
        Ok(result
            .selected_stdout_lines
            .iter()
            .find_map(|label| BazelVersion::parse(label)))
    }
}
