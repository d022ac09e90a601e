use std::path::{Path, PathBuf};

use bzlsdk_bazel_wrapper::bazel_subprocess_wrapper::ProcessResult;

use super::{BazelCommand, BazelCommandError, BazelVerb};
use crate::model::BazelVersion;

#[derive(Debug)]
pub struct CleanCommand {
    working_directory: PathBuf,
}

impl CleanCommand {
    pub fn new(working_directory: &Path) -> Self {
        Self {
            working_directory: working_directory.to_path_buf(),
        }
    }
}

impl BazelCommand for CleanCommand {
    type Output = ();

    fn verb(&self) -> BazelVerb {
        BazelVerb::Clean
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

    fn console_name(&self) -> &str {
        "bazel clean"
    }

    fn generate_result(self, result: ProcessResult) -> Result<Self::Output, BazelCommandError> {
        if !result.success() {
            return Err(BazelCommandError::failed(self.verb(), &result));
        }
        Ok(())
    }
}
