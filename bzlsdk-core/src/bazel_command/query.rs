use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use bzlsdk_bazel_wrapper::bazel_subprocess_wrapper::ProcessResult;
use bzlsdk_protos::blaze_query;
use bzlsdk_protos::DelimitedMessageReader;
use tempfile::NamedTempFile;

use super::{temp_file, BazelCommand, BazelCommandError, BazelVerb};
use crate::model::BazelVersion;

// With --keep_going, 3 means some of the query could not be evaluated.
fn is_query_outcome(exit_code: i32, keep_going: bool) -> bool {
    exit_code == 0 || (keep_going && exit_code == 3)
}

/// The expression goes through `--query_file` so it never needs shell escaping.
#[derive(Debug)]
struct QueryFile {
    query: String,
    keep_going: bool,
    file: Option<NamedTempFile>,
}

impl QueryFile {
    fn args(&mut self) -> Result<Vec<String>, BazelCommandError> {
        let mut file = temp_file("bazel_query_", ".txt")?;
        file.write_all(self.query.as_bytes())?;
        file.flush()?;

        let mut args = vec![format!("--query_file={}", file.path().display())];
        if self.keep_going {
            args.push(String::from("--keep_going"));
        }
        self.file = Some(file);
        Ok(args)
    }

    fn check(&self, result: &ProcessResult) -> Result<(), BazelCommandError> {
        if !is_query_outcome(result.exit_code, self.keep_going) {
            return Err(BazelCommandError::failed(BazelVerb::Query, result));
        }
        if result.exit_code != 0 {
            warn!("Query `{}` was only partially evaluated", self.query);
        }
        Ok(())
    }
}

/// `bazel query`, one result per stdout line.
#[derive(Debug)]
pub struct QueryCommand {
    working_directory: PathBuf,
    query: QueryFile,
}

impl QueryCommand {
    pub fn new(working_directory: &Path, query: &str, keep_going: bool) -> Self {
        Self {
            working_directory: working_directory.to_path_buf(),
            query: QueryFile {
                query: query.to_string(),
                keep_going,
                file: None,
            },
        }
    }
}

impl BazelCommand for QueryCommand {
    type Output = Vec<String>;

    fn verb(&self) -> BazelVerb {
        BazelVerb::Query
    }

    fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    fn prepare_command_line(
        &mut self,
        _version: &BazelVersion,
    ) -> Result<Vec<String>, BazelCommandError> {
        self.query.args()
    }

    fn console_name(&self) -> &str {
        "bazel query"
    }

    fn generate_result(self, result: ProcessResult) -> Result<Self::Output, BazelCommandError> {
        self.query.check(&result)?;
        Ok(result
            .stdout
            .unwrap_or_default()
            .lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(|l| l.to_string())
            .collect())
    }
}

/// `bazel query --output=streamed_proto`, decoded into `Target` messages.
#[derive(Debug)]
pub struct QueryForTargetProtoCommand {
    working_directory: PathBuf,
    query: QueryFile,
    output_file: Option<NamedTempFile>,
}

impl QueryForTargetProtoCommand {
    pub fn new(working_directory: &Path, query: &str, keep_going: bool) -> Self {
        Self {
            working_directory: working_directory.to_path_buf(),
            query: QueryFile {
                query: query.to_string(),
                keep_going,
                file: None,
            },
            output_file: None,
        }
    }
}

impl BazelCommand for QueryForTargetProtoCommand {
    type Output = Vec<blaze_query::Target>;

    fn verb(&self) -> BazelVerb {
        BazelVerb::Query
    }

    fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    fn prepare_command_line(
        &mut self,
        _version: &BazelVersion,
    ) -> Result<Vec<String>, BazelCommandError> {
        let mut args = self.query.args()?;
        args.push(String::from("--output=streamed_proto"));
        args.push(String::from("--order_output=no"));
        self.output_file = Some(temp_file("bazel_query_", ".bin")?);
        Ok(args)
    }

    fn stdout_file(&self) -> Option<PathBuf> {
        self.output_file.as_ref().map(|f| f.path().to_path_buf())
    }

    fn console_name(&self) -> &str {
        "bazel query"
    }

    fn generate_result(self, result: ProcessResult) -> Result<Self::Output, BazelCommandError> {
        self.query.check(&result)?;
        let output_file = self.output_file.as_ref().ok_or_else(|| BazelCommandError::Output {
            verb: BazelVerb::Query.as_str(),
            message: String::from("query output file was never allocated"),
        })?;
        let reader = BufReader::new(std::fs::File::open(output_file.path())?);

        let mut targets = Vec::new();
        for target in DelimitedMessageReader::<_, blaze_query::Target>::new(reader) {
            match target {
                Ok(target) => targets.push(target),
                Err(e) => {
                    warn!("Stopped reading query output for `{}`: {}", self.query.query, e);
                    break;
                }
            }
        }
        Ok(targets)
    }
}
