use std::path::{Path, PathBuf};

use bzlsdk_bazel_wrapper::bazel_subprocess_wrapper::{LineSelector, ProcessResult};
use bzlsdk_bazel_wrapper::bep::build_events::{read_build_event_file, BuildEventOutput};
use tempfile::NamedTempFile;

use super::{temp_file, BazelCommand, BazelCommandError, BazelVerb};
use crate::aspect::AspectOptions;
use crate::error_extraction::{BuildErrorParser, ErrorOutputSelector};
use crate::label_utils::BazelLabel;
use crate::model::{BazelProblem, BazelVersion};

// 0 success, 1 build failed, 3 tests failed, 4 no tests found. Anything else
// means bazel itself could not do the work.
fn is_build_outcome(exit_code: i32) -> bool {
    matches!(exit_code, 0 | 1 | 3 | 4)
}

/// `bazel build --keep_going`, reporting target errors as problems.
#[derive(Debug)]
pub struct BuildCommand {
    working_directory: PathBuf,
    build_options: Vec<String>,
    extra_args: Vec<String>,
    targets: Vec<BazelLabel>,
}

impl BuildCommand {
    pub fn new(
        working_directory: &Path,
        build_options: Vec<String>,
        extra_args: Vec<String>,
        targets: Vec<BazelLabel>,
    ) -> Self {
        Self {
            working_directory: working_directory.to_path_buf(),
            build_options,
            extra_args,
            targets,
        }
    }
}

impl BazelCommand for BuildCommand {
    type Output = Vec<BazelProblem>;

    fn verb(&self) -> BazelVerb {
        BazelVerb::Build
    }

    fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    fn prepare_command_line(
        &mut self,
        _version: &BazelVersion,
    ) -> Result<Vec<String>, BazelCommandError> {
        let mut args = self.build_options.clone();
        args.extend(self.extra_args.iter().cloned());
        args.push(String::from("--keep_going"));
        args.push(String::from("--"));
        args.extend(self.targets.iter().map(|t| t.to_string()));
        Ok(args)
    }

    fn take_stderr_selector(&mut self) -> Option<Box<dyn LineSelector>> {
        Some(Box::new(ErrorOutputSelector::default()))
    }

    fn console_name(&self) -> &str {
        "bazel build"
    }

    fn generate_result(self, result: ProcessResult) -> Result<Self::Output, BazelCommandError> {
        if !is_build_outcome(result.exit_code) {
            return Err(BazelCommandError::failed(self.verb(), &result));
        }
        let mut problems = BuildErrorParser::parse_lines(result.selected_stderr_lines.iter());
        if problems.is_empty() && result.exit_code != 0 {
            // Nothing we could parse, hopefully the user can make sense of the raw output.
            let first_line = result
                .selected_stderr_lines
                .first()
                .map(|l| l.as_str())
                .or_else(|| result.stderr.lines().find(|l| !l.trim().is_empty()))
                .unwrap_or("Bazel build failed");
            problems.push(BazelProblem::create_error("", 1, first_line.trim()));
        }
        Ok(problems)
    }
}

/// Builds targets with the dependency-info aspect applied and reads the
/// outputs back from the build event protocol file.
#[derive(Debug)]
pub struct BuildWithAspectsCommand {
    working_directory: PathBuf,
    aspects: AspectOptions,
    build_options: Vec<String>,
    targets: Vec<BazelLabel>,
    bep_file: Option<NamedTempFile>,
}

impl BuildWithAspectsCommand {
    pub fn new(
        working_directory: &Path,
        aspects: AspectOptions,
        build_options: Vec<String>,
        targets: Vec<BazelLabel>,
    ) -> Self {
        Self {
            working_directory: working_directory.to_path_buf(),
            aspects,
            build_options,
            targets,
            bep_file: None,
        }
    }
}

impl BazelCommand for BuildWithAspectsCommand {
    type Output = BuildEventOutput;

    fn verb(&self) -> BazelVerb {
        BazelVerb::Build
    }

    fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    fn prepare_command_line(
        &mut self,
        version: &BazelVersion,
    ) -> Result<Vec<String>, BazelCommandError> {
        let bep_file = temp_file("bazel_build_bep_", ".bin")?;

        let mut args = self.build_options.clone();
        args.extend(self.aspects.flags(version));
        args.push(self.aspects.output_groups_flag());
        args.push(format!(
            "--build_event_binary_file={}",
            bep_file.path().display()
        ));
        args.push(String::from("--nobuild_event_binary_file_path_conversion"));
        args.push(String::from("--keep_going"));
        if version.at_least(6, 0, 0) {
            args.push(String::from("--norun_validations"));
        } else {
            args.push(String::from("--noexperimental_run_validations"));
        }
        args.push(String::from("--curses=no"));
        args.push(String::from("--progress_in_terminal_title=no"));
        args.push(String::from("--"));
        args.extend(self.targets.iter().map(|t| t.to_string()));

        self.bep_file = Some(bep_file);
        Ok(args)
    }

    fn take_stderr_selector(&mut self) -> Option<Box<dyn LineSelector>> {
        Some(Box::new(ErrorOutputSelector::default()))
    }

    fn console_name(&self) -> &str {
        "bazel build (aspects)"
    }

    fn generate_result(self, result: ProcessResult) -> Result<Self::Output, BazelCommandError> {
        if !is_build_outcome(result.exit_code) {
            return Err(BazelCommandError::failed(self.verb(), &result));
        }
        if result.exit_code != 0 {
            warn!(
                "Aspect build finished with exit code {}, using partial results",
                result.exit_code
            );
        }
        let bep_file = self.bep_file.as_ref().ok_or_else(|| BazelCommandError::Output {
            verb: BazelVerb::Build.as_str(),
            message: String::from("build event file was never allocated"),
        })?;
        Ok(read_build_event_file(bep_file.path())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AspectConfig;

    fn labels(raw: &[&str]) -> Vec<BazelLabel> {
        raw.iter().map(|l| BazelLabel::parse(l).unwrap()).collect()
    }

    fn result(exit_code: i32, stderr_lines: &[&str]) -> ProcessResult {
        ProcessResult {
            exit_code,
            stdout: Some(String::new()),
            stderr: stderr_lines.join("\n"),
            selected_stdout_lines: Vec::new(),
            selected_stderr_lines: stderr_lines.iter().map(|l| l.to_string()).collect(),
        }
    }

    #[test]
    fn test_build_command_line() {
        let mut command = BuildCommand::new(
            Path::new("/ws"),
            vec![String::from("--config=ci")],
            vec![String::from("--jobs=4")],
            labels(&["//a:b", "c/..."]),
        );
        assert_eq!(
            command.prepare_command_line(&BazelVersion::default()).unwrap(),
            vec!["--config=ci", "--jobs=4", "--keep_going", "--", "//a:b", "//c/..."]
        );
    }

    #[test]
    fn test_target_errors_are_data() {
        let command = BuildCommand::new(Path::new("/ws"), vec![], vec![], labels(&["//a:b"]));
        let problems = command
            .generate_result(result(
                1,
                &["ERROR: foo", "a/b/Apple.java:15: error: ';' expected", ""],
            ))
            .unwrap();
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].line_number, 15);
    }

    #[test]
    fn test_failed_build_without_parseable_errors_still_reports() {
        let command = BuildCommand::new(Path::new("/ws"), vec![], vec![], labels(&["//a:b"]));
        let problems = command
            .generate_result(result(1, &[]))
            .unwrap();
        assert_eq!(problems, vec![BazelProblem::create_error("", 1, "Bazel build failed")]);
    }

    #[test]
    fn test_invocation_errors_are_failures() {
        let command = BuildCommand::new(Path::new("/ws"), vec![], vec![], labels(&["//a:b"]));
        let err = command
            .generate_result(result(2, &["ERROR: Unrecognized option: --bogus"]))
            .unwrap_err();
        assert!(matches!(
            err,
            BazelCommandError::ExecutionFailed { exit_code: 2, .. }
        ));
    }

    #[test]
    fn test_aspect_command_line() {
        let aspects = AspectOptions::new(AspectConfig {
            repository_directory: Some(PathBuf::from("/opt/aspects")),
            ..AspectConfig::default()
        });
        let mut command = BuildWithAspectsCommand::new(
            Path::new("/ws"),
            aspects,
            vec![],
            labels(&["//a:b"]),
        );

        let args = command
            .prepare_command_line(&BazelVersion::new(6, 0, 0))
            .unwrap();
        let bep = command.bep_file.as_ref().unwrap().path().to_path_buf();
        assert!(bep
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("bazel_build_bep_"));

        assert_eq!(
            args,
            vec![
                String::from("--override_repository=bzljavasdk_aspect=/opt/aspects"),
                String::from(
                    "--aspects=@@bzljavasdk_aspect//:bzljavasdk_aspect.bzl%bzljavasdk_aspect"
                ),
                String::from(
                    "--output_groups=intellij-info-generic,intellij-info-java-direct-deps,intellij-resolve-java-direct-deps"
                ),
                format!("--build_event_binary_file={}", bep.display()),
                String::from("--nobuild_event_binary_file_path_conversion"),
                String::from("--keep_going"),
                String::from("--norun_validations"),
                String::from("--curses=no"),
                String::from("--progress_in_terminal_title=no"),
                String::from("--"),
                String::from("//a:b"),
            ]
        );

        let old = command
            .prepare_command_line(&BazelVersion::new(5, 4, 0))
            .unwrap();
        assert!(old.contains(&String::from("--noexperimental_run_validations")));
    }

    #[test]
    fn test_bep_file_removed_with_command() {
        let mut command = BuildWithAspectsCommand::new(
            Path::new("/ws"),
            AspectOptions::new(AspectConfig::default()),
            vec![],
            labels(&["//a:b"]),
        );
        command
            .prepare_command_line(&BazelVersion::default())
            .unwrap();
        let bep = command.bep_file.as_ref().unwrap().path().to_path_buf();
        assert!(bep.exists());
        drop(command);
        assert!(!bep.exists());
    }
}
