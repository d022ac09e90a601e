use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bzlsdk_bazel_wrapper::bazel_subprocess_wrapper::ProcessResult;
use lazy_static::lazy_static;
use regex::Regex;

use super::{BazelCommand, BazelCommandError, BazelVerb};
use crate::model::BazelVersion;

lazy_static! {
    //   Inherited 'build' options: --stamp --javacopt=-source 8 -target 8
    //   'test' options: --test_timeout=45,180,300,360
    static ref RC_OPTIONS_LINE: Regex =
        Regex::new(r"^(?:Inherited\s+)?'([^']+)' options:\s*(.*)$").unwrap();
}

/// Options the workspace rc files (and the client) apply, as reported by
/// `--announce_rc`. Bare flags are recorded with the value `"true"`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BazelWorkspaceCommandOptions {
    options: BTreeMap<String, String>,
    contextual_options: BTreeMap<String, BTreeMap<String, String>>,
}

impl BazelWorkspaceCommandOptions {
    pub fn parse_lines<'a, I>(lines: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut parsed = Self::default();
        for line in lines {
            parsed.parse_line(line);
        }
        parsed
    }

    fn parse_line(&mut self, line: &str) {
        let captures = match RC_OPTIONS_LINE.captures(line.trim()) {
            Some(captures) => captures,
            None => return,
        };
        let context = captures[1].to_string();
        let options = captures[2].trim();
        if options.is_empty() {
            return;
        }

        // Values may contain spaces, so options are only delimited by " --".
        for option in options.split(" --") {
            let option = option.trim().trim_start_matches("--");
            if option.is_empty() {
                continue;
            }
            let (name, value) = match option.split_once('=') {
                Some((name, value)) => (name, value),
                None => match option.split_once(' ') {
                    Some((name, value)) => (name, value.trim()),
                    None => (option, "true"),
                },
            };
            self.options.insert(name.to_string(), value.to_string());
            self.contextual_options
                .entry(context.clone())
                .or_default()
                .insert(name.to_string(), value.to_string());
        }
    }

    /// Last value seen for `name` in any context.
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(|v| v.as_str())
    }

    pub fn contextual_option(&self, context: &str, name: &str) -> Option<&str> {
        self.contextual_options
            .get(context)
            .and_then(|options| options.get(name))
            .map(|v| v.as_str())
    }

    pub fn contexts(&self) -> impl Iterator<Item = &str> {
        self.contextual_options.keys().map(|c| c.as_str())
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

impl std::fmt::Display for BazelWorkspaceCommandOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BazelWorkspaceCommandOptions:")?;
        for (name, value) in self.options.iter() {
            write!(f, " [{}:{}]", name, value)?;
        }
        Ok(())
    }
}

/// `bazel test --announce_rc`. Test covers the most option contexts; no targets
/// are given so nothing is built, the rc report on stderr is all we want.
#[derive(Debug)]
pub struct AnnounceRcCommand {
    working_directory: PathBuf,
}

impl AnnounceRcCommand {
    pub fn new(working_directory: &Path) -> Self {
        Self {
            working_directory: working_directory.to_path_buf(),
        }
    }
}

impl BazelCommand for AnnounceRcCommand {
    type Output = BazelWorkspaceCommandOptions;

    fn verb(&self) -> BazelVerb {
        BazelVerb::Test
    }

    fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    fn prepare_command_line(
        &mut self,
        _version: &BazelVersion,
    ) -> Result<Vec<String>, BazelCommandError> {
        Ok(vec![String::from("--announce_rc")])
    }

    fn generate_result(self, result: ProcessResult) -> Result<Self::Output, BazelCommandError> {
        if !result.success() {
            debug!(
                "`bazel test --announce_rc` exited with {}, parsing what it reported",
                result.exit_code
            );
        }
        Ok(BazelWorkspaceCommandOptions::parse_lines(
            result.stderr.lines(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANNOUNCE_RC_OUTPUT: &str = r#"INFO: Options provided by the client:
  Inherited 'common' options: --isatty=1 --terminal_columns=260
INFO: Reading rc options for 'test' from /home/dev/ws/.user-bazelrc:
  Inherited 'build' options: --javacopt=-source 8 -target 8 --stamp --workspace_status_command tools/buildstamp/get_workspace_status --output_filter=^(?!@)
INFO: Reading rc options for 'test' from /home/dev/ws/.base-bazelrc:
  'test' options: --explicit_java_test_deps=true --test_timeout=45,180,300,360 --test_tag_filters=-flaky
ERROR: No targets specified"#;

    #[test]
    fn test_parse_announce_rc() {
        let options = BazelWorkspaceCommandOptions::parse_lines(ANNOUNCE_RC_OUTPUT.lines());

        assert_eq!(options.option("isatty"), Some("1"));
        assert_eq!(options.option("stamp"), Some("true"));
        assert_eq!(options.option("javacopt"), Some("-source 8 -target 8"));
        assert_eq!(
            options.option("workspace_status_command"),
            Some("tools/buildstamp/get_workspace_status")
        );
        assert_eq!(options.option("output_filter"), Some("^(?!@)"));
        assert_eq!(
            options.contextual_option("test", "test_timeout"),
            Some("45,180,300,360")
        );
        assert_eq!(options.contextual_option("build", "test_timeout"), None);
        assert_eq!(
            options.contexts().collect::<Vec<_>>(),
            vec!["build", "common", "test"]
        );
        assert_eq!(options.len(), 9);
    }

    #[test]
    fn test_unrelated_output_yields_nothing() {
        let options = BazelWorkspaceCommandOptions::parse_lines(
            "INFO: Invocation ID: 1234\nLoading: 0 packages loaded\n".lines(),
        );
        assert!(options.is_empty());
    }

    #[test]
    fn test_command_reads_stderr_regardless_of_exit() {
        let mut command = AnnounceRcCommand::new(Path::new("/ws"));
        assert_eq!(
            command
                .prepare_command_line(&BazelVersion::default())
                .unwrap(),
            vec!["--announce_rc"]
        );
        let options = command
            .generate_result(ProcessResult {
                exit_code: 2,
                stderr: ANNOUNCE_RC_OUTPUT.to_string(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(options.contextual_option("common", "terminal_columns"), Some("260"));
    }
}
