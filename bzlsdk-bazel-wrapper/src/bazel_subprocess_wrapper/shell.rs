use std::path::{Path, PathBuf};

use super::ExecutionError;

const FALLBACK_SHELLS: &[&str] = &["/bin/bash", "/usr/bin/bash", "/bin/zsh", "/usr/bin/zsh"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShellKind {
    Fish,
    Zsh,
    Bash,
}

impl ShellKind {
    fn from_path(path: &Path) -> Option<ShellKind> {
        match path.file_name()?.to_str()? {
            "fish" => Some(ShellKind::Fish),
            "zsh" => Some(ShellKind::Zsh),
            "bash" => Some(ShellKind::Bash),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetectedShell {
    pub path: PathBuf,
    pub kind: ShellKind,
}

impl DetectedShell {
    pub fn new(path: impl Into<PathBuf>) -> Result<DetectedShell, ExecutionError> {
        let path = path.into();
        match ShellKind::from_path(&path) {
            Some(kind) => Ok(DetectedShell { path, kind }),
            None => Err(ExecutionError::UnsupportedShell(
                path.to_string_lossy().to_string(),
            )),
        }
    }

    /// The user's login shell from `$SHELL`, falling back to a bash or zsh
    /// found in the usual places.
    pub fn detect() -> Result<DetectedShell, ExecutionError> {
        let from_env = std::env::var_os("SHELL").map(PathBuf::from);
        if let Some(shell) = from_env.as_ref() {
            if let Ok(detected) = DetectedShell::new(shell.clone()) {
                return Ok(detected);
            }
            log::debug!("Login shell {:?} is not supported, looking for a fallback", shell);
        }

        for candidate in FALLBACK_SHELLS {
            let path = Path::new(candidate);
            if path.exists() {
                return DetectedShell::new(path);
            }
        }

        match from_env {
            Some(shell) => Err(ExecutionError::UnsupportedShell(
                shell.to_string_lossy().to_string(),
            )),
            None => Err(ExecutionError::ShellUnavailable {
                tried: FALLBACK_SHELLS.join(", "),
            }),
        }
    }

    /// Builds `[shell, flags.., "<quoted command line>"]` for the given OS name
    /// (as reported by `std::env::consts::OS`).
    pub fn wrap(&self, os: &str, argv: &[String]) -> Result<Vec<String>, ExecutionError> {
        let mut wrapped = vec![self.path.to_string_lossy().to_string()];
        match os {
            // GUI launched processes on macOS only get the rc-file environment from a login shell.
            "macos" => wrapped.push(String::from("-l")),
            "linux" | "freebsd" | "netbsd" | "openbsd" | "dragonfly" => {}
            other => return Err(ExecutionError::UnsupportedPlatform(other.to_string())),
        }
        wrapped.push(String::from("-c"));
        wrapped.push(to_quoted_string_for_shell(argv));
        Ok(wrapped)
    }
}

/// Wraps `argv` into the detected login shell of the current platform.
pub fn wrap_execution_into_shell(argv: &[String]) -> Result<Vec<String>, ExecutionError> {
    let os = std::env::consts::OS;
    if os == "windows" {
        return Err(ExecutionError::UnsupportedPlatform(os.to_string()));
    }
    DetectedShell::detect()?.wrap(os, argv)
}

/// Joins arguments into one shell command string. Arguments containing
/// whitespace are double quoted unless they already start with an escaped
/// quote; embedded double quotes are escaped.
pub fn to_quoted_string_for_shell(args: &[String]) -> String {
    let mut result = String::new();
    for arg in args {
        if !result.is_empty() {
            result.push(' ');
        }
        let quote_arg = arg.chars().any(char::is_whitespace) && !arg.starts_with("\\\"");
        if quote_arg {
            result.push('"');
        }
        result.push_str(&arg.replace('"', "\\\""));
        if quote_arg {
            result.push('"');
        }
    }
    result
}
