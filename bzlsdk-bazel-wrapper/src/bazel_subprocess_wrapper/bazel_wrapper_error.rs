use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Refusing to execute an empty command line")]
    EmptyCommandLine,
    #[error("Failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("IO failure while running `{command}`: {source}")]
    Io {
        command: String,
        source: std::io::Error,
    },
    #[error("Unable to wrap in shell, no supported shell detected (tried {tried})")]
    ShellUnavailable { tried: String },
    #[error("Unsupported shell `{0}`, expected one of fish, zsh or bash")]
    UnsupportedShell(String),
    #[error("Shell wrapping is not supported on platform `{0}`")]
    UnsupportedPlatform(String),
    #[error("User cancelled `{command}`")]
    Cancelled { command: String },
}

impl ExecutionError {
    /// True for failures caused by local setup rather than the running process.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ExecutionError::ShellUnavailable { .. }
                | ExecutionError::UnsupportedShell(_)
                | ExecutionError::UnsupportedPlatform(_)
        )
    }
}
