mod bazel_workspace;
mod command_manager;
mod command_runner;
mod global_runner;
mod workspace_command_error;

pub use bazel_workspace::{is_workspace_root, BazelWorkspace};
pub use command_manager::BazelCommandManager;
pub use command_runner::BazelWorkspaceCommandRunner;
pub use global_runner::BazelGlobalCommandRunner;
pub use workspace_command_error::WorkspaceCommandError;
