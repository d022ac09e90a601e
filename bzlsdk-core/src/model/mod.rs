mod bazel_build_file;
mod bazel_problem;
mod bazel_version;
mod target_kind;

pub use bazel_build_file::BazelBuildFile;
pub use bazel_problem::BazelProblem;
pub use bazel_version::BazelVersion;
pub use target_kind::{TargetKind, TargetKindRegistry};
