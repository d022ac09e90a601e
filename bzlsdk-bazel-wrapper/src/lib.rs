pub mod bazel_subprocess_wrapper;
pub mod bep;
