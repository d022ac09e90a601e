extern crate lazy_static;

#[macro_use]
extern crate log;

pub mod aspect;
pub mod bazel_command;
pub mod bazel_query;
pub mod config;
pub mod error_extraction;
pub mod label_utils;
pub mod model;
pub mod workspace;

#[cfg(test)]
pub(crate) mod test_tools;
