mod build_file_cache;
mod query_cache;
mod source_files;

pub use build_file_cache::{build_file_label, build_files_from_targets, package_rules_query, BuildFileCache};
pub use query_cache::{QueryCache, DEFAULT_QUERY_CACHE_CAPACITY};
pub use source_files::{source_file_paths, source_files_query};
