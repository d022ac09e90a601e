mod aspect_target_info;
mod aspects;
mod processor;

pub use aspect_target_info::{load_aspect_files, AspectInfoError, AspectOutputJars, AspectTargetInfo};
pub use aspects::{AspectOptions, LanguageClass, OutputGroup};
pub use processor::{AspectInfoMap, BazelWorkspaceAspectProcessor};
