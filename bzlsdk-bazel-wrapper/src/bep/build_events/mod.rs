mod bep_file;
pub mod hydrated_stream;

pub use bep_file::{read_build_event_file, BuildEventOutput};
