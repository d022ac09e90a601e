pub mod blaze_query {
    include!(concat!(env!("OUT_DIR"), "/blaze_query.rs"));

    impl Target {
        /// Name of whichever target flavour is populated.
        pub fn name(&self) -> Option<&str> {
            if let Some(rule) = &self.rule {
                return Some(rule.name.as_str());
            }
            if let Some(source_file) = &self.source_file {
                return Some(source_file.name.as_str());
            }
            self.generated_file.as_ref().map(|g| g.name.as_str())
        }
    }
}

pub mod build_event_stream {
    include!(concat!(env!("OUT_DIR"), "/build_event_stream.rs"));
}

mod delimited;
pub use delimited::{DelimitedMessageReader, DelimitedReadError};
