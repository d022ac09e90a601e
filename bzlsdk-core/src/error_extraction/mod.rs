mod build_errors;

pub use build_errors::{
    slice_error_line, BuildErrorParser, ErrorBlock, ErrorOutputSelector, ParserState,
};
