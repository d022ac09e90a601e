use bzlsdk_bazel_wrapper::bazel_subprocess_wrapper::LineSelector;

use crate::model::BazelProblem;

const JAVA_SOURCE_MARKER: &str = ".java:";
const UNPARSEABLE_DESCRIPTION: &str = "BUILD file error";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorBlock {
    header: String,
    source_line: Option<String>,
    emitted: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParserState {
    ScanningForError,
    AccumulatingError(ErrorBlock),
}

/// Turns the stderr of a `bazel build` into problems, one line at a time.
///
/// An `ERROR:` line opens a block. Inside a block a java compiler line
/// (`path/Foo.java:12: error: ...`) starts a record, and the first line after it is
/// appended to the record as detail. Blank lines flush the pending record,
/// `INFO:`/`FAILED:` lines close the block. A block that never produced a java
/// record is reported from its `ERROR:` header instead.
#[derive(Clone, Debug)]
pub struct BuildErrorParser {
    state: ParserState,
    emitted_total: usize,
}

impl Default for BuildErrorParser {
    fn default() -> Self {
        Self {
            state: ParserState::ScanningForError,
            emitted_total: 0,
        }
    }
}

impl BuildErrorParser {
    pub fn parse_lines<I, S>(lines: I) -> Vec<BazelProblem>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parser = BuildErrorParser::default();
        let mut problems = Vec::new();
        for line in lines {
            problems.extend(parser.feed(line.as_ref()));
        }
        problems.extend(parser.finish());
        problems
    }

    pub fn state(&self) -> &ParserState {
        &self.state
    }

    pub fn feed(&mut self, line: &str) -> Vec<BazelProblem> {
        let line = line.trim();
        let mut problems = Vec::new();

        let state = std::mem::replace(&mut self.state, ParserState::ScanningForError);
        self.state = match state {
            ParserState::ScanningForError => {
                if is_error_status_line(line) {
                    ParserState::AccumulatingError(ErrorBlock::opened_by(line))
                } else {
                    ParserState::ScanningForError
                }
            }
            ParserState::AccumulatingError(mut block) => {
                if is_error_status_line(line) {
                    self.close_block(block, &mut problems);
                    ParserState::AccumulatingError(ErrorBlock::opened_by(line))
                } else if is_non_error_status_line(line) {
                    self.close_block(block, &mut problems);
                    ParserState::ScanningForError
                } else if line.is_empty() {
                    self.flush_record(&mut block, None, &mut problems);
                    ParserState::AccumulatingError(block)
                } else if line.contains(JAVA_SOURCE_MARKER) {
                    self.flush_record(&mut block, None, &mut problems);
                    block.source_line = Some(line.to_string());
                    ParserState::AccumulatingError(block)
                } else {
                    // Only the first detail line is kept, the record is complete after it.
                    if block.source_line.is_some() {
                        self.flush_record(&mut block, Some(line), &mut problems);
                    }
                    ParserState::AccumulatingError(block)
                }
            }
        };
        problems
    }

    pub fn finish(mut self) -> Vec<BazelProblem> {
        let mut problems = Vec::new();
        let state = std::mem::replace(&mut self.state, ParserState::ScanningForError);
        if let ParserState::AccumulatingError(block) = state {
            self.close_block(block, &mut problems);
        }
        problems
    }

    fn flush_record(
        &mut self,
        block: &mut ErrorBlock,
        details: Option<&str>,
        problems: &mut Vec<BazelProblem>,
    ) {
        if let Some(source_line) = block.source_line.take() {
            problems.push(java_error_to_problem(&source_line, details));
            block.emitted += 1;
            self.emitted_total += 1;
        }
    }

    fn close_block(&mut self, mut block: ErrorBlock, problems: &mut Vec<BazelProblem>) {
        self.flush_record(&mut block, None, problems);
        if block.emitted > 0 {
            return;
        }
        // `error loading package` is a summary of the lines reported just before it.
        if block.header.starts_with("ERROR: error loading package") && self.emitted_total > 0 {
            return;
        }
        problems.push(slice_error_line(&block.header));
        self.emitted_total += 1;
    }
}

impl ErrorBlock {
    fn opened_by(line: &str) -> Self {
        ErrorBlock {
            header: line.to_string(),
            ..ErrorBlock::default()
        }
    }
}

fn is_error_status_line(line: &str) -> bool {
    line.starts_with("ERROR:")
}

fn is_non_error_status_line(line: &str) -> bool {
    line.starts_with("INFO:") || line.starts_with("FAILED:")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn java_error_to_problem(source_line: &str, details: Option<&str>) -> BazelProblem {
    let source_path = source_line
        .rfind(JAVA_SOURCE_MARKER)
        .map(|idx| &source_line[..idx + JAVA_SOURCE_MARKER.len() - 1]);

    let decomposed = source_path.and_then(|path| {
        let rest = &source_line[path.len() + 1..];
        let (line_number, description) = rest.split_once(':')?;
        Some((path, line_number, description))
    });

    match decomposed {
        Some((path, line_number, description)) => {
            let line_number = line_number.trim().parse::<u32>().unwrap_or(1);
            let mut description = description.trim();
            for prefix in ["error:", "ERROR:"] {
                if let Some(stripped) = description.strip_prefix(prefix) {
                    description = stripped.trim();
                    break;
                }
            }
            let mut description = capitalize(description);
            if let Some(details) = details {
                description.push_str(": ");
                description.push_str(details);
            }
            BazelProblem::create_error(path, line_number, description)
        }
        None => {
            warn!(
                "Unable to decompose build error `{}` with details {:?}",
                source_line, details
            );
            BazelProblem::create_error(source_path.unwrap_or(""), 1, UNPARSEABLE_DESCRIPTION)
        }
    }
}

/// `ERROR: <path>:<line>:<column>: <description>`
pub fn slice_error_line(line: &str) -> BazelProblem {
    let line = line.strip_prefix("ERROR:").unwrap_or(line).trim_start();

    let mut path_end = line.find(':');
    // C:\ style drive prefix
    if cfg!(windows) && path_end == Some(1) {
        path_end = line[2..].find(':').map(|idx| idx + 2);
    }
    let path_end = match path_end {
        Some(idx) => idx,
        None => return BazelProblem::create_error("", 1, line.trim()),
    };
    let path = &line[..path_end];
    let rest = &line[path_end + 1..];

    let (line_number, rest) = match rest.split_once(':') {
        Some((number, rest)) => (number.trim().parse::<u32>().ok(), rest),
        None => return BazelProblem::create_error(path, 1, rest.trim()),
    };
    let description = match line_number {
        // column
        Some(_) => rest
            .split_once(':')
            .filter(|(column, _)| column.trim().parse::<u32>().is_ok())
            .map(|(_, description)| description)
            .unwrap_or(rest),
        None => rest,
    };

    BazelProblem::create_error(path, line_number.unwrap_or(1), description.trim())
}

/// Keeps stderr from the first `ERROR` line onwards, which is all the problem
/// parser needs.
#[derive(Clone, Debug, Default)]
pub struct ErrorOutputSelector {
    seen_error: bool,
}

impl LineSelector for ErrorOutputSelector {
    fn select(&mut self, line: &str) -> Option<String> {
        if !self.seen_error && line.starts_with("ERROR") {
            self.seen_error = true;
        }
        if self.seen_error {
            Some(line.to_string())
        } else {
            None
        }
    }
}
