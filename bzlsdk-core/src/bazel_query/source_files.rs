use std::collections::BTreeSet;

use crate::label_utils::BazelLabel;

const BUILD_FILE_NAMES: &[&str] = &["BUILD", "BUILD.bazel"];

pub fn source_files_query(label: &BazelLabel) -> String {
    format!("kind('source file', deps({}))", label)
}

/// Workspace-relative source paths from `kind('source file', ...)` output.
/// External repositories and BUILD files are left out.
pub fn source_file_paths<'a, I>(lines: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    lines
        .into_iter()
        .map(|l| l.trim())
        .filter(|l| l.starts_with("//"))
        .filter_map(|l| l.split_once(':'))
        .map(|(package, file)| {
            let package = package.trim_start_matches('/');
            if package.is_empty() {
                file.to_string()
            } else {
                format!("{}/{}", package, file)
            }
        })
        .filter(|path| {
            let file_name = path.rsplit('/').next().unwrap_or(path.as_str());
            !BUILD_FILE_NAMES.contains(&file_name)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_expression() {
        let label = BazelLabel::parse("//apple-api:apple-api").unwrap();
        assert_eq!(
            source_files_query(&label),
            "kind('source file', deps(//apple-api:apple-api))"
        );

        let tree = BazelLabel::parse("//apple-api/...").unwrap();
        assert_eq!(
            source_files_query(&tree),
            "kind('source file', deps(//apple-api/...))"
        );
    }

    #[test]
    fn test_source_paths() {
        let output: Vec<String> = [
            "@local_jdk//:bin/javap",
            "@bazel_tools//third_party/def_parser:def_parser.h",
            "//apple-api:source/dev/demo/apple/api/AppleOrchard.java",
            "//apple-api:source/dev/demo/apple/api/Apple.java",
            "//apple-api:BUILD",
            "//:tools/Gen.java",
            "//tools:BUILD.bazel",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let paths: Vec<String> = source_file_paths(output.iter()).into_iter().collect();
        assert_eq!(
            paths,
            vec![
                "apple-api/source/dev/demo/apple/api/Apple.java",
                "apple-api/source/dev/demo/apple/api/AppleOrchard.java",
                "tools/Gen.java",
            ]
        );
    }
}
