//! Side-channel result file written by the build tool.
//!
//! The file is a flat list of `key = value` lines written from Java, so
//! path separators arrive escaped (`c\:\\Users\\me` for `c:/Users/me`).

use crate::error::{ErrorExt, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// Key naming the runtime directory of a failed stage.
pub const RUNTIME_DIR_KEY: &str = "build.runtime";

/// Parse property text. Comment and blank lines are ignored, as are
/// lines without `=`.
pub fn parse_properties(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), unescape(value.trim())))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Undo Java property escaping of path separators.
pub fn unescape(value: &str) -> String {
    value.replace(r"\:", ":").replace(r"\\", "/")
}

/// Read a property file. A missing file reads as empty.
pub async fn read_property_file(path: &Path) -> Result<BTreeMap<String, String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(parse_properties(&text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(e).fs_context("reading property file", path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_unescapes() {
        let text = "#Written by ant\n\
build.out = c\\:\\\\Users\\\\testing\\\\dart-all/dart\n\
\n\
build.runtime=/tmp/runtime\n\
junk line\n";
        let props = parse_properties(text);
        assert_eq!(props.len(), 2);
        assert_eq!(props["build.out"], "c:/Users/testing/dart-all/dart");
        assert_eq!(props[RUNTIME_DIR_KEY], "/tmp/runtime");
    }

    #[test]
    fn value_keeps_later_equals_signs() {
        let props = parse_properties("jvm.args = -Xmx=1g");
        assert_eq!(props["jvm.args"], "-Xmx=1g");
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let props = read_property_file(&tmp.path().join("none.property")).await.unwrap();
        assert!(props.is_empty());
    }
}
