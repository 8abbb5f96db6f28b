//! Shell commands the browser sends to the remote host.

use crate::remote_path::shell_quote;

const EXISTS: &str = "exists";
const NOT_EXISTS: &str = "not exists";

/// List directories below `path`, at most `max_depth` levels deep, sorted.
pub fn listing_command(path: &str, max_depth: usize) -> String {
    format!(
        "find {} -mindepth 1 -maxdepth {} -type d 2>/dev/null | sort",
        shell_quote(path),
        max_depth.max(1)
    )
}

/// Print `exists` or `not exists` for a directory.
pub fn existence_command(path: &str) -> String {
    format!(
        "if [ -d {} ]; then echo '{}'; else echo '{}'; fi",
        shell_quote(path),
        EXISTS,
        NOT_EXISTS
    )
}

/// Interpret the output of [`existence_command`].
///
/// `None` means the output was neither answer, e.g. a shell error.
pub fn parse_existence(output: &str) -> Option<bool> {
    match output.lines().map(str::trim).filter(|l| !l.is_empty()).last() {
        Some(EXISTS) => Some(true),
        Some(NOT_EXISTS) => Some(false),
        _ => None,
    }
}

/// Create a directory and any missing parents.
pub fn mkdir_command(path: &str) -> String {
    format!("mkdir -p {}", shell_quote(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_command() {
        assert_eq!(
            listing_command("/data", 2),
            "find '/data' -mindepth 1 -maxdepth 2 -type d 2>/dev/null | sort"
        );
        assert!(listing_command("/data", 0).contains("-maxdepth 1 "));
    }

    #[test]
    fn test_quoting() {
        assert_eq!(
            existence_command("/it's here"),
            "if [ -d '/it'\\''s here' ]; then echo 'exists'; else echo 'not exists'; fi"
        );
        assert_eq!(mkdir_command("/a b"), "mkdir -p '/a b'");
    }

    #[test]
    fn test_parse_existence() {
        assert_eq!(parse_existence("exists\n"), Some(true));
        assert_eq!(parse_existence("not exists"), Some(false));
        assert_eq!(parse_existence("motd noise\nexists\n"), Some(true));
        assert_eq!(parse_existence(""), None);
        assert_eq!(parse_existence("sh: syntax error"), None);
    }
}
