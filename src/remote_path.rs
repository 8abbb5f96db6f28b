//! Helpers for POSIX paths on the remote host.
//!
//! Remote paths are plain strings: they never touch the local filesystem, so
//! `std::path` semantics (platform separators, prefixes) would be wrong here.

/// Normalize an absolute remote path.
///
/// Collapses duplicate slashes, drops `.` segments, resolves `..` and strips
/// any trailing slash. Relative input is treated as relative to `/`.
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Join a child name (or relative path) onto a directory.
pub fn join(dir: &str, name: &str) -> String {
    if name.starts_with('/') {
        normalize(name)
    } else {
        normalize(&format!("{}/{}", dir, name))
    }
}

/// Parent of a normalized path. The root is its own parent.
pub fn parent(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

/// Last segment of a normalized path (`/` for the root).
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) if idx + 1 < path.len() => &path[idx + 1..],
        _ => path,
    }
}

/// Segments of `path` below `root`, or `None` if `path` is not inside `root`.
///
/// Both arguments must be normalized. The root itself yields an empty list.
pub fn relative_segments<'a>(root: &str, path: &'a str) -> Option<Vec<&'a str>> {
    let rest = if root == "/" {
        path.strip_prefix('/')?
    } else {
        let rest = path.strip_prefix(root)?;
        if rest.is_empty() {
            rest
        } else {
            rest.strip_prefix('/')?
        }
    };
    Some(rest.split('/').filter(|s| !s.is_empty()).collect())
}

/// Quote a string for a POSIX shell using single quotes.
pub fn shell_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/data/"), "/data");
        assert_eq!(normalize("//data///x/"), "/data/x");
        assert_eq!(normalize("/data/./x/../y"), "/data/y");
        assert_eq!(normalize("/.."), "/");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/data", "x"), "/data/x");
        assert_eq!(join("/", "x"), "/x");
        assert_eq!(join("/data", "/etc"), "/etc");
        assert_eq!(join("/data/x", ".."), "/data");
    }

    #[test]
    fn test_parent_and_file_name() {
        assert_eq!(parent("/data/x"), "/data");
        assert_eq!(parent("/data"), "/");
        assert_eq!(parent("/"), "/");
        assert_eq!(file_name("/data/x"), "x");
        assert_eq!(file_name("/"), "/");
    }

    #[test]
    fn test_relative_segments() {
        assert_eq!(relative_segments("/data", "/data/x/y"), Some(vec!["x", "y"]));
        assert_eq!(relative_segments("/data", "/data"), Some(vec![]));
        assert_eq!(relative_segments("/", "/bin"), Some(vec!["bin"]));
        assert_eq!(relative_segments("/data", "/database"), None);
        assert_eq!(relative_segments("/data", "/etc/x"), None);
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/data/my dir"), "'/data/my dir'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }
}
