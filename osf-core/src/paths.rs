//! Pure helpers for remote paths. Remote paths are always absolute, so the
//! normalized form drops the leading separator.

/// Storage add-ons recognised as a leading path segment when no list is
/// configured.
pub const DEFAULT_PROVIDERS: &[&str] = &[
    "osfstorage",
    "github",
    "figshare",
    "googledrive",
    "azureblobstorage",
    "bitbucket",
    "box",
    "dataverse",
    "dropbox",
    "gitlab",
    "iqbrims",
    "nextcloud",
    "nextcloudinstitutions",
    "ociinstitutions",
    "owncloud",
    "onedrivebusiness",
    "s3",
    "s3compat",
    "s3compatb3",
    "s3compatinstitutions",
    "swift",
    "weko",
];

pub const DEFAULT_PROVIDER: &str = "osfstorage";

/// Collapses separators, `.` and `..` segments and strips the leading
/// separator. The root normalizes to the empty string.
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
    segments.join("/")
}

/// Splits a leading provider segment off `path`.
///
/// The provider is only recognised when something follows it, so a bare
/// `osfstorage` is treated as a file name in the default provider.
pub fn split_provider<S: AsRef<str>>(
    path: &str,
    known_providers: &[S],
    default: &str,
) -> (String, String) {
    let path = normalize(path);
    if let Some((first, rest)) = path.split_once('/')
        && known_providers.iter().any(|p| p.as_ref() == first)
    {
        return (first.to_string(), rest.to_string());
    }
    (default.to_string(), path)
}

/// Matches one path segment against a pattern segment.
///
/// `%abc%` matches values containing `abc`, `%abc` values ending with it and
/// `abc%` values starting with it. Anything else must be equal.
pub fn match_segment(pattern: &str, value: &str) -> bool {
    if let Some(inner) = pattern.strip_prefix('%').and_then(|p| p.strip_suffix('%')) {
        return value.contains(inner);
    }
    if let Some(suffix) = pattern.strip_prefix('%') {
        return value.ends_with(suffix);
    }
    if let Some(prefix) = pattern.strip_suffix('%') {
        return value.starts_with(prefix);
    }
    pattern == value
}

/// Segment-wise match of `pattern` against `candidate`, compared only over
/// the segments both paths have. A missing pattern matches everything.
pub fn matches_pattern(pattern: Option<&str>, candidate: &str) -> bool {
    let Some(pattern) = pattern else {
        return true;
    };
    raw_segments(pattern)
        .iter()
        .zip(raw_segments(candidate).iter())
        .all(|(p, c)| match_segment(p, c))
}

pub fn join(parent: &str, name: &str) -> String {
    let parent = normalize(parent);
    let name = name.trim_matches('/');
    if parent.is_empty() {
        format!("/{name}")
    } else {
        format!("/{parent}/{name}")
    }
}

pub fn split_leaf(normalized: &str) -> (Vec<&str>, &str) {
    match normalized.rsplit_once('/') {
        Some((dir, leaf)) => (dir.split('/').filter(|s| !s.is_empty()).collect(), leaf),
        None => (Vec::new(), normalized),
    }
}

fn raw_segments(path: &str) -> Vec<&str> {
    let path = path.strip_prefix('/').unwrap_or(path);
    let mut segments: Vec<&str> = path.split('/').collect();
    if segments.last() == Some(&"") {
        segments.pop();
    }
    segments
}
