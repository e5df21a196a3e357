use log::trace;
use snafu::ensure;

use super::{error, Result};

pub const PATH_SEPARATOR: char = '/';
// String refs are more convenient for some Rust functions
pub const PATH_SEPARATOR_STR: &str = "/";

/// PathKind classifies a path string by its addressing form.
///
/// * `Exact` - a plain `/a/b/c` path naming a single entry.
/// * `Directory` - a `/a/b/` form naming the children of `/a/b`.
/// * `Wildcard` - a `/a/b/*` form naming the whole subtree under `/a/b`.
/// * `Root` - any of the root spellings: ``""``, `/`, `*`, `/*`.
/// * `Invalid` - everything else (no leading `/`, a `//`, or a `*` that is
///   not a trailing `/*`).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PathKind {
    Exact,
    Directory,
    Wildcard,
    Root,
    Invalid,
}

/// Classifies a path string.  This is the validation entry point; the
/// operation-specific helpers below reduce it to pass/fail.
pub fn kind<S: AsRef<str>>(path: S) -> PathKind {
    let path = path.as_ref();

    if is_root(path) {
        return PathKind::Root;
    }
    if !path.starts_with(PATH_SEPARATOR) || path.contains("//") {
        return PathKind::Invalid;
    }
    if let Some(prefix) = path.strip_suffix("/*") {
        // Only one wildcard, and only at the end.
        if prefix.contains('*') {
            return PathKind::Invalid;
        }
        return PathKind::Wildcard;
    }
    if path.contains('*') {
        return PathKind::Invalid;
    }
    if path.ends_with(PATH_SEPARATOR) {
        return PathKind::Directory;
    }
    PathKind::Exact
}

/// Whether the path is one of the spellings of the root directory.
pub fn is_root<S: AsRef<str>>(path: S) -> bool {
    matches!(path.as_ref(), "" | "/" | "*" | "/*")
}

/// Checks a path for use with set, get, prune and provide: it must name
/// exactly one entry, so directory forms and wildcards are refused.
pub fn validate_exact<S: AsRef<str>>(path: S) -> Result<()> {
    let path = path.as_ref();
    ensure!(
        kind(path) == PathKind::Exact,
        error::InvalidPathSnafu {
            path,
            msg: "must be an exact path (no wildcard, no trailing separator)",
        }
    );
    Ok(())
}

/// Checks and normalises a search path.  Root spellings normalise to the
/// empty string; anything else must be a directory form, and is returned
/// with its trailing separator intact.  Bare paths are refused, not
/// silently treated as directories.
pub fn search_root<S: AsRef<str>>(path: S) -> Result<String> {
    let path = path.as_ref();
    if is_root(path) {
        return Ok(String::new());
    }
    ensure!(
        kind(path) == PathKind::Directory,
        error::InvalidPathSnafu {
            path,
            msg: "search requires the root or a directory form ending in '/'",
        }
    );
    Ok(path.to_string())
}

/// Splits a path into its segments, ignoring the leading separator and any
/// trailing directory separator.
///
/// Examples:
/// * /a/b/c -> ["a", "b", "c"]
/// * /a/b/  -> ["a", "b"]
/// * ""     -> []
pub fn segments(path: &str) -> Vec<&str> {
    path.split(PATH_SEPARATOR).filter(|s| !s.is_empty()).collect()
}

/// How a watcher pattern matches changed paths.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum PatternKind {
    /// Matches only the identical path.
    Exact,
    /// `P/` - matches paths exactly one level below P.
    OneLevel,
    /// `P/*` - matches P and anything below it.
    Subtree,
    /// A `*` somewhere other than a trailing `/*`.  Accepted at
    /// registration, matches nothing.  Tests depend on this staying true.
    Never,
}

/// A validated watcher pattern.
///
/// Patterns are orderable and hashable so registries can key on them; two
/// patterns are equal when their source strings are equal.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Pattern {
    raw: String,
}

impl Pattern {
    /// Parses a watcher pattern.  Root spellings normalise to `/*` (watch
    /// everything); other patterns must start with `/` and not contain
    /// `//`.  A mid-path `*` is accepted but never matches.
    pub fn parse<S: AsRef<str>>(pattern: S) -> Result<Self> {
        let pattern = pattern.as_ref();
        if is_root(pattern) {
            return Ok(Self { raw: "/*".to_string() });
        }
        ensure!(
            pattern.starts_with(PATH_SEPARATOR) && !pattern.contains("//"),
            error::InvalidPathSnafu {
                path: pattern,
                msg: "pattern must start with '/' and not contain '//'",
            }
        );
        trace!("Parsed watcher pattern '{}'", pattern);
        Ok(Self {
            raw: pattern.to_string(),
        })
    }

    /// The pattern as registered (after root normalisation).
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn classify(&self) -> (PatternKind, &str) {
        if let Some(prefix) = self.raw.strip_suffix("/*") {
            if prefix.contains('*') {
                return (PatternKind::Never, prefix);
            }
            return (PatternKind::Subtree, prefix);
        }
        if self.raw.contains('*') {
            return (PatternKind::Never, &self.raw);
        }
        if let Some(prefix) = self.raw.strip_suffix(PATH_SEPARATOR) {
            return (PatternKind::OneLevel, prefix);
        }
        (PatternKind::Exact, &self.raw)
    }

    /// Whether a changed path falls under this pattern.
    pub fn matches<S: AsRef<str>>(&self, path: S) -> bool {
        let path = path.as_ref();
        let (kind, prefix) = self.classify();
        match kind {
            PatternKind::Exact => path == prefix,
            PatternKind::OneLevel => {
                match path
                    .strip_prefix(prefix)
                    .and_then(|rest| rest.strip_prefix(PATH_SEPARATOR))
                {
                    Some(rest) => !rest.is_empty() && !rest.contains(PATH_SEPARATOR),
                    None => false,
                }
            }
            PatternKind::Subtree => {
                path == prefix
                    || path
                        .strip_prefix(prefix)
                        .map(|rest| rest.starts_with(PATH_SEPARATOR))
                        .unwrap_or(false)
            }
            PatternKind::Never => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{kind, search_root, segments, validate_exact, PathKind, Pattern};

    #[test]
    fn exact_path_ok() {
        assert_eq!(kind("/a"), PathKind::Exact);
        assert_eq!(kind("/entity/zones/private/name"), PathKind::Exact);
    }

    #[test]
    fn directory_and_wildcard_forms() {
        assert_eq!(kind("/entity/zones/"), PathKind::Directory);
        assert_eq!(kind("/entity/zones/*"), PathKind::Wildcard);
    }

    #[test]
    fn root_spellings() {
        for root in ["", "/", "*", "/*"] {
            assert_eq!(kind(root), PathKind::Root);
        }
    }

    #[test]
    fn bad_paths() {
        assert_eq!(kind("relative/path"), PathKind::Invalid);
        assert_eq!(kind("/a//b"), PathKind::Invalid);
        assert_eq!(kind("/a/*/b"), PathKind::Invalid);
        assert_eq!(kind("/a*"), PathKind::Invalid);
        assert_eq!(kind("/a/*/b/*"), PathKind::Invalid);
    }

    #[test]
    fn exact_validation() {
        assert!(validate_exact("/a/b").is_ok());
        assert!(validate_exact("/a/b/").is_err());
        assert!(validate_exact("/a/b/*").is_err());
        assert!(validate_exact("/").is_err());
        assert!(validate_exact("a/b").is_err());
    }

    #[test]
    fn search_root_normalises() {
        for root in ["", "/", "*", "/*"] {
            assert_eq!(search_root(root).unwrap(), "");
        }
        assert_eq!(search_root("/entity/zones/").unwrap(), "/entity/zones/");
    }

    // Callers who forget the trailing separator get an error, not a guess.
    #[test]
    fn search_requires_directory_form() {
        assert!(search_root("/entity/zones").is_err());
        assert!(search_root("/entity//zones/").is_err());
    }

    #[test]
    fn segment_split() {
        assert_eq!(segments("/a/b/c"), vec!["a", "b", "c"]);
        assert_eq!(segments("/a/b/"), vec!["a", "b"]);
        assert!(segments("").is_empty());
        assert!(segments("/").is_empty());
    }

    #[test]
    fn exact_pattern_matches_itself_only() {
        let p = Pattern::parse("/e/z/state").unwrap();
        assert!(p.matches("/e/z/state"));
        assert!(!p.matches("/e/z/state/deeper"));
        assert!(!p.matches("/e/z"));
    }

    #[test]
    fn one_level_pattern() {
        let p = Pattern::parse("/e/z/").unwrap();
        assert!(p.matches("/e/z/state"));
        assert!(!p.matches("/e/z"));
        assert!(!p.matches("/e/zz"));
        assert!(!p.matches("/e/z/state/deeper"));
        assert!(!p.matches("/e/other"));
    }

    #[test]
    fn subtree_pattern() {
        let p = Pattern::parse("/e/z/*").unwrap();
        assert!(p.matches("/e/z"));
        assert!(p.matches("/e/z/state"));
        assert!(p.matches("/e/z/a/b/c"));
        assert!(!p.matches("/e/zz"));
        assert!(!p.matches("/e/other/state"));
    }

    #[test]
    fn root_pattern_matches_everything() {
        for root in ["", "/", "*", "/*"] {
            let p = Pattern::parse(root).unwrap();
            assert_eq!(p.as_str(), "/*");
            assert!(p.matches("/a"));
            assert!(p.matches("/a/b/c"));
        }
    }

    // A wildcard that isn't the trailing segment is registered but never
    // fires.
    #[test]
    fn mid_path_wildcard_never_matches() {
        let p = Pattern::parse("/entity/zones/*/state").unwrap();
        assert!(!p.matches("/entity/zones/public/state"));
        assert!(!p.matches("/entity/zones/*/state"));

        let p = Pattern::parse("/entity/*/zones/*").unwrap();
        assert!(!p.matches("/entity/a/zones/b"));
    }

    #[test]
    fn pattern_rejects_bad_shapes() {
        assert!(Pattern::parse("relative").is_err());
        assert!(Pattern::parse("/a//b").is_err());
    }

    #[test]
    fn similar_prefixes_do_not_match() {
        let p = Pattern::parse("/interfaces/eth0/*").unwrap();
        assert!(!p.matches("/interfaces/eth01"));
        assert!(p.matches("/interfaces/eth0/state"));
    }
}
