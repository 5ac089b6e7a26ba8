/// Basename exclusion rules for the scanner.
///
/// A pattern is either an exact basename (`node_modules`) or a glob where
/// `*` matches any run of characters inside the basename (`*.tmp`,
/// `cache-*`). Patterns never match across path separators.

/// Always excluded, in addition to caller patterns.
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    ".git",
    ".DS_Store",
    "node_modules",
    ".Trash",
    ".Spotlight-V100",
    ".fseventsd",
    ".TemporaryItems",
];

#[derive(Debug, Clone)]
enum Pattern {
    Exact(String),
    Glob(Vec<String>),
}

/// Compiled set of exclusion patterns.
#[derive(Debug, Clone)]
pub struct ExcludeMatcher {
    patterns: Vec<Pattern>,
}

impl ExcludeMatcher {
    /// Defaults plus `extra`. Duplicates are harmless.
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = DEFAULT_EXCLUDE_PATTERNS
            .iter()
            .map(|p| compile(p))
            .chain(extra.into_iter().filter_map(|p| {
                let p = p.as_ref().trim();
                (!p.is_empty()).then(|| compile(p))
            }))
            .collect();
        Self { patterns }
    }

    /// `true` if `basename` matches any pattern.
    pub fn is_excluded(&self, basename: &str) -> bool {
        self.patterns.iter().any(|p| match p {
            Pattern::Exact(name) => name == basename,
            Pattern::Glob(parts) => glob_match(parts, basename),
        })
    }
}

impl Default for ExcludeMatcher {
    fn default() -> Self {
        Self::new(std::iter::empty::<&str>())
    }
}

fn compile(pattern: &str) -> Pattern {
    if pattern.contains('*') {
        Pattern::Glob(pattern.split('*').map(str::to_string).collect())
    } else {
        Pattern::Exact(pattern.to_string())
    }
}

/// `parts` is the pattern split on `*`: first part anchors the start, last
/// part anchors the end, middle parts must appear in order.
fn glob_match(parts: &[String], name: &str) -> bool {
    let (first, rest) = match parts.split_first() {
        Some(split) => split,
        None => return name.is_empty(),
    };
    let Some(mut remaining) = name.strip_prefix(first.as_str()) else {
        return false;
    };
    let Some((last, middle)) = rest.split_last() else {
        return remaining.is_empty();
    };
    for part in middle {
        match remaining.find(part.as_str()) {
            Some(pos) => remaining = &remaining[pos + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last.as_str())
}
