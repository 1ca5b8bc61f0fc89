//! Path utilities (C1): specifier classification, joining/normalizing,
//! `file:` URL encoding and dirname/basename/format-by-extension.
//!
//! Grounded on `jjs-core/annex/annex-path.c`. The C core runs these over
//! `ecma_value_t` strings pulled through a scratch allocator; here they run
//! over owned `String`/`Path` values since Rust's ownership model makes the
//! scratch-arena dance unnecessary for this piece (see [`crate::scratch`]
//! for the one place a reusable buffer still earns its keep: file reads).

use std::path::{Path, PathBuf};
use url::Url;

/// Which module semantics a resolve/load request is made on behalf of.
/// Threaded through pmap resolution, the resolver/loader chain, and
/// `import.meta`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    /// An ECMAScript module (`import`).
    Module,
    /// A CommonJS module (`require`).
    CommonJs,
}

/// The result of classifying a module specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecifierKind {
    /// Starts with `./`, `../`, or a Windows drive-relative prefix.
    Relative,
    /// Starts with `/`, a Windows drive-absolute path, or a UNC prefix.
    Absolute,
    /// Starts with the literal `file:` scheme.
    FileUrl,
    /// Anything else: a candidate for pmap/vmod resolution.
    Package,
}

/// Classifies a specifier. Every non-empty string maps to exactly one kind.
#[must_use]
pub fn classify(specifier: &str) -> SpecifierKind {
    if specifier.starts_with("./") || specifier.starts_with("../") {
        return SpecifierKind::Relative;
    }
    if specifier.starts_with("file:") {
        return SpecifierKind::FileUrl;
    }
    if specifier.starts_with('/') || specifier.starts_with("\\\\") {
        return SpecifierKind::Absolute;
    }
    if let Some(rest) = specifier.strip_prefix(|c: char| c.is_ascii_alphabetic()) {
        if let Some(rest) = rest.strip_prefix(':') {
            if rest.starts_with('/') || rest.starts_with('\\') {
                return SpecifierKind::Absolute;
            }
            return SpecifierKind::Relative;
        }
    }
    SpecifierKind::Package
}

/// Joins `base` and `spec`, optionally normalizing through a `realpath`-like
/// callback. Returns `None` on invalid input (mirrors the "empty handle
/// signals invalid input" convention of the C core).
#[must_use]
pub fn join(base: &str, spec: &str) -> Option<PathBuf> {
    if base.is_empty() {
        return None;
    }
    let mut joined = PathBuf::from(base);
    for component in Path::new(spec).components() {
        joined.push(component);
    }
    Some(normalize_lexically(&joined))
}

/// Lexically normalizes `.`/`..` components without touching the filesystem.
/// The platform facade's `realpath` is still consulted by callers that need
/// symlink resolution (spec §4.1: "optional normalization via platform
/// `realpath`").
#[must_use]
pub fn normalize_lexically(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !matches!(out.components().next_back(), None | Some(Component::RootDir)) {
                    out.pop();
                } else {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Returns the parent directory of `path`, after skipping any drive/UNC
/// root and stripping trailing separators twice (once for a trailing
/// separator, once for the final segment).
#[must_use]
pub fn dirname(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() {
        return None;
    }
    let p = Path::new(trimmed);
    p.parent()
        .map(|parent| parent.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .or_else(|| Some(String::from(if trimmed.starts_with('/') { "/" } else { "." })))
}

/// Returns the final path segment of `path`.
#[must_use]
pub fn basename(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches(['/', '\\']);
    Path::new(trimmed)
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
}

/// The module format implied by a path's file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatHint {
    /// `.js`
    Js,
    /// `.cjs`
    CommonJs,
    /// `.mjs`
    Module,
    /// `.snapshot`
    Snapshot,
    /// Anything else.
    None,
}

impl FormatHint {
    /// The string used on the wire (`{path, format}` resolve results).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Js => "js",
            Self::CommonJs => "commonjs",
            Self::Module => "module",
            Self::Snapshot => "snapshot",
            Self::None => "none",
        }
    }
}

/// Classifies `path` by suffix, per spec §4.1.
#[must_use]
pub fn format_by_extension(path: &str) -> FormatHint {
    if path.ends_with(".mjs") {
        FormatHint::Module
    } else if path.ends_with(".cjs") {
        FormatHint::CommonJs
    } else if path.ends_with(".js") {
        FormatHint::Js
    } else if path.ends_with(".snapshot") {
        FormatHint::Snapshot
    } else {
        FormatHint::None
    }
}

/// Encodes an absolute filesystem path as a `file:` URL via [`url::Url`],
/// per spec §4.1. Fails (returns `None`) if `abs_path` is not absolute or
/// is otherwise not representable as a `file:` URL, matching "empty handle
/// signals invalid input".
#[must_use]
pub fn to_file_url(abs_path: &str) -> Option<String> {
    if !Path::new(abs_path).is_absolute() {
        return None;
    }
    Url::from_file_path(abs_path).ok().map(|url| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("./a.js", SpecifierKind::Relative)]
    #[test_case("../a.js", SpecifierKind::Relative)]
    #[test_case("/abs/a.js", SpecifierKind::Absolute)]
    #[test_case(r"\\host\share\a.js", SpecifierKind::Absolute)]
    #[test_case("file:///a.js", SpecifierKind::FileUrl)]
    #[test_case("pkg", SpecifierKind::Package)]
    #[test_case("@scope/pkg", SpecifierKind::Package)]
    fn classify_is_total_and_disjoint(spec: &str, expected: SpecifierKind) {
        assert_eq!(classify(spec), expected);
    }

    #[test]
    fn dirname_and_basename() {
        assert_eq!(dirname("/a/b/c.js").as_deref(), Some("/a/b"));
        assert_eq!(basename("/a/b/c.js").as_deref(), Some("c.js"));
        assert_eq!(dirname("/a/b/c.js/").as_deref(), Some("/a/b"));
    }

    #[test]
    fn format_by_extension_matches_table() {
        assert_eq!(format_by_extension("a.js"), FormatHint::Js);
        assert_eq!(format_by_extension("a.cjs"), FormatHint::CommonJs);
        assert_eq!(format_by_extension("a.mjs"), FormatHint::Module);
        assert_eq!(format_by_extension("a.snapshot"), FormatHint::Snapshot);
        assert_eq!(format_by_extension("a.json"), FormatHint::None);
    }

    #[test]
    fn file_url_round_trip_posix() {
        let url = to_file_url("/m/x.mjs").unwrap();
        assert_eq!(url, "file:///m/x.mjs");
    }

    #[test]
    fn file_url_percent_encodes_spaces() {
        let url = to_file_url("/m/my file.mjs").unwrap();
        assert_eq!(url, "file:///m/my%20file.mjs");
    }

    #[test]
    fn join_normalizes_dot_dot() {
        let joined = join("/a/b", "../c").unwrap();
        assert_eq!(joined, PathBuf::from("/a/c"));
    }
}
