//! Package map (C4): resolve a bare package name plus module kind to an
//! absolute path via a JSON table rooted at a known directory.
//!
//! Grounded on `jjs-core/api/jjs-annex-pmap.c` (`jjs_annex_pmap_resolve`,
//! `find_nearest_package_path`, `get_path_type`).

use crate::error::{ModuleError, ModuleResult};
use crate::path::{self, ModuleKind};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::path::PathBuf;

/// ESM or CommonJS, used to pick the `K`-specialized half of a pmap entry.
pub use crate::path::ModuleKind as PmapModuleKind;

/// A single package-map entry. Either a bare path string, or an object that
/// may carry `main`/`path` directly and/or nested under `module`/`commonjs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Path(String),
    Object(EntryObject),
}

#[derive(Debug, Clone, Default, Deserialize)]
struct EntryObject {
    main: Option<String>,
    path: Option<String>,
    module: Option<Box<RawEntry>>,
    commonjs: Option<Box<RawEntry>>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawPmap {
    packages: FxHashMap<String, RawEntry>,
}

/// A validated package map: `{"packages": {name: entry}}` rooted at an
/// absolute directory.
#[derive(Debug, Clone)]
pub struct PackageMap {
    root: PathBuf,
    packages: FxHashMap<String, RawEntry>,
}

impl PackageMap {
    /// Parses and validates `json` as a pmap rooted at `root`. The whole map
    /// is rejected on any schema violation (spec §4.4 "Validation").
    ///
    /// # Errors
    /// Returns [`ModuleError::Type`] if `packages` is missing, not an
    /// object, or any entry fails validation.
    pub fn from_json(json: &str, root: impl Into<PathBuf>) -> ModuleResult<Self> {
        let raw: RawPmap = serde_json::from_str(json)
            .map_err(|e| ModuleError::type_error(format!("invalid pmap json: {e}")))?;

        for (name, entry) in &raw.packages {
            validate_entry(name, entry)?;
        }

        Ok(Self {
            root: root.into(),
            packages: raw.packages,
        })
    }

    /// Loads a pmap from a file; the pmap root is the file's own directory,
    /// matching `jjs_pmap`'s "root will be set to the root directory of the
    /// pmap file".
    ///
    /// # Errors
    /// Returns [`ModuleError::Common`] if the file cannot be read, or
    /// [`ModuleError::Type`] if its contents fail validation.
    pub fn from_file(path: &std::path::Path) -> ModuleResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ModuleError::common_error(format!("failed to read pmap file: {e}")))?;
        let root = path
            .parent()
            .map(std::path::Path::to_path_buf)
            .unwrap_or_default();
        Self::from_json(&text, root)
    }

    /// Resolves `specifier` for the given module kind.
    ///
    /// Algorithm (spec §4.4):
    /// 1. Exact match on `packages[specifier]`, using its `main` field.
    /// 2. Otherwise, longest-matching-prefix search, using the matched
    ///    entry's `path` field plus the remaining suffix.
    /// 3. Otherwise, fail.
    ///
    /// # Errors
    /// Returns [`ModuleError::Type`] with `"failed to resolve specifier"` if
    /// neither step produces a path.
    pub fn resolve(&self, specifier: &str, kind: ModuleKind) -> ModuleResult<PathBuf> {
        if let Some(entry) = self.packages.get(specifier) {
            if let Some(main) = get_path_field(entry, Field::Main, kind) {
                if let Some(joined) = path::join(&self.root.to_string_lossy(), &main) {
                    log::debug!("pmap: exact match {specifier} -> {}", joined.display());
                    return Ok(joined);
                }
            }
        }

        if let Some((prefix_path, rest)) = self.find_nearest_package_path(specifier, kind) {
            let mut joined = prefix_path;
            if !rest.is_empty() {
                joined.push(rest);
            }
            let joined = path::normalize_lexically(&joined);
            log::debug!("pmap: prefix match {specifier} -> {}", joined.display());
            return Ok(joined);
        }

        Err(ModuleError::type_error("failed to resolve specifier"))
    }

    /// Longest-matching-prefix search: trims one `/`-separated segment at a
    /// time from `specifier` until `packages[prefix]` exists.
    fn find_nearest_package_path(
        &self,
        specifier: &str,
        kind: ModuleKind,
    ) -> Option<(PathBuf, String)> {
        let segments: Vec<&str> = specifier.split('/').collect();
        for split in (1..segments.len()).rev() {
            let prefix = segments[..split].join("/");
            if let Some(entry) = self.packages.get(&prefix) {
                if let Some(p) = get_path_field(entry, Field::Path, kind) {
                    let rest = segments[split..].join("/");
                    if let Some(joined) = path::join(&self.root.to_string_lossy(), &p) {
                        return Some((joined, rest));
                    }
                }
            }
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Main,
    Path,
}

/// Reads `field` from `entry`, preferring the `K`-specialized sub-entry
/// (`module`/`commonjs`) and falling back to the unspecialized field on the
/// same object, per `get_path_type` in `jjs-annex-pmap.c`.
fn get_path_field(entry: &RawEntry, field: Field, kind: ModuleKind) -> Option<String> {
    match entry {
        RawEntry::Path(s) => Some(s.clone()),
        RawEntry::Object(obj) => {
            let specialized = match kind {
                ModuleKind::Module => obj.module.as_deref(),
                ModuleKind::CommonJs => obj.commonjs.as_deref(),
            };
            if let Some(specialized) = specialized {
                if let Some(found) = get_path_field(specialized, field, kind) {
                    return Some(found);
                }
            }
            match field {
                Field::Main => obj.main.clone(),
                Field::Path => obj.path.clone(),
            }
        }
    }
}

fn validate_entry(name: &str, entry: &RawEntry) -> ModuleResult<()> {
    match entry {
        RawEntry::Path(_) => Ok(()),
        RawEntry::Object(obj) => {
            let has_own = obj.main.is_some() || obj.path.is_some();
            let has_nested = obj
                .module
                .as_deref()
                .is_some_and(|e| validate_entry(name, e).is_ok())
                || obj
                    .commonjs
                    .as_deref()
                    .is_some_and(|e| validate_entry(name, e).is_ok());
            if has_own || has_nested {
                Ok(())
            } else {
                Err(ModuleError::type_error(format!(
                    "pmap entry '{name}' must be a string or contain 'main'/'path'"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_with_main() {
        let pmap = PackageMap::from_json(
            r#"{"packages": {"pkg": {"main": "sub/entry.js"}}}"#,
            "/r",
        )
        .unwrap();
        let resolved = pmap.resolve("pkg", ModuleKind::CommonJs).unwrap();
        assert_eq!(resolved, PathBuf::from("/r/sub/entry.js"));
    }

    #[test]
    fn longest_prefix_wins_over_shorter_prefix() {
        let pmap = PackageMap::from_json(
            r#"{"packages": {"a/b": {"path": "ab"}, "a": {"path": "a-root"}}}"#,
            "/r",
        )
        .unwrap();
        let resolved = pmap.resolve("a/b/c/d", ModuleKind::Module).unwrap();
        assert_eq!(resolved, PathBuf::from("/r/ab/c/d"));
    }

    #[test]
    fn kind_specialization_prefers_esm_entry() {
        let pmap = PackageMap::from_json(
            r#"{"packages": {"pkg": {"main": "index.cjs", "module": {"main": "index.mjs"}}}}"#,
            "/r",
        )
        .unwrap();
        assert_eq!(
            pmap.resolve("pkg", ModuleKind::Module).unwrap(),
            PathBuf::from("/r/index.mjs")
        );
        assert_eq!(
            pmap.resolve("pkg", ModuleKind::CommonJs).unwrap(),
            PathBuf::from("/r/index.cjs")
        );
    }

    #[test]
    fn unresolvable_specifier_is_type_error() {
        let pmap = PackageMap::from_json(r#"{"packages": {}}"#, "/r").unwrap();
        let err = pmap.resolve("nope", ModuleKind::CommonJs).unwrap_err();
        assert_eq!(err.label(), crate::error::ModuleErrorKindLabel::Type);
    }

    #[test]
    fn invalid_entry_rejects_whole_map() {
        let err = PackageMap::from_json(r#"{"packages": {"bad": {}}}"#, "/r").unwrap_err();
        assert_eq!(err.label(), crate::error::ModuleErrorKindLabel::Type);
    }
}
