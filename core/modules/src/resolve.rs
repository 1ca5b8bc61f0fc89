//! Resolver / loader chain (C6): host-overridable resolve/load callbacks,
//! with filesystem-backed defaults. Grounded on
//! `jjs-core/api/jjs-annex-module-util.c` and `jjs-core/api/jjs-platform.c`.

use crate::error::{ModuleError, ModuleResult};
use crate::path::{self, FormatHint, ModuleKind, SpecifierKind};
use crate::platform::{FileContents, PlatformFacade, ReadEncoding};
use crate::pmap::PackageMap;
use std::path::PathBuf;
use std::rc::Rc;

/// `{path, format}`, per spec §3 "Resolve result".
#[derive(Debug, Clone)]
pub struct ResolveResult {
    /// The absolute path (or vmod specifier) the request resolved to.
    pub path: String,
    /// One of `"js" | "commonjs" | "module" | "snapshot" | "none"`.
    pub format: FormatHint,
}

/// `{source, format}`, per spec §3 "Load result".
#[derive(Debug, Clone)]
pub enum LoadResult {
    /// A UTF-8 source string, for text formats.
    Source(String),
    /// Raw bytes, for the `"snapshot"` format.
    Snapshot(Vec<u8>),
}

/// Extra context passed to `resolve`/`load`: the referring module's
/// directory and the module kind being requested.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The directory of the module that issued the request.
    pub referrer_path: PathBuf,
    /// Whether this is an ESM or CommonJS request.
    pub kind: ModuleKind,
}

/// Host-overridable resolve/load hooks. A `ModuleHost` implementation is
/// installed once per [`crate::context::ModuleContext`]; `resolve`/`load`
/// failures propagate as exceptions to the caller of `require`/`import`.
pub trait ModuleHost {
    /// Resolves `specifier` to an absolute path (or vmod name) plus format.
    ///
    /// # Errors
    /// Any resolution failure (bad specifier, pmap miss, missing platform
    /// capability).
    fn resolve(&self, specifier: &str, request: &RequestContext) -> ModuleResult<ResolveResult>;

    /// Loads the bytes/text named by a previous `resolve` call.
    ///
    /// # Errors
    /// I/O failure, or an unsupported format field.
    fn load(&self, path: &str, request: &RequestContext) -> ModuleResult<LoadResult>;
}

/// The default resolver/loader: classifies the specifier, joins/normalizes
/// relative and absolute paths through the platform facade, and otherwise
/// delegates to the package map.
///
/// Owns its collaborators via `Rc` (rather than borrowing them) so that a
/// `DefaultModuleHost` can itself be shared (`Rc<dyn ModuleHost>`) into the
/// native `require`/dynamic-import closures installed into a realm — those
/// closures must be `'static` since they outlive the stack frame that
/// installs them.
pub struct DefaultModuleHost {
    /// The platform facade used for `realpath`/file reads.
    pub platform: Rc<dyn PlatformFacade>,
    /// The package map consulted for bare/package specifiers, if any.
    pub pmap: Option<Rc<PackageMap>>,
}

impl ModuleHost for DefaultModuleHost {
    fn resolve(&self, specifier: &str, request: &RequestContext) -> ModuleResult<ResolveResult> {
        let referrer = request.referrer_path.to_string_lossy();

        let path = match path::classify(specifier) {
            SpecifierKind::Relative => {
                let joined = path::join(&referrer, specifier).ok_or_else(|| {
                    ModuleError::common_error(format!(
                        "could not join referrer '{referrer}' with specifier '{specifier}'"
                    ))
                })?;
                self.platform
                    .realpath(&joined)
                    .unwrap_or(joined)
            }
            SpecifierKind::Absolute => self
                .platform
                .realpath(std::path::Path::new(specifier))
                .unwrap_or_else(|_| PathBuf::from(specifier)),
            SpecifierKind::FileUrl => {
                return Err(ModuleError::common_error(
                    "default resolver does not handle file: URLs directly; register a pmap entry or a custom ModuleHost",
                ));
            }
            SpecifierKind::Package => {
                let pmap = self.pmap.as_ref().ok_or_else(|| {
                    ModuleError::common_error(format!(
                        "'{specifier}' is a package specifier but no pmap has been loaded"
                    ))
                })?;
                pmap.resolve(specifier, request.kind)?
            }
        };

        let path_str = path.to_string_lossy().into_owned();
        let format = path::format_by_extension(&path_str);
        log::trace!("resolve('{specifier}') -> {path_str} ({})", format.as_str());
        Ok(ResolveResult {
            path: path_str,
            format,
        })
    }

    fn load(&self, path: &str, request: &RequestContext) -> ModuleResult<LoadResult> {
        let _ = request;
        let format = path::format_by_extension(path);
        match format {
            FormatHint::Snapshot => {
                match self
                    .platform
                    .read_file(std::path::Path::new(path), ReadEncoding::None)?
                {
                    FileContents::Bytes(bytes) => Ok(LoadResult::Snapshot(bytes)),
                    FileContents::Text(text) => Ok(LoadResult::Snapshot(text.into_bytes())),
                }
            }
            FormatHint::Js | FormatHint::CommonJs | FormatHint::Module => {
                match self
                    .platform
                    .read_file(std::path::Path::new(path), ReadEncoding::Utf8)?
                {
                    FileContents::Text(text) => Ok(LoadResult::Source(text)),
                    FileContents::Bytes(bytes) => Ok(LoadResult::Source(
                        String::from_utf8(bytes)
                            .map_err(|e| ModuleError::common_error(e.to_string()))?,
                    )),
                }
            }
            FormatHint::None => Err(ModuleError::type_error("unsupported format field")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::StdPlatform;

    #[test]
    fn resolve_relative_specifier_joins_referrer() {
        let host = DefaultModuleHost {
            platform: Rc::new(StdPlatform::new()),
            pmap: None,
        };
        let req = RequestContext {
            referrer_path: PathBuf::from("/a/b"),
            kind: ModuleKind::CommonJs,
        };
        let result = host.resolve("./c.cjs", &req).unwrap();
        assert_eq!(result.path, "/a/b/c.cjs");
        assert_eq!(result.format, FormatHint::CommonJs);
    }

    #[test]
    fn resolve_package_without_pmap_fails() {
        let host = DefaultModuleHost {
            platform: Rc::new(StdPlatform::new()),
            pmap: None,
        };
        let req = RequestContext {
            referrer_path: PathBuf::from("/a/b"),
            kind: ModuleKind::CommonJs,
        };
        assert!(host.resolve("pkg", &req).is_err());
    }

    #[test]
    fn load_unrecognized_format_is_type_error() {
        let host = DefaultModuleHost {
            platform: Rc::new(StdPlatform::new()),
            pmap: None,
        };
        let req = RequestContext {
            referrer_path: PathBuf::from("/a/b"),
            kind: ModuleKind::CommonJs,
        };
        let err = host.load("/a/b/c.json", &req).unwrap_err();
        assert_eq!(err.label(), crate::error::ModuleErrorKindLabel::Type);
    }
}
