//! ES module loader (C8): parse, link, evaluate, and expose the namespace
//! of ECMAScript modules, with CJS and vmod interop via synthetic modules.
//! Grounded on `jjs-core/api/jjs-annex-esm.c` and `core/engine/tests/module.rs`
//! / `core/interop/tests/module.rs` for the `boa_engine::Module` /
//! `ModuleLoader` shapes this builds on.

use crate::commonjs::CommonJsState;
use crate::error::{ModuleError, ModuleResult};
use crate::path::{self, ModuleKind};
use crate::resolve::{LoadResult, ModuleHost, RequestContext};
use crate::vmod::VirtualModuleRegistry;
use boa_engine::module::{Module, ModuleLoader, Referrer};
use boa_engine::{js_string, Context, JsError, JsResult, JsString, JsValue, Source};
use boa_gc::{Finalize, Trace};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Host-defined data attached to every ES module this loader creates,
/// filling the spec's "Module-local properties attached by the host:
/// `filename`, `dirname`, `url`, `extension`" (§3 Data model). Stored via
/// `Module::host_defined()`'s type-keyed storage, the same mechanism
/// `boa_engine` itself uses to stash `import.meta`-adjacent state per
/// module instead of widening the `Module` struct itself.
#[derive(Debug, Trace, Finalize)]
pub struct ModuleMeta {
    /// The module's absolute path, or its vmod specifier.
    #[unsafe_ignore_trace]
    pub path: String,
    /// `dirname(path)`, used as the referrer for relative imports.
    #[unsafe_ignore_trace]
    pub dirname: String,
    /// The `file:` URL form of `path` (vmod specifiers are left as-is).
    #[unsafe_ignore_trace]
    pub url: String,
    /// An optional host-supplied `import.meta.extension` payload.
    pub extension: Option<JsValue>,
}

/// The realm-level `esm_cache`: absolute path (or vmod specifier) -> module.
#[derive(Debug, Default)]
pub struct EsmCache {
    modules: RefCell<FxHashMap<String, Module>>,
}

impl EsmCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached module for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Module> {
        self.modules.borrow().get(key).cloned()
    }

    /// Installs `module` under `key`. Used by the loader itself for paths
    /// resolved through the resolver/loader chain, by
    /// `ModuleContext::esm_source` for in-memory sources whose `cache`
    /// option is set (spec §6.2), and by `ModuleContext::synthetic_module`
    /// for host-constructed synthetic modules (spec §6.1).
    pub fn insert(&self, key: String, module: Module) {
        self.modules.borrow_mut().insert(key, module);
    }
}

/// Drives `esm_read`, CJS/vmod synthetic-module wrapping, and is installed
/// into a `boa_engine::Context` as its [`ModuleLoader`].
pub struct EsmLoader {
    host: Rc<dyn ModuleHost>,
    cache: Rc<EsmCache>,
    vmod: Rc<VirtualModuleRegistry>,
    commonjs: Rc<CommonJsState>,
}

impl EsmLoader {
    /// The host this loader resolves/loads through; exposed so
    /// `import.meta.resolve` can reuse the resolve step without going
    /// through `esm_read`'s cache/parse machinery.
    #[must_use]
    pub fn host(&self) -> &Rc<dyn ModuleHost> {
        &self.host
    }

    /// Creates a loader sharing caches/registries with the rest of the
    /// realm (CommonJS interop needs the same `CommonJsState` `require`
    /// uses, so cache identity holds across `require`/`import` of the same
    /// CJS file — spec §8 property 2).
    #[must_use]
    pub fn new(
        host: Rc<dyn ModuleHost>,
        cache: Rc<EsmCache>,
        vmod: Rc<VirtualModuleRegistry>,
        commonjs: Rc<CommonJsState>,
    ) -> Self {
        Self {
            host,
            cache,
            vmod,
            commonjs,
        }
    }

    /// `esm_read(specifier, referrer_path)`: resolve, cache-check, load,
    /// parse/wrap, and install in `esm_cache`. Does not link or evaluate.
    ///
    /// # Errors
    /// Any resolve/load/parse failure, or an unsupported format.
    pub fn esm_read(
        &self,
        specifier: &str,
        referrer_path: &Path,
        context: &mut Context,
    ) -> ModuleResult<Module> {
        if self.vmod.exists(specifier) {
            if let Some(cached) = self.cache.get(specifier) {
                return Ok(cached);
            }
            return self.synthesize_vmod_module(specifier, context);
        }

        // A module registered directly under this specifier (e.g. by
        // `ModuleContext::synthetic_module`) short-circuits resolution
        // entirely, the same way a vmod specifier does above.
        if let Some(cached) = self.cache.get(specifier) {
            return Ok(cached);
        }

        let request = RequestContext {
            referrer_path: referrer_path.to_path_buf(),
            kind: ModuleKind::Module,
        };
        let resolved = self.host.resolve(specifier, &request)?;

        if let Some(cached) = self.cache.get(&resolved.path) {
            log::trace!("esm_read: cache hit for {}", resolved.path);
            return Ok(cached);
        }

        let load_result = self.host.load(&resolved.path, &request)?;
        let dirname = path::dirname(&resolved.path).unwrap_or_else(|| ".".to_owned());
        let url = path::to_file_url(&resolved.path).unwrap_or_else(|| resolved.path.clone());

        let module = match (resolved.format, load_result) {
            (path::FormatHint::Js | path::FormatHint::Module, LoadResult::Source(text)) => {
                let source = Source::from_bytes(text.as_bytes());
                Module::parse(source, None, context)
                    .map_err(|e: JsError| ModuleError::Syntax(e.to_string()))?
            }
            (path::FormatHint::CommonJs, LoadResult::Source(_)) => {
                self.synthesize_cjs_interop_module(&resolved.path, &dirname, context)?
            }
            _ => return Err(ModuleError::type_error("Invalid format")),
        };

        attach_meta(
            &module,
            ModuleMeta {
                path: resolved.path.clone(),
                dirname,
                url,
                extension: None,
            },
        );

        self.cache.insert(resolved.path.clone(), module.clone());
        log::debug!("esm_read: loaded {}", resolved.path);
        Ok(module)
    }

    /// A CJS file imported as an ES module gets a synthetic module with a
    /// single `default` export, whose evaluation calls `require` on the
    /// same path and binds the result (spec §4.8 step 5, `"commonjs"` arm).
    /// If the CJS `exports` object has its own `default` key, that value is
    /// preferred over the whole `exports` object, matching the preference
    /// `synthesize_vmod_module` applies to vmod exports.
    fn synthesize_cjs_interop_module(
        &self,
        path: &str,
        dirname: &str,
        context: &mut Context,
    ) -> ModuleResult<Module> {
        let commonjs = Rc::clone(&self.commonjs);
        let path_owned = path.to_owned();
        let dirname_owned = dirname.to_owned();

        let module = Module::synthetic(
            &[js_string!("default")],
            boa_engine::module::SyntheticModuleInitializer::from_closure(
                move |module, context| -> JsResult<()> {
                    let exports = commonjs
                        .require(&path_owned, Path::new(&dirname_owned), context)
                        .map_err(|e| e.into_js_error(context))?;

                    let default_export = exports
                        .as_object()
                        .map(|o| o.get(js_string!("default"), context))
                        .transpose()?
                        .filter(|v| !v.is_undefined())
                        .unwrap_or(exports);

                    module.set_export(&js_string!("default"), default_export)?;
                    Ok(())
                },
            ),
            None,
            context,
        );
        Ok(module)
    }

    /// On first `esm_read` of a vmod specifier: resolve its exports,
    /// enumerate own keys (synthesizing `default` if absent), and build a
    /// synthetic module mirroring them. Spec §4.10.
    fn synthesize_vmod_module(
        &self,
        specifier: &str,
        context: &mut Context,
    ) -> ModuleResult<Module> {
        let exports = self.vmod.resolve(specifier, context)?;

        let mut names: Vec<JsString> = Vec::new();
        let mut has_default = false;

        if let Some(obj) = exports.as_object() {
            for key in obj.own_property_keys(context).map_err(|e| {
                ModuleError::common_error(e.to_string())
            })? {
                if let boa_engine::property::PropertyKey::String(s) = key {
                    let name = s.to_std_string_escaped();
                    if !is_valid_export_name(&name) {
                        return Err(ModuleError::type_error(format!(
                            "vmod '{specifier}' export name '{name}' is not a valid identifier"
                        )));
                    }
                    if s == js_string!("default") {
                        has_default = true;
                    }
                    names.push(s);
                }
            }
        }
        if !has_default {
            names.push(js_string!("default"));
        }

        let exports_for_init = exports.clone();
        let names_for_init = names.clone();
        let module = Module::synthetic(
            &names,
            boa_engine::module::SyntheticModuleInitializer::from_closure(
                move |module, context| -> JsResult<()> {
                    for name in &names_for_init {
                        let value = if *name == js_string!("default") {
                            exports_for_init
                                .as_object()
                                .map(|o| {
                                    o.get(js_string!("default"), context)
                                        .unwrap_or(JsValue::undefined())
                                })
                                .filter(|v| !v.is_undefined())
                                .unwrap_or_else(|| exports_for_init.clone())
                        } else {
                            exports_for_init
                                .as_object()
                                .map(|o| o.get(name.clone(), context))
                                .transpose()?
                                .unwrap_or(JsValue::undefined())
                        };
                        module.set_export(name, value)?;
                    }
                    Ok(())
                },
            ),
            None,
            context,
        );

        attach_meta(
            &module,
            ModuleMeta {
                path: specifier.to_owned(),
                dirname: String::new(),
                url: specifier.to_owned(),
                extension: None,
            },
        );
        self.cache.insert(specifier.to_owned(), module.clone());
        Ok(module)
    }
}

/// Reads back a previously-attached [`ModuleMeta`], if any.
#[must_use]
pub fn module_meta(module: &Module) -> Option<Rc<ModuleMeta>> {
    module.host_defined().get::<Rc<ModuleMeta>>().cloned()
}

pub(crate) fn attach_meta(module: &Module, meta: ModuleMeta) {
    module.host_defined().insert(Rc::new(meta));
}

/// Whether `name` is valid ECMAScript `IdentifierName` syntax: a `$`, `_`,
/// or alphabetic character, followed by any number of `$`, `_`, or
/// alphanumeric characters. Synthetic-module export names must satisfy this
/// at creation (spec §3 invariant 7, Testable Property 6); this is a
/// deliberately simplified approximation of the full Unicode `ID_Start`/
/// `ID_Continue` grammar, sufficient to reject the non-identifier strings a
/// host's vmod config can otherwise hand to `Module::synthetic`.
#[must_use]
pub fn is_valid_export_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '$' || c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '$' || c == '_' || c.is_alphanumeric())
}

impl ModuleLoader for EsmLoader {
    fn load_imported_module(
        &self,
        referrer: Referrer,
        specifier: JsString,
        finish_load: Box<dyn FnOnce(JsResult<Module>, &mut Context)>,
        context: &mut Context,
    ) {
        let referrer_dir = referrer_dir(&referrer);
        let specifier = specifier.to_std_string_escaped();
        let result = self
            .esm_read(&specifier, &referrer_dir, context)
            .map_err(|e| e.into_js_error(context));
        finish_load(result, context);
    }

    /// `HostGetImportMetaProperties`/`HostFinalizeImportMeta`: fills in
    /// `url`/`filename`/`dirname`/`resolve` for a module created by this
    /// loader. A module with no attached [`ModuleMeta`] (none of this
    /// loader's own) is left untouched, matching the default empty-list
    /// behaviour for import.meta properties.
    fn init_import_meta(&self, import_meta: &boa_engine::JsObject, module: &Module, context: &mut Context) {
        if let Err(e) = crate::dynamic_import::populate_import_meta(
            module,
            import_meta,
            Rc::clone(&self.host),
            Rc::clone(&self.vmod),
            context,
        ) {
            log::warn!("failed to populate import.meta: {e}");
        }
    }
}

/// Derives the directory to resolve `specifier` against from the
/// referring module, falling back to `.` for a top-level/realm referrer
/// (the ES loader's own `esm_read` callers pass an explicit path in that
/// case; this fallback only matters for the `ModuleLoader` entry point).
fn referrer_dir(referrer: &Referrer) -> PathBuf {
    match referrer {
        Referrer::Module(m) => module_meta(m)
            .map(|meta| PathBuf::from(meta.dirname.clone()))
            .unwrap_or_else(|| PathBuf::from(".")),
        Referrer::Realm(_) => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::ResolveResult;
    use std::collections::HashMap;

    struct MemoryHost {
        files: RefCell<HashMap<String, String>>,
    }

    impl ModuleHost for MemoryHost {
        fn resolve(&self, specifier: &str, request: &RequestContext) -> ModuleResult<ResolveResult> {
            let joined = path::join(&request.referrer_path.to_string_lossy(), specifier)
                .ok_or_else(|| ModuleError::common_error("join failed"))?;
            let path_str = joined.to_string_lossy().into_owned();
            Ok(ResolveResult {
                format: path::format_by_extension(&path_str),
                path: path_str,
            })
        }

        fn load(&self, path: &str, _request: &RequestContext) -> ModuleResult<LoadResult> {
            self.files
                .borrow()
                .get(path)
                .cloned()
                .map(LoadResult::Source)
                .ok_or_else(|| ModuleError::common_error(format!("no such file: {path}")))
        }
    }

    #[test]
    fn s3_default_import_from_cjs() {
        let mut context = Context::default();
        let mut files = HashMap::new();
        files.insert("/c.cjs".to_owned(), "module.exports = 42;".to_owned());
        let host: Rc<dyn ModuleHost> = Rc::new(MemoryHost {
            files: RefCell::new(files),
        });
        let commonjs = CommonJsState::new(Rc::clone(&host));
        let cache = Rc::new(EsmCache::new());
        let vmod = Rc::new(VirtualModuleRegistry::new());
        let loader = EsmLoader::new(Rc::clone(&host), cache, vmod, commonjs);

        let module = loader
            .esm_read("./c.cjs", Path::new("/"), &mut context)
            .unwrap();
        assert_eq!(module_meta(&module).unwrap().path, "/c.cjs");
    }
}
