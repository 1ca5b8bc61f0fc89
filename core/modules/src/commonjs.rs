//! CommonJS loader (C7): `require(specifier)`, cached by absolute path,
//! with cycle detection via the `loaded` flag. Grounded on
//! `jjs-core/api/jjs-annex-commonjs.c`.

use crate::error::{ModuleError, ModuleResult};
use crate::path::{self, ModuleKind};
use crate::resolve::{LoadResult, ModuleHost, RequestContext};
use boa_engine::object::{FunctionObjectBuilder, ObjectInitializer};
use boa_engine::property::Attribute;
use boa_engine::{js_string, Context, JsError, JsObject, JsResult, JsValue, NativeFunction, Source};
use boa_engine::builtins::JsArgs;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// `require.cache` / the realm's `commonjs_cache`: absolute path -> module
/// object. Entries are installed before evaluation begins and removed iff
/// evaluation throws (spec §3 invariant 4, Lifecycles). Kept in insertion
/// order (`IndexMap`, the same ordered-map choice `boa_engine`'s own
/// `PropertyMap` makes) so the JS-visible `require.cache` enumerates
/// deterministically instead of in hash order.
#[derive(Debug, Default)]
pub struct CommonJsCache {
    modules: RefCell<IndexMap<String, JsObject>>,
}

impl CommonJsCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached module object for `path`, if any.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<JsObject> {
        self.modules.borrow().get(path).cloned()
    }

    fn insert(&self, path: String, module: JsObject) {
        self.modules.borrow_mut().insert(path, module);
    }

    fn remove(&self, path: &str) {
        self.modules.borrow_mut().shift_remove(path);
    }

    /// A snapshot of every cached `(path, module)` pair, the backing data
    /// for a JS-visible `require.cache` object.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, JsObject)> {
        self.modules
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// The shared, owned state behind every `require` closure installed into a
/// realm. Held as `Rc<CommonJsState>` so that nested `require` calls made
/// from inside a module body can recurse back into the same loader without
/// borrowing across a native-function boundary.
pub struct CommonJsState {
    host: Rc<dyn ModuleHost>,
    cache: CommonJsCache,
    /// The JS-visible mirror of `cache`, lazily created by
    /// [`CommonJsState::cache_object`] and kept in sync by
    /// [`CommonJsState::require_resolved`], backing the JS-visible
    /// `require.cache` (spec §4.7 "`require.cache` is the shared
    /// `commonjs_cache`").
    exposed_cache: RefCell<Option<JsObject>>,
}

impl CommonJsState {
    /// Creates fresh state backed by `host`.
    #[must_use]
    pub fn new(host: Rc<dyn ModuleHost>) -> Rc<Self> {
        Rc::new(Self {
            host,
            cache: CommonJsCache::new(),
            exposed_cache: RefCell::new(None),
        })
    }

    /// The realm's `require.cache`.
    #[must_use]
    pub fn cache(&self) -> &CommonJsCache {
        &self.cache
    }

    /// The JS-visible object backing `require.cache`: one property per
    /// cached absolute path, pointing at the same module object `require`
    /// itself returns. Created on first call and then kept up to date as
    /// modules are cached/evicted, so existing JS references to this object
    /// keep observing new entries.
    fn cache_object(&self, context: &mut Context) -> JsObject {
        if let Some(obj) = self.exposed_cache.borrow().as_ref() {
            return obj.clone();
        }
        let obj = JsObject::with_null_proto();
        for (path, module) in self.cache.entries() {
            let _ = obj.set(js_string!(path), module, false, context);
        }
        *self.exposed_cache.borrow_mut() = Some(obj.clone());
        obj
    }

    /// `require(specifier)` from a module whose directory is `referrer_dir`.
    ///
    /// Returns the required module's `exports` value (re-read after
    /// evaluation, since the module body may have reassigned `module.exports`).
    ///
    /// # Errors
    /// - [`ModuleError::Common`] with `"Circular dependency"` if `specifier`
    ///   names a module still on the call stack (spec §3 invariant 4).
    /// - Any resolve/load failure, or the module body's own thrown error.
    pub fn require(
        &self,
        specifier: &str,
        referrer_dir: &Path,
        context: &mut Context,
    ) -> ModuleResult<JsValue> {
        let request = RequestContext {
            referrer_path: referrer_dir.to_path_buf(),
            kind: ModuleKind::CommonJs,
        };
        let resolved = self.host.resolve(specifier, &request)?;
        self.require_resolved(&resolved.path, resolved.format, context)
    }

    /// `require.resolve(specifier)`: returns the absolute path without
    /// loading or evaluating anything.
    ///
    /// # Errors
    /// Any resolve failure.
    pub fn resolve_only(&self, specifier: &str, referrer_dir: &Path) -> ModuleResult<String> {
        let request = RequestContext {
            referrer_path: referrer_dir.to_path_buf(),
            kind: ModuleKind::CommonJs,
        };
        Ok(self.host.resolve(specifier, &request)?.path)
    }

    fn require_resolved(
        &self,
        path: &str,
        format: path::FormatHint,
        context: &mut Context,
    ) -> ModuleResult<JsValue> {
        if let Some(cached) = self.cache.get(path) {
            let loaded = cached
                .get(js_string!("loaded"), context)
                .map_err(|e| ModuleError::common_error(e.to_string()))?;
            if !loaded.to_boolean() {
                return Err(ModuleError::common_error("Circular dependency"));
            }
            log::trace!("require: cache hit for {path}");
            return cached
                .get(js_string!("exports"), context)
                .map_err(|e| ModuleError::common_error(e.to_string()));
        }

        let dirname = path::dirname(path).unwrap_or_else(|| ".".to_owned());
        let module_obj = new_module_object(path, &dirname, context)?;
        self.cache.insert(path.to_owned(), module_obj.clone());
        if let Some(exposed) = self.exposed_cache.borrow().as_ref() {
            let _ = exposed.set(js_string!(path), module_obj.clone(), false, context);
        }
        log::debug!("require: loading {path}");

        let request = RequestContext {
            referrer_path: PathBuf::from(&dirname),
            kind: ModuleKind::CommonJs,
        };
        let load_result = match self.host.load(path, &request) {
            Ok(r) => r,
            Err(e) => {
                self.cache.remove(path);
                self.evict_exposed_cache(path, context);
                return Err(e);
            }
        };

        if let Err(e) = self.evaluate(path, &dirname, format, load_result, &module_obj, context) {
            self.cache.remove(path);
            self.evict_exposed_cache(path, context);
            return Err(e);
        }

        module_obj
            .set(js_string!("loaded"), true, false, context)
            .map_err(|e| ModuleError::common_error(e.to_string()))?;

        module_obj
            .get(js_string!("exports"), context)
            .map_err(|e| ModuleError::common_error(e.to_string()))
    }

    fn evict_exposed_cache(&self, path: &str, context: &mut Context) {
        if let Some(exposed) = self.exposed_cache.borrow().as_ref() {
            let _ = exposed.delete_property_or_throw(js_string!(path), context);
        }
    }

    fn evaluate(
        self: &Rc<Self>,
        path: &str,
        dirname: &str,
        format: path::FormatHint,
        load_result: LoadResult,
        module_obj: &JsObject,
        context: &mut Context,
    ) -> ModuleResult<()> {
        let source_text = match (format, load_result) {
            (path::FormatHint::Js | path::FormatHint::CommonJs, LoadResult::Source(text)) => text,
            (path::FormatHint::Snapshot, LoadResult::Snapshot(_)) => {
                return Err(ModuleError::type_error(
                    "snapshot execution is not implemented by this loader",
                ));
            }
            _ => return Err(ModuleError::type_error("Invalid format")),
        };

        let wrapped = wrap_commonjs_source(&source_text);
        let wrapper_fn = context
            .eval(Source::from_bytes(wrapped.as_bytes()))
            .map_err(to_module_error)?;
        let wrapper_fn = wrapper_fn
            .as_object()
            .cloned()
            .ok_or_else(|| ModuleError::type_error("CommonJS wrapper did not evaluate to a function"))?;

        let exports = module_obj
            .get(js_string!("exports"), context)
            .map_err(|e| ModuleError::common_error(e.to_string()))?;
        let require_fn = make_require_function(self, dirname, context);

        let args = [
            JsValue::from(module_obj.clone()),
            exports,
            JsValue::from(require_fn),
            JsValue::from(js_string!(path)),
            JsValue::from(js_string!(dirname)),
        ];

        wrapper_fn
            .call(&JsValue::undefined(), &args, context)
            .map_err(to_module_error)?;
        Ok(())
    }
}

/// Builds the native `require` function passed into a CommonJS module body,
/// bound to `dirname`. Recurses back into `state.require` for nested
/// `require` calls, which is how cycle detection (spec §3 invariant 4) and
/// cache identity (spec §8 property 2) fall out of ordinary recursion
/// instead of an explicit call-stack data structure.
fn make_require_function(
    state: &Rc<CommonJsState>,
    dirname: &str,
    context: &mut Context,
) -> JsObject {
    let state = Rc::clone(state);
    let dirname = dirname.to_owned();
    let require_fn = NativeFunction::from_closure(move |_this, args, ctx| {
        let specifier = args
            .get_or_undefined(0)
            .to_string(ctx)?
            .to_std_string_escaped();
        state
            .require(&specifier, Path::new(&dirname), ctx)
            .map_err(|e| e.into_js_error(ctx))
    });

    ObjectInitializer::with_native_function(context, require_fn, 1).build()
}

/// Installs the JS-visible `require(specifier)` global, bound to `cwd`
/// (spec §6.3 "Global `require(spec)` bound to cwd in each realm"), along
/// with `require.resolve` and `require.cache`.
///
/// # Errors
/// Propagates any failure defining the global property or the function's
/// own `resolve`/`cache` properties.
pub fn install_require_global(
    state: &Rc<CommonJsState>,
    cwd: PathBuf,
    context: &mut Context,
) -> JsResult<()> {
    let cache_obj = state.cache_object(context);

    let require_state = Rc::clone(state);
    let require_dir = cwd.clone();
    let require_fn = FunctionObjectBuilder::new(
        context.realm(),
        NativeFunction::from_closure(move |_this, args, ctx| {
            let specifier = args
                .get_or_undefined(0)
                .to_string(ctx)?
                .to_std_string_escaped();
            require_state
                .require(&specifier, &require_dir, ctx)
                .map_err(|e| e.into_js_error(ctx))
        }),
    )
    .name(js_string!("require"))
    .length(1)
    .build();

    let resolve_state = Rc::clone(state);
    let resolve_dir = cwd;
    let resolve_fn = FunctionObjectBuilder::new(
        context.realm(),
        NativeFunction::from_closure(move |_this, args, ctx| {
            let specifier = args
                .get_or_undefined(0)
                .to_string(ctx)?
                .to_std_string_escaped();
            resolve_state
                .resolve_only(&specifier, &resolve_dir)
                .map(|p| JsValue::from(js_string!(p)))
                .map_err(|e| e.into_js_error(ctx))
        }),
    )
    .name(js_string!("resolve"))
    .length(1)
    .build();

    require_fn.set(js_string!("resolve"), resolve_fn, false, context)?;
    require_fn.set(js_string!("cache"), cache_obj, false, context)?;

    context.register_global_property(js_string!("require"), require_fn, Attribute::all())?;
    Ok(())
}

/// Wraps CommonJS source text as `function (module, exports, require,
/// __filename, __dirname) { ... }`, spec §4.7 step 5.
fn wrap_commonjs_source(source: &str) -> String {
    format!("(function (module, exports, require, __filename, __dirname) {{\n{source}\n}})")
}

fn to_module_error(err: JsError) -> ModuleError {
    ModuleError::common_error(err.to_string())
}

/// Creates a fresh `{id, filename, path, exports, loaded}` module object,
/// made non-extensible, per spec §3 "CommonJS module object".
fn new_module_object(path: &str, dirname: &str, context: &mut Context) -> ModuleResult<JsObject> {
    let exports = JsObject::with_null_proto();
    let module = ObjectInitializer::new(context)
        .property(js_string!("id"), js_string!(path), Attribute::all())
        .property(js_string!("filename"), js_string!(path), Attribute::all())
        .property(js_string!("path"), js_string!(dirname), Attribute::all())
        .property(js_string!("exports"), exports, Attribute::all())
        .property(js_string!("loaded"), false, Attribute::all())
        .build();
    module
        .set_extensible(false)
        .map_err(|e| ModuleError::common_error(e.to_string()))?;
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use std::cell::RefCell as StdRefCell;
    use std::collections::HashMap;

    struct MemoryHost {
        files: StdRefCell<HashMap<String, String>>,
    }

    impl ModuleHost for MemoryHost {
        fn resolve(
            &self,
            specifier: &str,
            request: &RequestContext,
        ) -> ModuleResult<crate::resolve::ResolveResult> {
            let joined =
                path::join(&request.referrer_path.to_string_lossy(), specifier).unwrap();
            let path_str = joined.to_string_lossy().into_owned();
            Ok(crate::resolve::ResolveResult {
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

    fn state_with_files(files: HashMap<String, String>) -> Rc<CommonJsState> {
        let host: Rc<dyn ModuleHost> = Rc::new(MemoryHost {
            files: StdRefCell::new(files),
        });
        CommonJsState::new(host)
    }

    #[test]
    fn s1_basic_arithmetic() {
        let mut context = Context::default();
        let mut files = HashMap::new();
        files.insert("/a.cjs".to_owned(), "module.exports = 1 + 2;".to_owned());
        let state = state_with_files(files);

        let exports = state
            .require("./a.cjs", Path::new("/"), &mut context)
            .unwrap();
        assert_eq!(exports.to_i32(&mut context).unwrap(), 3);
    }

    #[test]
    fn s2_cycle_sees_partial_exports() {
        let mut context = Context::default();
        let mut files = HashMap::new();
        files.insert(
            "/a.cjs".to_owned(),
            indoc! {"
                exports.x = 1;
                require('./b.cjs');
                exports.y = 2;
            "}
            .to_owned(),
        );
        files.insert(
            "/b.cjs".to_owned(),
            indoc! {"
                const a = require('./a.cjs');
                module.exports = {seen: a.x, late: a.y};
            "}
            .to_owned(),
        );
        let state = state_with_files(files);

        state
            .require("./a.cjs", Path::new("/"), &mut context)
            .unwrap();

        let b_module = state.cache().get("/b.cjs").unwrap();
        let b_exports = b_module.get(js_string!("exports"), &mut context).unwrap();
        let b_exports = b_exports.as_object().unwrap();
        let seen = b_exports.get(js_string!("seen"), &mut context).unwrap();
        let late = b_exports.get(js_string!("late"), &mut context).unwrap();
        assert_eq!(seen.to_i32(&mut context).unwrap(), 1);
        assert!(late.is_undefined());

        let a_module = state.cache().get("/a.cjs").unwrap();
        let a_exports = a_module.get(js_string!("exports"), &mut context).unwrap();
        let a_exports = a_exports.as_object().unwrap();
        let y = a_exports.get(js_string!("y"), &mut context).unwrap();
        assert_eq!(y.to_i32(&mut context).unwrap(), 2);
    }

    #[test]
    fn s2_second_require_of_a_from_elsewhere_sees_full_exports() {
        let mut context = Context::default();
        let mut files = HashMap::new();
        files.insert(
            "/a.cjs".to_owned(),
            "exports.x = 1; require('./b.cjs'); exports.y = 2;".to_owned(),
        );
        files.insert(
            "/b.cjs".to_owned(),
            "module.exports = {};".to_owned(),
        );
        let state = state_with_files(files);

        let first = state
            .require("./a.cjs", Path::new("/"), &mut context)
            .unwrap();
        let second = state
            .require("./a.cjs", Path::new("/"), &mut context)
            .unwrap();
        assert!(JsValue::strict_equals(&first, &second));
    }

    #[test]
    fn unsupported_format_is_rejected() {
        let mut context = Context::default();
        let mut files = HashMap::new();
        files.insert("/a.json".to_owned(), r#"{"x": 1}"#.to_owned());
        let state = state_with_files(files);

        let err = state
            .require("./a.json", Path::new("/"), &mut context)
            .unwrap_err();
        assert_eq!(err.label(), crate::error::ModuleErrorKindLabel::Type);
    }

    #[test]
    fn js_visible_require_resolves_cache_and_resolve() {
        let mut context = Context::default();
        let mut files = HashMap::new();
        files.insert("/a.cjs".to_owned(), "module.exports = 1 + 2;".to_owned());
        let state = state_with_files(files);

        install_require_global(&state, PathBuf::from("/"), &mut context).unwrap();

        let value = context
            .eval(Source::from_bytes(b"require('./a.cjs')"))
            .unwrap();
        assert_eq!(value.to_i32(&mut context).unwrap(), 3);

        let resolved = context
            .eval(Source::from_bytes(b"require.resolve('./a.cjs')"))
            .unwrap();
        assert_eq!(
            resolved
                .to_string(&mut context)
                .unwrap()
                .to_std_string_escaped(),
            "/a.cjs"
        );

        let cached = context
            .eval(Source::from_bytes(
                b"require.cache['/a.cjs'].exports",
            ))
            .unwrap();
        assert_eq!(cached.to_i32(&mut context).unwrap(), 3);
    }
}
