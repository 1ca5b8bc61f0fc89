//! End-to-end coverage of the literal scenarios the module subsystem is
//! built around: CJS-from-ESM interop, pmap resolution, vmod registration,
//! and dynamic `import()` with `import.meta`.

use boa_engine::builtins::promise::PromiseState;
use boa_engine::{js_string, Context, Module, Source};
use boa_modules::commonjs::CommonJsState;
use boa_modules::esm::{EsmCache, EsmLoader};
use boa_modules::error::{ModuleError, ModuleResult};
use boa_modules::path;
use boa_modules::resolve::{LoadResult, ModuleHost, RequestContext, ResolveResult};
use boa_modules::vmod::VirtualModuleRegistry;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

struct MemoryHost {
    files: RefCell<HashMap<String, String>>,
}

impl MemoryHost {
    fn new(files: &[(&str, &str)]) -> Rc<Self> {
        Rc::new(Self {
            files: RefCell::new(
                files
                    .iter()
                    .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                    .collect(),
            ),
        })
    }
}

impl ModuleHost for MemoryHost {
    fn resolve(&self, specifier: &str, request: &RequestContext) -> ModuleResult<ResolveResult> {
        let joined = path::join(&request.referrer_path.to_string_lossy(), specifier)
            .ok_or_else(|| ModuleError::common_error("join failed"))?;
        let path_str = joined.to_string_lossy().into_owned();
        if !self.files.borrow().contains_key(&path_str) {
            return Err(ModuleError::common_error(format!(
                "no such file: {path_str}"
            )));
        }
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

macro_rules! assert_fulfilled {
    ($promise:expr, $context:expr) => {
        match $promise.state() {
            PromiseState::Fulfilled(_) => {}
            PromiseState::Pending => panic!("module evaluation left the promise pending"),
            PromiseState::Rejected(reason) => {
                let msg = reason
                    .to_string($context)
                    .map(|s| s.to_std_string_escaped())
                    .unwrap_or_else(|_| "<unprintable>".to_owned());
                panic!("module evaluation rejected: {msg}");
            }
        }
    };
}

#[test]
fn s3_esm_default_import_from_commonjs() {
    let host = MemoryHost::new(&[("/c.cjs", "module.exports = 42;")]);
    let host: Rc<dyn ModuleHost> = host;
    let commonjs = CommonJsState::new(Rc::clone(&host));
    let cache = Rc::new(EsmCache::new());
    let vmod = Rc::new(VirtualModuleRegistry::new());
    let loader = Rc::new(EsmLoader::new(
        Rc::clone(&host),
        cache,
        vmod,
        Rc::clone(&commonjs),
    ));

    let mut context = Context::builder()
        .module_loader(Rc::clone(&loader) as Rc<dyn boa_engine::module::ModuleLoader>)
        .build()
        .unwrap();

    let source = Source::from_bytes(b"import d from './c.cjs'; export let seen = d;");
    let module = Module::parse(source, None, &mut context).unwrap();
    let promise = module.load_link_evaluate(&mut context);
    context.run_jobs();
    assert_fulfilled!(promise, &mut context);

    let seen = module
        .namespace(&mut context)
        .get(js_string!("seen"), &mut context)
        .unwrap();
    assert_eq!(seen.to_i32(&mut context).unwrap(), 42);
}

#[test]
fn s4_pmap_resolves_bare_specifier() {
    let pmap =
        boa_modules::pmap::PackageMap::from_json(
            r#"{"packages": {"pkg": {"main": "sub/entry.js"}}}"#,
            "/r",
        )
        .unwrap();
    let resolved = pmap
        .resolve("pkg", boa_modules::path::ModuleKind::CommonJs)
        .unwrap();
    assert_eq!(resolved, std::path::PathBuf::from("/r/sub/entry.js"));
}

#[test]
fn s5_vmod_object_import_and_require() {
    let host = MemoryHost::new(&[]);
    let host: Rc<dyn ModuleHost> = host;
    let mut context = Context::default();

    let vmod = Rc::new(VirtualModuleRegistry::new());
    let config = boa_engine::JsObject::with_null_proto();
    let exports = boa_engine::JsObject::with_null_proto();
    exports
        .set(js_string!("PORT"), 8080, false, &mut context)
        .unwrap();
    config
        .set(
            js_string!("format"),
            js_string!("object"),
            false,
            &mut context,
        )
        .unwrap();
    config
        .set(js_string!("exports"), exports, false, &mut context)
        .unwrap();
    vmod.register("env", boa_engine::JsValue::from(config), &mut context)
        .unwrap();

    let resolved = vmod.resolve("env", &mut context).unwrap();
    let port = resolved
        .as_object()
        .unwrap()
        .get(js_string!("PORT"), &mut context)
        .unwrap();
    assert_eq!(port.to_i32(&mut context).unwrap(), 8080);

    let commonjs = CommonJsState::new(Rc::clone(&host));
    let cache = Rc::new(EsmCache::new());
    let loader = EsmLoader::new(host, cache, Rc::clone(&vmod), commonjs);
    let module = loader
        .esm_read("env", Path::new("/"), &mut context)
        .unwrap();
    let promise = module.load_link_evaluate(&mut context);
    context.run_jobs();
    assert_fulfilled!(promise, &mut context);

    let port_named = module
        .namespace(&mut context)
        .get(js_string!("PORT"), &mut context)
        .unwrap();
    assert_eq!(port_named.to_i32(&mut context).unwrap(), 8080);
}

#[test]
fn s6_dynamic_import_and_import_meta_url() {
    let host = MemoryHost::new(&[
        ("/m/x.mjs", "export const ns = await import('./y.mjs');"),
        ("/m/y.mjs", "export const tag = 'y';"),
    ]);
    let host: Rc<dyn ModuleHost> = host;
    let commonjs = CommonJsState::new(Rc::clone(&host));
    let cache = Rc::new(EsmCache::new());
    let vmod = Rc::new(VirtualModuleRegistry::new());
    let loader = Rc::new(EsmLoader::new(
        Rc::clone(&host),
        Rc::clone(&cache),
        vmod,
        commonjs,
    ));

    let mut context = Context::builder()
        .module_loader(Rc::clone(&loader) as Rc<dyn boa_engine::module::ModuleLoader>)
        .build()
        .unwrap();

    let module = loader
        .esm_read("/m/x.mjs", Path::new("/m"), &mut context)
        .unwrap();
    let promise = module.load_link_evaluate(&mut context);
    context.run_jobs();
    assert_fulfilled!(promise, &mut context);

    let meta = boa_modules::esm::module_meta(&module).unwrap();
    assert_eq!(meta.url, "file:///m/x.mjs");

    let ns = module
        .namespace(&mut context)
        .get(js_string!("ns"), &mut context)
        .unwrap();
    let tag = ns
        .as_object()
        .unwrap()
        .get(js_string!("tag"), &mut context)
        .unwrap();
    assert_eq!(
        tag.to_string(&mut context).unwrap().to_std_string_escaped(),
        "y"
    );
}
