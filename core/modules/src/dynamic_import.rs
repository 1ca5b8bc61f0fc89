//! Dynamic `import()` and `import.meta` (C9). `boa_engine` routes both
//! static and dynamic `import()` through the same `ModuleLoader` hooks
//! (`load_imported_module`, `init_import_meta`), so this module is just the
//! `import.meta` half of that contract; referrer-directory resolution for
//! both import forms lives in `esm.rs`. Grounded on
//! `jjs-core/api/jjs-annex-module-util.c`'s `jjs_esm_import` entry point.

use crate::esm::module_meta;
use crate::vmod::VirtualModuleRegistry;
use boa_engine::object::ObjectInitializer;
use boa_engine::{js_string, Context, JsObject, JsResult, JsValue, NativeFunction};
use std::path::PathBuf;
use std::rc::Rc;

/// Builds the `import.meta` object for a module, per spec §4.9: `url`,
/// `filename`, `dirname`, `resolve(specifier, options?)`, and an optional
/// host-supplied `extension`.
pub fn populate_import_meta(
    module: &boa_engine::module::Module,
    meta_obj: &JsObject,
    host: Rc<dyn crate::resolve::ModuleHost>,
    vmod: Rc<VirtualModuleRegistry>,
    context: &mut Context,
) -> JsResult<()> {
    let Some(meta) = module_meta(module) else {
        return Ok(());
    };

    meta_obj.define_property_or_throw(
        js_string!("url"),
        boa_engine::property::PropertyDescriptor::builder()
            .value(js_string!(meta.url.clone()))
            .writable(false)
            .enumerable(true)
            .configurable(false)
            .build(),
        context,
    )?;
    meta_obj.define_property_or_throw(
        js_string!("filename"),
        boa_engine::property::PropertyDescriptor::builder()
            .value(js_string!(meta.path.clone()))
            .writable(false)
            .enumerable(true)
            .configurable(false)
            .build(),
        context,
    )?;
    meta_obj.define_property_or_throw(
        js_string!("dirname"),
        boa_engine::property::PropertyDescriptor::builder()
            .value(js_string!(meta.dirname.clone()))
            .writable(false)
            .enumerable(true)
            .configurable(false)
            .build(),
        context,
    )?;

    if let Some(extension) = meta.extension.clone() {
        meta_obj.define_property_or_throw(
            js_string!("extension"),
            boa_engine::property::PropertyDescriptor::builder()
                .value(extension)
                .writable(false)
                .enumerable(true)
                .configurable(false)
                .build(),
            context,
        )?;
    }

    let dirname = meta.dirname.clone();
    let resolve_fn = NativeFunction::from_closure(move |_this, args, ctx| {
        let specifier = args
            .first()
            .cloned()
            .unwrap_or_else(JsValue::undefined)
            .to_string(ctx)?
            .to_std_string_escaped();

        let as_path = args
            .get(1)
            .and_then(JsValue::as_object)
            .map(|opts| opts.get(js_string!("path"), ctx))
            .transpose()?
            .map(|v| v.to_boolean())
            .unwrap_or(false);

        // Vmod specifiers resolve to themselves (spec §4.10 / §4.9).
        if vmod.exists(&specifier) {
            return Ok(JsValue::from(js_string!(specifier)));
        }

        let request = crate::resolve::RequestContext {
            referrer_path: PathBuf::from(&dirname),
            kind: crate::path::ModuleKind::Module,
        };
        let resolved = host
            .resolve(&specifier, &request)
            .map_err(|e| e.into_js_error(ctx))?;

        let out = if as_path {
            resolved.path
        } else {
            crate::path::to_file_url(&resolved.path).unwrap_or(resolved.path)
        };
        Ok(JsValue::from(js_string!(out)))
    });

    let resolve_obj = ObjectInitializer::with_native_function(context, resolve_fn, 2).build();
    meta_obj.define_property_or_throw(
        js_string!("resolve"),
        boa_engine::property::PropertyDescriptor::builder()
            .value(resolve_obj)
            .writable(true)
            .enumerable(true)
            .configurable(true)
            .build(),
        context,
    )?;

    Ok(())
}
