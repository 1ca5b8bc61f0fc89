//! Virtual module registry (C5): a per-realm name -> (ready, exports |
//! factory) table. Grounded on `jjs-core/api/jjs-annex-vmod.c`.

use crate::error::{ModuleError, ModuleResult};
use boa_engine::builtins::JsArgs;
use boa_engine::object::FunctionObjectBuilder;
use boa_engine::property::Attribute;
use boa_engine::{js_string, Context, JsObject, JsResult, JsValue, NativeFunction};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// A registered virtual module's payload, before or after its factory runs.
#[derive(Debug, Clone)]
enum Slot {
    /// Not yet materialized; call the factory on first resolve.
    Pending(JsValue),
    /// Materialized; `exports` is cached for every subsequent resolve.
    Ready(JsValue),
}

/// The per-realm table of registered virtual modules.
#[derive(Debug, Default)]
pub struct VirtualModuleRegistry {
    entries: RefCell<FxHashMap<String, Slot>>,
}

/// The declared shape of a vmod registration object, e.g.
/// `{format: "object", exports: {...}}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Object,
}

impl VirtualModuleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` with `value`: a callable becomes a lazy factory, an
    /// object is interpreted immediately as a config (spec §4.5).
    ///
    /// # Errors
    /// Returns [`ModuleError::Type`] if `name` is not a valid package name,
    /// if `name` is already registered, or if `value` is neither callable
    /// nor a valid config object.
    pub fn register(
        &self,
        name: &str,
        value: JsValue,
        context: &mut Context,
    ) -> ModuleResult<()> {
        if !is_valid_package_name(name) {
            return Err(ModuleError::type_error(format!(
                "'{name}' is not a valid virtual module name"
            )));
        }

        if self.entries.borrow().contains_key(name) {
            return Err(ModuleError::type_error(format!(
                "virtual module '{name}' is already registered"
            )));
        }

        let slot = if value.as_object().is_some_and(JsObject::is_callable) {
            Slot::Pending(value)
        } else {
            let exports = extract_exports_from_config(&value, context)?;
            Slot::Ready(exports)
        };

        self.entries.borrow_mut().insert(name.to_owned(), slot);
        Ok(())
    }

    /// Whether `name` is currently registered.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.entries.borrow().contains_key(name)
    }

    /// Removes `name`'s registration, if any.
    pub fn remove(&self, name: &str) {
        self.entries.borrow_mut().remove(name);
    }

    /// Resolves `name`'s exports, invoking its factory on first use.
    ///
    /// # Errors
    /// Returns [`ModuleError::Common`] if `name` is not registered, or
    /// whatever error the factory call / config extraction raised.
    pub fn resolve(&self, name: &str, context: &mut Context) -> ModuleResult<JsValue> {
        let pending_factory = match self.entries.borrow().get(name) {
            None => return Err(ModuleError::common_error(format!("vmod '{name}' not found"))),
            Some(Slot::Ready(exports)) => return Ok(exports.clone()),
            Some(Slot::Pending(factory)) => factory.clone(),
        };

        let factory = pending_factory
            .as_object()
            .and_then(|o| o.as_callable().is_some().then(|| o.clone()))
            .ok_or_else(|| ModuleError::type_error(format!("vmod '{name}' factory is not callable")))?;

        let realm_this = JsValue::undefined();
        let result = factory
            .call(&realm_this, &[], context)
            .map_err(|e| ModuleError::common_error(format!("vmod '{name}' factory threw: {e}")))?;

        let exports = extract_exports_from_config(&result, context)?;
        self.entries
            .borrow_mut()
            .insert(name.to_owned(), Slot::Ready(exports.clone()));
        log::debug!("vmod '{name}' materialized");
        Ok(exports)
    }
}

/// Interprets `value` as a vmod config object and returns its `exports`.
///
/// `format` defaults to `"object"`; for that format, `exports` is required.
/// Any other `format` value is rejected (spec §4.5).
fn extract_exports_from_config(value: &JsValue, context: &mut Context) -> ModuleResult<JsValue> {
    let Some(obj) = value.as_object() else {
        return Err(ModuleError::type_error(
            "vmod config must be an object or a callable factory",
        ));
    };

    let format = obj
        .get(boa_engine::js_string!("format"), context)
        .map_err(|e| ModuleError::common_error(e.to_string()))?;

    let format = if format.is_undefined() {
        ConfigFormat::Object
    } else {
        let format = format
            .to_string(context)
            .map_err(|e| ModuleError::common_error(e.to_string()))?
            .to_std_string_escaped();
        match format.as_str() {
            "object" => ConfigFormat::Object,
            other => {
                return Err(ModuleError::type_error(format!(
                    "unsupported vmod format '{other}'"
                )))
            }
        }
    };

    match format {
        ConfigFormat::Object => {
            let exports = obj
                .get(boa_engine::js_string!("exports"), context)
                .map_err(|e| ModuleError::common_error(e.to_string()))?;
            if exports.is_undefined() {
                return Err(ModuleError::type_error(
                    "vmod config with format 'object' must have an 'exports' field",
                ));
            }
            Ok(exports)
        }
    }
}

/// Validates a vmod/pmap package name: at most 214 bytes, no leading `.` or
/// `_`, only lowercase letters, digits, and `- _ . @ / :`.
#[must_use]
pub fn is_valid_package_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 214 {
        return false;
    }
    if name.starts_with('.') || name.starts_with('_') {
        return false;
    }
    name.bytes().all(|b| {
        b.is_ascii_digit()
            || b.is_ascii_lowercase()
            || matches!(b, b'-' | b'_' | b'.' | b'@' | b'/' | b':')
    })
}

/// Installs the JS-visible `vmod` global: calling it registers a module
/// (`vmod(name, value)`), and its `exists`/`resolve`/`remove` methods expose
/// the rest of the registry, per spec §4.5's closing line ("Exposed to JS
/// via a host-installed callable `vmod` with methods `exists`, `resolve`,
/// `remove`"). Grounded on `jjs-core/api/jjs-annex-vmod.c`'s
/// `jjs_annex_vmod_exists`/`jjs_annex_vmod_resolve`/`..._remove`.
///
/// # Errors
/// Propagates any failure defining the global property or the callable
/// object's own method properties.
pub fn install_vmod_global(
    registry: &Rc<VirtualModuleRegistry>,
    context: &mut Context,
) -> JsResult<()> {
    let register_registry = Rc::clone(registry);
    let vmod_fn = FunctionObjectBuilder::new(
        context.realm(),
        NativeFunction::from_closure(move |_this, args, ctx| {
            let name = args
                .get_or_undefined(0)
                .to_string(ctx)?
                .to_std_string_escaped();
            let value = args.get_or_undefined(1).clone();
            register_registry
                .register(&name, value, ctx)
                .map_err(|e| e.into_js_error(ctx))?;
            Ok(JsValue::undefined())
        }),
    )
    .name(js_string!("vmod"))
    .length(2)
    .build();

    let exists_registry = Rc::clone(registry);
    let exists_fn = FunctionObjectBuilder::new(
        context.realm(),
        NativeFunction::from_closure(move |_this, args, ctx| {
            let name = args
                .get_or_undefined(0)
                .to_string(ctx)?
                .to_std_string_escaped();
            Ok(JsValue::from(exists_registry.exists(&name)))
        }),
    )
    .name(js_string!("exists"))
    .length(1)
    .build();

    let resolve_registry = Rc::clone(registry);
    let resolve_fn = FunctionObjectBuilder::new(
        context.realm(),
        NativeFunction::from_closure(move |_this, args, ctx| {
            let name = args
                .get_or_undefined(0)
                .to_string(ctx)?
                .to_std_string_escaped();
            resolve_registry
                .resolve(&name, ctx)
                .map_err(|e| e.into_js_error(ctx))
        }),
    )
    .name(js_string!("resolve"))
    .length(1)
    .build();

    let remove_registry = Rc::clone(registry);
    let remove_fn = FunctionObjectBuilder::new(
        context.realm(),
        NativeFunction::from_closure(move |_this, args, ctx| {
            let name = args
                .get_or_undefined(0)
                .to_string(ctx)?
                .to_std_string_escaped();
            remove_registry.remove(&name);
            Ok(JsValue::undefined())
        }),
    )
    .name(js_string!("remove"))
    .length(1)
    .build();

    vmod_fn.set(js_string!("exists"), exists_fn, false, context)?;
    vmod_fn.set(js_string!("resolve"), resolve_fn, false, context)?;
    vmod_fn.set(js_string!("remove"), remove_fn, false, context)?;

    context.register_global_property(js_string!("vmod"), vmod_fn, Attribute::all())?;
    Ok(())
}
