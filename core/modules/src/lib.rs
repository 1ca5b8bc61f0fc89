//! The module subsystem annex: specifier resolution, loading, linking, and
//! evaluation for ECMAScript modules, CommonJS modules, and synthetic
//! (native) modules, plus the virtual module registry and package map that
//! sit above resolution, and the microtask queue that drives dynamic
//! `import()`.
//!
//! This crate is an extension over [`boa_engine`], in the same spirit as
//! `boa_interop`/`boa_runtime`: it does not implement a parser, interpreter,
//! or garbage collector, it only adds module-graph machinery on top of one.

pub mod commonjs;
pub mod context;
pub mod dynamic_import;
pub mod error;
pub mod esm;
pub mod job_queue;
pub mod path;
pub mod platform;
pub mod pmap;
pub mod resolve;
pub mod scratch;
pub mod vmod;

pub use boa_engine::Module;
pub use context::{ModuleConfig, ModuleContext};
pub use error::{ModuleError, ModuleResult};
pub use path::ModuleKind;
