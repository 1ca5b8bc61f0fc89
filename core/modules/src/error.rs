//! Error kinds raised by the module subsystem.
//!
//! These mirror the five kinds in the design spec: bad input and invalid
//! synthetic-module state surface as [`ModuleError::Type`], bookkeeping
//! overflow as [`ModuleError::Range`], unknown synthetic exports as
//! [`ModuleError::Reference`], missing host capabilities and circular
//! `require` as [`ModuleError::Common`], and parser failures pass through
//! as [`ModuleError::Syntax`].

use boa_engine::{Context, JsError, JsNativeError, JsNativeErrorKind};
use std::fmt;

/// Errors raised by path resolution, loading, linking and caching.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    /// Bad argument types, invalid synthetic-module export names, `require`/`import`
    /// targeting a non-module handle, unrecognized `format` strings, or writing to a
    /// finalized synthetic module.
    #[error("{0}")]
    Type(String),

    /// pmap bookkeeping out of bounds, a malformed module-request index, or a
    /// namespace requested before a module reached `LINKED`.
    #[error("{0}")]
    Range(String),

    /// An unknown export name was read or written on a synthetic module.
    #[error("{0}")]
    Reference(String),

    /// A missing platform capability, an unset resolve/load callback, a failed
    /// `realpath`/file-url conversion, or a circular `require`.
    #[error("{0}")]
    Common(String),

    /// The underlying parser rejected the source text.
    #[error("{0}")]
    Syntax(String),
}

impl ModuleError {
    /// Shorthand for [`ModuleError::Type`].
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type(message.into())
    }

    /// Shorthand for [`ModuleError::Range`].
    pub fn range_error(message: impl Into<String>) -> Self {
        Self::Range(message.into())
    }

    /// Shorthand for [`ModuleError::Reference`].
    pub fn reference_error(message: impl Into<String>) -> Self {
        Self::Reference(message.into())
    }

    /// Shorthand for [`ModuleError::Common`].
    pub fn common_error(message: impl Into<String>) -> Self {
        Self::Common(message.into())
    }

    /// Converts this error into a JS-visible exception, ready to be returned
    /// from any public API or thrown into the running script.
    pub fn into_js_error(self, context: &mut Context) -> JsError {
        let native = match &self {
            Self::Type(msg) => JsNativeError::typ().with_message(msg.clone()),
            Self::Range(msg) => JsNativeError::range().with_message(msg.clone()),
            Self::Reference(msg) => JsNativeError::reference().with_message(msg.clone()),
            Self::Common(msg) => JsNativeError::error().with_message(msg.clone()),
            Self::Syntax(msg) => JsNativeError::syntax().with_message(msg.clone()),
        };
        let _ = context;
        native.into()
    }
}

impl From<ModuleError> for JsNativeErrorKind {
    fn from(err: ModuleError) -> Self {
        match err {
            ModuleError::Type(_) => JsNativeErrorKind::Type,
            ModuleError::Range(_) => JsNativeErrorKind::Range,
            ModuleError::Reference(_) => JsNativeErrorKind::Reference,
            ModuleError::Common(_) | ModuleError::Syntax(_) => JsNativeErrorKind::Error,
        }
    }
}

/// Convenience alias used throughout the crate for fallible operations that
/// have not yet reached a [`Context`] (and so cannot be converted to a
/// [`JsError`] directly).
pub type ModuleResult<T> = Result<T, ModuleError>;

impl fmt::Display for ModuleErrorKindLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Type => "TypeError",
            Self::Range => "RangeError",
            Self::Reference => "ReferenceError",
            Self::Common => "Error",
            Self::Syntax => "SyntaxError",
        })
    }
}

/// The textual label of a [`ModuleError`] variant, useful for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleErrorKindLabel {
    /// See [`ModuleError::Type`].
    Type,
    /// See [`ModuleError::Range`].
    Range,
    /// See [`ModuleError::Reference`].
    Reference,
    /// See [`ModuleError::Common`].
    Common,
    /// See [`ModuleError::Syntax`].
    Syntax,
}

impl ModuleError {
    /// Returns the label for this error's kind, used by log statements.
    #[must_use]
    pub fn label(&self) -> ModuleErrorKindLabel {
        match self {
            Self::Type(_) => ModuleErrorKindLabel::Type,
            Self::Range(_) => ModuleErrorKindLabel::Range,
            Self::Reference(_) => ModuleErrorKindLabel::Reference,
            Self::Common(_) => ModuleErrorKindLabel::Common,
            Self::Syntax(_) => ModuleErrorKindLabel::Syntax,
        }
    }
}
