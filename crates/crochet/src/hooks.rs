//! Hook specifications and hook implementations.
//!
//! [`HookSpecDef`] and [`HookImplDef`] are what the marker builders in
//! [`markers`](crate::markers) produce: portable definitions carrying a
//! project stamp. When the [`PluginManager`](crate::manager::PluginManager)
//! accepts them they become the caller-resident forms [`HookSpec`] and
//! [`HookImpl`].

use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::config::{ImplConfig, Project, SpecConfig};
use crate::error::BoxError;
use crate::plugin::Plugin;
use crate::signature::Signature;
use crate::wrapper::{OutcomeWrapFactory, WrapFactory};

/// A normal (non-wrapping) hook implementation function.
///
/// Receives the positional argument values extracted per the declared
/// [`Signature`]; returns a result value (`Null` meaning "no result") or an
/// error.
pub type HookFn = Arc<dyn Fn(&[Value]) -> Result<Value, BoxError> + Send + Sync>;

// ─── Specifications ───────────────────────────────────────────────────────────

/// A hook specification definition, as produced by
/// [`HookspecMarker`](crate::markers::HookspecMarker).
#[derive(Debug, Clone)]
pub struct HookSpecDef {
    /// Project stamp; managers for other projects ignore this definition.
    pub project: Project,
    /// Hook name being specified.
    pub name: String,
    /// Declared parameter names.
    pub signature: Signature,
    /// Dispatch options.
    pub config: SpecConfig,
}

/// A hook specification attached to a caller.
#[derive(Debug, Clone)]
pub struct HookSpec {
    namespace: String,
    name: String,
    signature: Signature,
    config: SpecConfig,
}

impl HookSpec {
    pub(crate) fn new(namespace: impl Into<String>, def: &HookSpecDef) -> Self {
        Self {
            namespace: namespace.into(),
            name: def.name.clone(),
            signature: def.signature.clone(),
            config: def.config.clone(),
        }
    }

    /// Label of the namespace that declared this specification.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The hook name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameter names.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Dispatch options.
    pub fn config(&self) -> &SpecConfig {
        &self.config
    }

    /// Warns about each declared positional argument absent from a call.
    ///
    /// The call itself proceeds; implementations that require a missing
    /// argument fail individually with a
    /// [`HookCallError`](crate::error::HookCallError).
    pub(crate) fn warn_missing_call_args(&self, kwargs: &crate::kwargs::Kwargs) {
        for argname in self.signature.args() {
            if !kwargs.contains(argname) {
                warn!(
                    hook = %self.name,
                    argument = %argname,
                    "hook call is missing an argument declared in the specification"
                );
            }
        }
    }
}

// ─── Implementations ──────────────────────────────────────────────────────────

/// The three kinds of hook implementation bodies.
#[derive(Clone)]
pub enum ImplKind {
    /// Plain function contributing a result value.
    Normal(HookFn),
    /// New-style wrapper; produces a fresh controller per call.
    Wrapper(WrapFactory),
    /// Old-style wrapper operating on the outcome envelope.
    OutcomeWrapper(OutcomeWrapFactory),
}

impl ImplKind {
    /// Whether this body wraps the chain (either style).
    pub fn is_wrapper(&self) -> bool {
        !matches!(self, ImplKind::Normal(_))
    }
}

impl fmt::Debug for ImplKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            ImplKind::Normal(_) => "Normal",
            ImplKind::Wrapper(_) => "Wrapper",
            ImplKind::OutcomeWrapper(_) => "OutcomeWrapper",
        };
        f.write_str(kind)
    }
}

/// A hook implementation definition, as produced by
/// [`HookimplMarker`](crate::markers::HookimplMarker).
#[derive(Debug, Clone)]
pub struct HookImplDef {
    /// Project stamp; managers for other projects ignore this definition.
    pub project: Project,
    /// Definition name; the hook matched is `config.specname` when set,
    /// this name otherwise.
    pub name: String,
    /// Declared parameter names of the implementation.
    pub signature: Signature,
    /// Dispatch options.
    pub config: ImplConfig,
    /// The implementation body.
    pub kind: ImplKind,
    /// Where the definition was built; reported by wrapper-protocol errors
    /// and implementation diagnostics.
    pub location: &'static Location<'static>,
}

impl HookImplDef {
    /// Hook name this definition attaches to.
    pub fn hook_name(&self) -> &str {
        self.config.specname.as_deref().unwrap_or(&self.name)
    }

    pub(crate) fn into_impl(self, plugin: Option<Arc<dyn Plugin>>, plugin_name: String) -> HookImpl {
        HookImpl {
            kind: self.kind,
            signature: self.signature,
            plugin,
            plugin_name,
            config: self.config,
            location: self.location,
        }
    }
}

/// A hook implementation registered on a caller.
pub struct HookImpl {
    kind: ImplKind,
    signature: Signature,
    plugin: Option<Arc<dyn Plugin>>,
    plugin_name: String,
    config: ImplConfig,
    location: &'static Location<'static>,
}

impl HookImpl {
    pub(crate) fn kind(&self) -> &ImplKind {
        &self.kind
    }

    /// Declared parameter names.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The plugin that contributed this implementation, if any
    /// (`call_extra` methods have none).
    pub fn plugin(&self) -> Option<&Arc<dyn Plugin>> {
        self.plugin.as_ref()
    }

    /// Name the contributing plugin was registered under.
    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    /// Dispatch options snapshot.
    pub fn config(&self) -> &ImplConfig {
        &self.config
    }

    /// Where the implementation was declared.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Whether this implementation wraps the chain (either style).
    pub fn is_wrapper(&self) -> bool {
        self.kind.is_wrapper()
    }
}

impl fmt::Debug for HookImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookImpl")
            .field("plugin_name", &self.plugin_name)
            .field("kind", &self.kind)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ─── Extra methods ────────────────────────────────────────────────────────────

/// A method temporarily participating in a single
/// [`call_extra`](crate::caller::HookCaller::call_extra) dispatch.
///
/// Extra methods always run as plain implementations: no ordering tags, no
/// wrapping, no plugin attribution.
pub struct ExtraHook {
    pub(crate) signature: Signature,
    pub(crate) function: HookFn,
    pub(crate) location: &'static Location<'static>,
}

impl ExtraHook {
    /// Pairs a function with its declared positional parameter names.
    #[track_caller]
    pub fn new<A>(args: A, function: impl Fn(&[Value]) -> Result<Value, BoxError> + Send + Sync + 'static) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
    {
        Self {
            signature: Signature::positional(args),
            function: Arc::new(function),
            location: Location::caller(),
        }
    }

    pub(crate) fn into_impl(self) -> HookImpl {
        HookImpl {
            kind: ImplKind::Normal(self.function),
            signature: self.signature,
            plugin: None,
            plugin_name: "<extra>".into(),
            config: ImplConfig::default(),
            location: self.location,
        }
    }
}
