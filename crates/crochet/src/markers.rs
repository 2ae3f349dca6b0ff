//! Marker factories: the declaration surface for specs and implementations.
//!
//! A marker is created once per project and then used to annotate
//! functions, pairing each with its configuration record — the explicit
//! registration that replaces attribute-carrying decorators. Definitions
//! built by a marker carry the marker's project stamp, so a
//! [`PluginManager`](crate::manager::PluginManager) for another project
//! never sees them.
//!
//! # Example
//!
//! ```
//! use crochet::{HookimplMarker, HookspecMarker, json};
//!
//! let hookspec = HookspecMarker::new("example");
//! let hookimpl = HookimplMarker::new("example");
//!
//! let spec = hookspec.hook("compose").args(["base", "extras"]).build();
//! let imp = hookimpl
//!     .hook("compose")
//!     .args(["base"])
//!     .tryfirst()
//!     .function(|args| Ok(json!(format!("{}!", args[0]))));
//! # let _ = (spec, imp);
//! ```

use std::panic::Location;
use std::sync::Arc;

use serde_json::Value;

use crate::config::{ImplConfig, Project, SpecConfig};
use crate::error::BoxError;
use crate::hooks::{HookImplDef, HookSpecDef, ImplKind};
use crate::signature::Signature;
use crate::wrapper::{OutcomeController, WrapController};

// ─── HookspecMarker ───────────────────────────────────────────────────────────

/// Factory for hook specification definitions under one project.
#[derive(Debug, Clone)]
pub struct HookspecMarker {
    project: Project,
}

impl HookspecMarker {
    /// Creates a marker for the given project.
    pub fn new(project: impl Into<Project>) -> Self {
        Self {
            project: project.into(),
        }
    }

    /// The project this marker stamps into its definitions.
    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Starts declaring a hook specification with the given name.
    pub fn hook(&self, name: impl Into<String>) -> SpecBuilder {
        SpecBuilder {
            project: self.project.clone(),
            name: name.into(),
            signature: Signature::empty(),
            config: SpecConfig::default(),
        }
    }
}

/// Builder for one hook specification definition.
#[derive(Debug, Clone)]
pub struct SpecBuilder {
    project: Project,
    name: String,
    signature: Signature,
    config: SpecConfig,
}

impl SpecBuilder {
    /// Declares the hook's positional parameter names.
    pub fn args<A>(mut self, args: A) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
    {
        self.signature = Signature::new(args, self.signature.kwargs().to_vec());
        self
    }

    /// Declares the hook's keyword (default-backed) parameter names.
    pub fn kwargs<K>(mut self, kwargs: K) -> Self
    where
        K: IntoIterator,
        K::Item: Into<String>,
    {
        self.signature = Signature::new(self.signature.args().to_vec(), kwargs);
        self
    }

    /// Stop dispatch at the first non-null result.
    pub fn firstresult(mut self) -> Self {
        self.config.firstresult = true;
        self
    }

    /// Memorize calls and replay them on later registrants.
    pub fn historic(mut self) -> Self {
        self.config.historic = true;
        self
    }

    /// Emit the given diagnostic whenever an implementation of this hook is
    /// registered.
    pub fn warn_on_impl(mut self, message: impl Into<String>) -> Self {
        self.config.warn_on_impl = Some(message.into());
        self
    }

    /// Emit the given diagnostic when an implementation declares the named
    /// argument.
    pub fn warn_on_impl_arg(
        mut self,
        argname: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.config
            .warn_on_impl_args
            .insert(argname.into(), message.into());
        self
    }

    /// Finishes the definition.
    ///
    /// # Panics
    ///
    /// Panics when `historic` and `firstresult` are combined; the two
    /// dispatch modes are contradictory and the combination is rejected at
    /// declaration time.
    pub fn build(self) -> HookSpecDef {
        if let Err(err) = self.config.validate() {
            panic!("invalid specification for hook '{}': {err}", self.name);
        }
        HookSpecDef {
            project: self.project,
            name: self.name,
            signature: self.signature,
            config: self.config,
        }
    }
}

// ─── HookimplMarker ───────────────────────────────────────────────────────────

/// Factory for hook implementation definitions under one project.
#[derive(Debug, Clone)]
pub struct HookimplMarker {
    project: Project,
}

impl HookimplMarker {
    /// Creates a marker for the given project.
    pub fn new(project: impl Into<Project>) -> Self {
        Self {
            project: project.into(),
        }
    }

    /// The project this marker stamps into its definitions.
    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Starts declaring a hook implementation with the given name.
    ///
    /// The call site is recorded as the implementation's source location
    /// for diagnostics and wrapper-protocol errors.
    #[track_caller]
    pub fn hook(&self, name: impl Into<String>) -> ImplBuilder {
        ImplBuilder {
            project: self.project.clone(),
            name: name.into(),
            signature: Signature::empty(),
            config: ImplConfig::default(),
            location: Location::caller(),
        }
    }
}

/// Builder for one hook implementation definition.
///
/// Exactly one terminal — [`function`](Self::function),
/// [`wrapper`](Self::wrapper), or [`outcome_wrapper`](Self::outcome_wrapper)
/// — finishes the builder; the terminal fixes both the implementation body
/// and the wrapping flags, so the two wrapping styles cannot be combined
/// through this surface.
#[derive(Debug, Clone)]
pub struct ImplBuilder {
    project: Project,
    name: String,
    signature: Signature,
    config: ImplConfig,
    location: &'static Location<'static>,
}

impl ImplBuilder {
    /// Declares the implementation's positional parameter names.
    pub fn args<A>(mut self, args: A) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
    {
        self.signature = Signature::new(args, self.signature.kwargs().to_vec());
        self
    }

    /// Declares the implementation's keyword (default-backed) parameter
    /// names.
    pub fn kwargs<K>(mut self, kwargs: K) -> Self
    where
        K: IntoIterator,
        K::Item: Into<String>,
    {
        self.signature = Signature::new(self.signature.args().to_vec(), kwargs);
        self
    }

    /// Tolerate the absence of a matching specification.
    pub fn optional(mut self) -> Self {
        self.config.optional = true;
        self
    }

    /// Order this implementation towards the front of the execution order.
    pub fn tryfirst(mut self) -> Self {
        self.config.tryfirst = true;
        self
    }

    /// Order this implementation towards the back of the execution order.
    pub fn trylast(mut self) -> Self {
        self.config.trylast = true;
        self
    }

    /// Match against this specification name instead of the definition's
    /// own name.
    pub fn specname(mut self, name: impl Into<String>) -> Self {
        self.config.specname = Some(name.into());
        self
    }

    /// Finishes the definition with a plain implementation function.
    pub fn function(
        self,
        function: impl Fn(&[Value]) -> Result<Value, BoxError> + Send + Sync + 'static,
    ) -> HookImplDef {
        self.finish(ImplKind::Normal(Arc::new(function)))
    }

    /// Finishes the definition with a new-style wrapper.
    ///
    /// The factory is invoked once per hook call to produce a fresh
    /// controller.
    pub fn wrapper<C>(mut self, factory: impl Fn() -> C + Send + Sync + 'static) -> HookImplDef
    where
        C: WrapController + 'static,
    {
        self.config.wrapper = true;
        self.finish(ImplKind::Wrapper(Arc::new(move || Box::new(factory()))))
    }

    /// Finishes the definition with an old-style wrapper operating on the
    /// outcome envelope.
    pub fn outcome_wrapper<C>(
        mut self,
        factory: impl Fn() -> C + Send + Sync + 'static,
    ) -> HookImplDef
    where
        C: OutcomeController + 'static,
    {
        self.config.outcome_wrapper = true;
        self.finish(ImplKind::OutcomeWrapper(Arc::new(move || {
            Box::new(factory())
        })))
    }

    fn finish(self, kind: ImplKind) -> HookImplDef {
        HookImplDef {
            project: self.project,
            name: self.name,
            signature: self.signature,
            config: self.config,
            kind,
            location: self.location,
        }
    }
}
