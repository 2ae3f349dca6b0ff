//! The plugin and specification-namespace contracts.
//!
//! A *plugin* is any value contributing one or more hook implementations; a
//! *specification namespace* is any value declaring hook specifications.
//! Both are scanned by the [`PluginManager`](crate::manager::PluginManager),
//! which only picks up definitions stamped with its own
//! [`Project`](crate::config::Project) — definitions built by another
//! project's markers are invisible to it.

use std::borrow::Cow;
use std::sync::Arc;

use crate::hooks::{HookImplDef, HookSpecDef};

/// A value carrying hook implementations.
///
/// Plugins are registered as `Arc<dyn Plugin>`; the allocation is the
/// plugin's identity, so the same `Arc` cannot be registered twice even
/// under different names.
///
/// # Example
///
/// ```
/// use crochet::{HookimplMarker, HookImplDef, Plugin, json};
///
/// struct Greeter;
///
/// impl Plugin for Greeter {
///     fn hook_impls(&self) -> Vec<HookImplDef> {
///         let marker = HookimplMarker::new("example");
///         vec![
///             marker
///                 .hook("greet")
///                 .args(["name"])
///                 .function(|args| Ok(json!(format!("hello {}", args[0])))),
///         ]
///     }
///
///     fn plugin_name(&self) -> Option<&str> {
///         Some("greeter")
///     }
/// }
/// ```
pub trait Plugin: Send + Sync {
    /// The hook implementation definitions this plugin contributes.
    ///
    /// Called once per registration; the manager keeps the constructed
    /// implementations, not the definitions.
    fn hook_impls(&self) -> Vec<HookImplDef>;

    /// Canonical registration name, when the plugin carries one.
    ///
    /// Used when `register` is called without an explicit name; plugins
    /// without one get an identity-derived fallback.
    fn plugin_name(&self) -> Option<&str> {
        None
    }
}

/// A value declaring hook specifications.
pub trait SpecNamespace: Send + Sync {
    /// The hook specification definitions this namespace declares.
    fn hook_specs(&self) -> Vec<HookSpecDef>;

    /// Label used in diagnostics that mention this namespace.
    fn namespace_label(&self) -> Cow<'_, str> {
        Cow::Borrowed("<hookspecs>")
    }
}

/// Identity key for a registered plugin: the address of its allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PluginId(usize);

impl PluginId {
    /// Derives the identity of a plugin handle.
    pub fn of(plugin: &Arc<dyn Plugin>) -> Self {
        Self(Arc::as_ptr(plugin) as *const () as usize)
    }

    /// The raw address, used for identity-derived fallback names.
    pub(crate) fn addr(self) -> usize {
        self.0
    }
}
