//! Plugin registration, validation, and the hook-call facade.
//!
//! [`PluginManager`] is the central owner of one plugin system. It:
//!
//! - Accepts specification namespaces via
//!   [`add_hookspecs`](PluginManager::add_hookspecs), creating or upgrading
//!   the per-hook callers in its [`HookRelay`].
//! - Registers plugins, scanning each for implementation definitions
//!   stamped with the manager's project, validating them against the known
//!   specifications, and slotting them into the callers' ordered chains.
//!   Validation failures leave the manager untouched for that plugin.
//! - Tracks blocked names, distribution info for entry-point-loaded
//!   plugins, and the reverse plugin → callers index.
//! - Replays memorized calls of historic hooks onto late registrants.
//! - Installs hook-call monitoring and tracing around every dispatch.
//!
//! # Example
//!
//! ```
//! use crochet::{HookimplMarker, HookspecMarker, HookSpecDef, HookImplDef};
//! use crochet::{Plugin, PluginManager, SpecNamespace, json, kwargs};
//! use std::sync::Arc;
//!
//! struct Specs;
//! impl SpecNamespace for Specs {
//!     fn hook_specs(&self) -> Vec<HookSpecDef> {
//!         vec![HookspecMarker::new("example").hook("greet").args(["name"]).build()]
//!     }
//! }
//!
//! struct Greeter;
//! impl Plugin for Greeter {
//!     fn hook_impls(&self) -> Vec<HookImplDef> {
//!         vec![
//!             HookimplMarker::new("example")
//!                 .hook("greet")
//!                 .args(["name"])
//!                 .function(|args| Ok(json!(format!("hello {}", args[0].as_str().unwrap())))),
//!         ]
//!     }
//!     fn plugin_name(&self) -> Option<&str> {
//!         Some("greeter")
//!     }
//! }
//!
//! let pm = PluginManager::new("example");
//! pm.add_hookspecs(&Specs).unwrap();
//! pm.register(Arc::new(Greeter), None).unwrap();
//!
//! let hook = pm.hook("greet").unwrap();
//! let res = hook.call(&kwargs! { "name" => "world" }).unwrap();
//! assert_eq!(res, json!(["hello world"]));
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::caller::{HookCaller, HookRelay, SubsetHookCaller};
use crate::config::Project;
use crate::entrypoints::{DistInfo, EntryPoints};
use crate::error::{PluginValidationError, RegistryError};
use crate::hooks::{HookImpl, HookSpec};
use crate::kwargs::Kwargs;
use crate::multicall::{ExecFn, HookExec};
use crate::outcome::CallOutcome;
use crate::plugin::{Plugin, PluginId, SpecNamespace};
use crate::trace::{TagTracer, TagTracerSub};

// =============================================================================
// Registry (internal)
// =============================================================================

struct PluginEntry {
    plugin: Arc<dyn Plugin>,
    name: String,
    callers: Vec<Arc<HookCaller>>,
}

#[derive(Default)]
struct Registry {
    /// Name → plugin; a name mapped to `None` is blocked.
    names: HashMap<String, Option<Arc<dyn Plugin>>>,
    /// Reverse index: plugin identity → the callers it participates in.
    plugins: HashMap<PluginId, PluginEntry>,
    /// Distribution info for entry-point-loaded plugins.
    distinfo: Vec<(Arc<dyn Plugin>, DistInfo)>,
}

// =============================================================================
// PluginManager
// =============================================================================

/// Core manager holding the plugin registry and the hook relay of one
/// plugin system.
///
/// All methods take `&self`; interior state is guarded by short-lived
/// locks that are never held while plugin code runs, so plugins may
/// register further plugins from inside a hook call.
pub struct PluginManager {
    project: Project,
    relay: HookRelay,
    exec: Arc<HookExec>,
    tracer: Arc<TagTracer>,
    trace: TagTracerSub,
    registry: RwLock<Registry>,
}

impl PluginManager {
    /// Creates a manager for the given project.
    pub fn new(project: impl Into<Project>) -> Self {
        let tracer = TagTracer::new();
        let trace = tracer.get("pluginmanage");
        Self {
            project: project.into(),
            relay: HookRelay::new(),
            exec: HookExec::new(),
            tracer,
            trace,
            registry: RwLock::new(Registry::default()),
        }
    }

    /// The project this manager scans for.
    pub fn project(&self) -> &Project {
        &self.project
    }

    /// The relay mapping hook names to callers.
    pub fn relay(&self) -> &HookRelay {
        &self.relay
    }

    /// Looks up the caller for a hook name.
    pub fn hook(&self, name: &str) -> Option<Arc<HookCaller>> {
        self.relay.get(name)
    }

    /// The manager's tag tracer (drives [`enable_tracing`](Self::enable_tracing)).
    pub fn tracer(&self) -> &Arc<TagTracer> {
        &self.tracer
    }

    /// The manager's own trace handle, tagged `pluginmanage`.
    pub fn trace(&self) -> &TagTracerSub {
        &self.trace
    }

    // ─── Specifications ──────────────────────────────────────────────────────

    /// Adds the hook specifications declared in a namespace.
    ///
    /// Callers that already exist without a specification are upgraded in
    /// place and their accumulated implementations re-validated. The whole
    /// namespace is validated before anything is attached: a rejected call
    /// leaves the manager unchanged.
    pub fn add_hookspecs(&self, namespace: &dyn SpecNamespace) -> Result<(), RegistryError> {
        let label = namespace.namespace_label().into_owned();
        let defs: Vec<_> = namespace
            .hook_specs()
            .into_iter()
            .filter(|def| def.project == self.project)
            .collect();
        if defs.is_empty() {
            return Err(RegistryError::EmptyNamespace(label));
        }

        let mut seen = HashSet::new();
        for def in &defs {
            if !seen.insert(def.name.clone()) {
                return Err(RegistryError::SpecAlreadySet {
                    name: def.name.clone(),
                    namespace: label.clone(),
                });
            }
            def.config
                .validate()
                .map_err(|err| RegistryError::InvalidConfig {
                    name: def.name.clone(),
                    reason: err.to_string(),
                })?;
            if let Some(caller) = self.relay.get(&def.name) {
                if let Some(existing) = caller.spec() {
                    return Err(RegistryError::SpecAlreadySet {
                        name: def.name.clone(),
                        namespace: existing.namespace().to_string(),
                    });
                }
                // Implementations registered before the spec arrived.
                let candidate = HookSpec::new(label.clone(), def);
                for imp in caller.get_hookimpls() {
                    self.verify_hook(&candidate, &imp)?;
                }
            }
        }

        for def in &defs {
            let spec = HookSpec::new(label.clone(), def);
            match self.relay.get(&def.name) {
                Some(caller) => caller.set_specification(spec)?,
                None => self.relay.insert(Arc::new(HookCaller::with_spec(
                    spec,
                    Arc::clone(&self.exec),
                ))),
            }
            debug!(hook = %def.name, namespace = %label, "hook specification added");
        }
        Ok(())
    }

    // ─── Plugin registration ─────────────────────────────────────────────────

    /// Registers a plugin under `name` (or its canonical name) and returns
    /// the name used.
    ///
    /// Returns `Ok(None)` when the name is blocked. Fails when the name or
    /// the plugin object is already registered, or when any contributed
    /// implementation fails validation — in which case nothing is
    /// registered at all.
    pub fn register(
        &self,
        plugin: Arc<dyn Plugin>,
        name: Option<&str>,
    ) -> Result<Option<String>, RegistryError> {
        let plugin_name = name
            .map(str::to_string)
            .unwrap_or_else(|| self.get_canonical_name(&plugin));
        let id = PluginId::of(&plugin);

        {
            let registry = self.registry.read();
            match registry.names.get(&plugin_name) {
                Some(None) => {
                    debug!(plugin = %plugin_name, "registration of blocked name skipped");
                    return Ok(None);
                }
                Some(Some(_)) => return Err(RegistryError::NameInUse(plugin_name)),
                None => {}
            }
            if let Some(entry) = registry.plugins.get(&id) {
                return Err(RegistryError::PluginInUse(entry.name.clone()));
            }
        }

        // Scan and validate everything before touching any state.
        let mut pending: Vec<(String, Arc<HookImpl>)> = Vec::new();
        for def in plugin.hook_impls() {
            if def.project != self.project {
                continue;
            }
            def.config
                .validate()
                .map_err(|err| PluginValidationError {
                    plugin: plugin_name.clone(),
                    message: format!("hook '{}': {err}", def.hook_name()),
                })?;
            let hook_name = def.hook_name().to_string();
            let imp = Arc::new(def.into_impl(Some(Arc::clone(&plugin)), plugin_name.clone()));
            if let Some(caller) = self.relay.get(&hook_name)
                && let Some(spec) = caller.spec()
            {
                self.verify_hook(&spec, &imp)?;
            }
            pending.push((hook_name, imp));
        }

        // Commit.
        let mut callers: Vec<Arc<HookCaller>> = Vec::new();
        let mut replays: Vec<(Arc<HookCaller>, Arc<HookImpl>)> = Vec::new();
        for (hook_name, imp) in pending {
            let caller = self.relay.get_or_insert(&hook_name, &self.exec);
            caller.add_hookimpl(Arc::clone(&imp));
            if caller.is_historic() {
                replays.push((Arc::clone(&caller), imp));
            }
            callers.push(caller);
        }
        {
            let mut registry = self.registry.write();
            registry
                .names
                .insert(plugin_name.clone(), Some(Arc::clone(&plugin)));
            registry.plugins.insert(
                id,
                PluginEntry {
                    plugin,
                    name: plugin_name.clone(),
                    callers,
                },
            );
        }
        info!(plugin = %plugin_name, "plugin registered");

        // Replay memorized calls outside the registry lock: the replayed
        // implementation may itself register further plugins.
        for (caller, imp) in replays {
            caller
                .apply_history(&imp)
                .map_err(|err| RegistryError::HistoricReplay {
                    hook: caller.name().to_string(),
                    reason: err.to_string(),
                })?;
        }
        Ok(Some(plugin_name))
    }

    /// Unregisters a plugin, removing its implementations from every
    /// caller. Returns the name it was registered under.
    pub fn unregister(&self, plugin: &Arc<dyn Plugin>) -> Option<String> {
        let id = PluginId::of(plugin);
        let entry = {
            let mut registry = self.registry.write();
            let entry = registry.plugins.remove(&id)?;
            // A name blocked after registration stays blocked.
            if registry
                .names
                .get(&entry.name)
                .is_some_and(|p| p.is_some())
            {
                registry.names.remove(&entry.name);
            }
            entry
        };
        for caller in &entry.callers {
            caller.remove_plugin(id);
        }
        info!(plugin = %entry.name, "plugin unregistered");
        Some(entry.name)
    }

    /// Unregisters the plugin registered under `name` and returns it.
    pub fn unregister_name(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        let plugin = self.get_plugin(name)?;
        self.unregister(&plugin)?;
        Some(plugin)
    }

    // ─── Blocking ────────────────────────────────────────────────────────────

    /// Blocks the name from future registrations, unregistering any plugin
    /// currently holding it.
    pub fn set_blocked(&self, name: &str) {
        self.unregister_name(name);
        self.registry.write().names.insert(name.to_string(), None);
        debug!(name, "plugin name blocked");
    }

    /// Whether the name is blocked.
    pub fn is_blocked(&self, name: &str) -> bool {
        self.registry
            .read()
            .names
            .get(name)
            .is_some_and(|plugin| plugin.is_none())
    }

    /// Removes a block. Returns whether one existed.
    pub fn unblock(&self, name: &str) -> bool {
        let mut registry = self.registry.write();
        if registry.names.get(name).is_some_and(|p| p.is_none()) {
            registry.names.remove(name);
            true
        } else {
            false
        }
    }

    // ─── Validation ──────────────────────────────────────────────────────────

    fn verify_hook(&self, spec: &HookSpec, imp: &HookImpl) -> Result<(), PluginValidationError> {
        if spec.config().historic && imp.is_wrapper() {
            return Err(PluginValidationError {
                plugin: imp.plugin_name().to_string(),
                message: format!("hook '{}' is historic and cannot be wrapped", spec.name()),
            });
        }
        if let Some(message) = &spec.config().warn_on_impl {
            warn!(
                hook = %spec.name(),
                plugin = %imp.plugin_name(),
                location = %imp.location(),
                "{message}"
            );
        }
        let notinspec: Vec<_> = imp
            .signature()
            .args()
            .iter()
            .filter(|arg| !spec.signature().args().contains(arg))
            .cloned()
            .collect();
        if !notinspec.is_empty() {
            return Err(PluginValidationError {
                plugin: imp.plugin_name().to_string(),
                message: format!(
                    "hook '{}': argument(s) {:?} are declared in the implementation \
                     (args: {:?}) but not in the specification (args: {:?})",
                    spec.name(),
                    notinspec,
                    imp.signature().args(),
                    spec.signature().args(),
                ),
            });
        }
        for arg in imp.signature().args() {
            if let Some(message) = spec.config().warn_on_impl_args.get(arg) {
                warn!(
                    hook = %spec.name(),
                    plugin = %imp.plugin_name(),
                    argument = %arg,
                    location = %imp.location(),
                    "{message}"
                );
            }
        }
        if imp.config().is_wrapper() != imp.is_wrapper() {
            return Err(PluginValidationError {
                plugin: imp.plugin_name().to_string(),
                message: format!(
                    "hook '{}': wrapping configuration does not match the implementation body",
                    spec.name()
                ),
            });
        }
        if imp.config().wrapper && imp.config().outcome_wrapper {
            return Err(PluginValidationError {
                plugin: imp.plugin_name().to_string(),
                message: format!(
                    "hook '{}': an implementation cannot be both a wrapper and an outcome wrapper",
                    spec.name()
                ),
            });
        }
        Ok(())
    }

    /// Verifies that every hook without a specification only carries
    /// implementations marked `optional`.
    pub fn check_pending(&self) -> Result<(), PluginValidationError> {
        for caller in self.relay.callers() {
            if caller.has_spec() {
                continue;
            }
            for imp in caller.get_hookimpls() {
                if !imp.config().optional {
                    return Err(PluginValidationError {
                        plugin: imp.plugin_name().to_string(),
                        message: format!("unknown hook '{}'", caller.name()),
                    });
                }
            }
        }
        Ok(())
    }

    // ─── Entry points ────────────────────────────────────────────────────────

    /// Loads and registers plugins from the entry points of `group`.
    ///
    /// Entry points whose name differs from `name` (when given), is already
    /// registered, or is blocked are skipped. Returns the number of plugins
    /// loaded by this call.
    pub fn load_entry_points(
        &self,
        provider: &dyn EntryPoints,
        group: &str,
        name: Option<&str>,
    ) -> Result<usize, RegistryError> {
        let mut count = 0;
        for ep in provider.entry_points(group) {
            if name.is_some_and(|only| only != ep.name)
                || self.get_plugin(&ep.name).is_some()
                || self.is_blocked(&ep.name)
            {
                continue;
            }
            let plugin = (ep.loader)().map_err(|err| RegistryError::EntryPointLoad {
                name: ep.name.clone(),
                reason: err.to_string(),
            })?;
            if self.register(Arc::clone(&plugin), Some(&ep.name))?.is_some() {
                self.registry.write().distinfo.push((plugin, ep.dist));
                count += 1;
                debug!(group, entry_point = %ep.name, "entry-point plugin loaded");
            }
        }
        Ok(count)
    }

    // ─── Introspection ───────────────────────────────────────────────────────

    /// All registered plugins.
    pub fn get_plugins(&self) -> Vec<Arc<dyn Plugin>> {
        self.registry
            .read()
            .plugins
            .values()
            .map(|entry| Arc::clone(&entry.plugin))
            .collect()
    }

    /// Whether the plugin object is registered.
    pub fn is_registered(&self, plugin: &Arc<dyn Plugin>) -> bool {
        self.registry
            .read()
            .plugins
            .contains_key(&PluginId::of(plugin))
    }

    /// The plugin registered under `name`, if any.
    pub fn get_plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.registry.read().names.get(name).cloned().flatten()
    }

    /// Whether a plugin is registered under `name`.
    pub fn has_plugin(&self, name: &str) -> bool {
        self.get_plugin(name).is_some()
    }

    /// The name a registered plugin was registered under.
    pub fn get_name(&self, plugin: &Arc<dyn Plugin>) -> Option<String> {
        self.registry
            .read()
            .plugins
            .get(&PluginId::of(plugin))
            .map(|entry| entry.name.clone())
    }

    /// The name a plugin would be registered under when none is given
    /// explicitly: its own [`plugin_name`](Plugin::plugin_name), or an
    /// identity-derived fallback.
    pub fn get_canonical_name(&self, plugin: &Arc<dyn Plugin>) -> String {
        plugin
            .plugin_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("plugin-{:x}", PluginId::of(plugin).addr()))
    }

    /// `(name, plugin)` pairs for all registered plugins, sorted by name.
    pub fn list_name_plugin(&self) -> Vec<(String, Arc<dyn Plugin>)> {
        let registry = self.registry.read();
        let mut pairs: Vec<_> = registry
            .names
            .iter()
            .filter_map(|(name, plugin)| {
                plugin
                    .as_ref()
                    .map(|plugin| (name.clone(), Arc::clone(plugin)))
            })
            .collect();
        pairs.sort_by(|(a, _), (b, _)| a.cmp(b));
        pairs
    }

    /// `(plugin, distinfo)` pairs for all entry-point-loaded plugins.
    pub fn list_plugin_distinfo(&self) -> Vec<(Arc<dyn Plugin>, DistInfo)> {
        self.registry
            .read()
            .distinfo
            .iter()
            .map(|(plugin, dist)| (Arc::clone(plugin), dist.clone()))
            .collect()
    }

    /// The callers a registered plugin participates in.
    pub fn get_hookcallers(&self, plugin: &Arc<dyn Plugin>) -> Option<Vec<Arc<HookCaller>>> {
        self.registry
            .read()
            .plugins
            .get(&PluginId::of(plugin))
            .map(|entry| entry.callers.clone())
    }

    /// A view of the named caller that skips the given plugins at call
    /// time. The permanent caller is unaffected.
    pub fn subset_hook_caller(
        &self,
        name: &str,
        remove: &[Arc<dyn Plugin>],
    ) -> Option<SubsetHookCaller> {
        self.relay.get(name).map(|caller| caller.subset(remove))
    }

    // ─── Monitoring & tracing ────────────────────────────────────────────────

    /// Installs `before`/`after` observers around every hook dispatch of
    /// this manager.
    ///
    /// `before(hook_name, impls, kwargs)` runs ahead of the dispatch;
    /// `after(outcome, hook_name, impls, kwargs)` receives the captured
    /// [`CallOutcome`] afterwards. The returned guard restores the previous
    /// dispatch function; installations nest and must be undone in reverse
    /// order.
    pub fn add_hookcall_monitoring<B, A>(&self, before: B, after: A) -> MonitoringUndo
    where
        B: Fn(&str, &[Arc<HookImpl>], &Kwargs) + Send + Sync + 'static,
        A: Fn(&CallOutcome, &str, &[Arc<HookImpl>], &Kwargs) + Send + Sync + 'static,
    {
        let prev = self.exec.current();
        let inner = Arc::clone(&prev);
        let wrapped: Arc<ExecFn> =
            Arc::new(move |name, normal, wrappers, kwargs, firstresult| {
                let impls: Vec<Arc<HookImpl>> =
                    normal.iter().chain(wrappers.iter()).cloned().collect();
                before(name, &impls, kwargs);
                let outcome =
                    CallOutcome::from_call(|| inner(name, normal, wrappers, kwargs, firstresult));
                after(&outcome, name, &impls, kwargs);
                outcome.into_result()
            });
        self.exec.set(wrapped);
        MonitoringUndo {
            exec: Arc::clone(&self.exec),
            prev,
        }
    }

    /// Routes every hook call through the manager's [`TagTracer`]: one
    /// indented entry line with the call's arguments, one `finish` line
    /// with the result. Set a writer on [`tracer`](Self::tracer) to see the
    /// output.
    pub fn enable_tracing(&self) -> MonitoringUndo {
        let hooktrace = self.tracer.get("hook");
        let entry_trace = hooktrace.clone();
        self.add_hookcall_monitoring(
            move |hook_name, _impls, kwargs| {
                entry_trace.root().push_indent();
                entry_trace.emit(&[Value::from(hook_name), kwargs.to_value()]);
            },
            move |outcome, hook_name, _impls, _kwargs| {
                if let Ok(result) = outcome.get_result() {
                    hooktrace.emit(&[
                        Value::from("finish"),
                        Value::from(hook_name),
                        Value::from("-->"),
                        result.clone(),
                    ]);
                }
                hooktrace.root().pop_indent();
            },
        )
    }
}

impl fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.read();
        f.debug_struct("PluginManager")
            .field("project", &self.project)
            .field("plugins", &registry.plugins.len())
            .field("hooks", &self.relay.len())
            .finish()
    }
}

/// Guard returned by [`PluginManager::add_hookcall_monitoring`]; restores
/// the previous dispatch function.
#[must_use = "dropping the guard keeps monitoring installed; call undo() to remove it"]
pub struct MonitoringUndo {
    exec: Arc<HookExec>,
    prev: Arc<ExecFn>,
}

impl MonitoringUndo {
    /// Removes the monitoring installed by the call that produced this
    /// guard.
    pub fn undo(self) {
        self.exec.set(self.prev);
    }
}

impl fmt::Debug for MonitoringUndo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitoringUndo").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CallerError, HookCallError};
    use crate::hooks::{HookImplDef, HookSpecDef};
    use crate::kwargs;
    use crate::markers::{HookimplMarker, HookspecMarker};
    use crate::wrapper::FnWrap;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::borrow::Cow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PROJECT: &str = "test";

    struct Namespace {
        label: &'static str,
        defs: Vec<HookSpecDef>,
    }

    impl SpecNamespace for Namespace {
        fn hook_specs(&self) -> Vec<HookSpecDef> {
            self.defs.clone()
        }

        fn namespace_label(&self) -> Cow<'_, str> {
            Cow::Borrowed(self.label)
        }
    }

    struct TestPlugin {
        name: Option<&'static str>,
        defs: Vec<HookImplDef>,
    }

    impl Plugin for TestPlugin {
        fn hook_impls(&self) -> Vec<HookImplDef> {
            self.defs.clone()
        }

        fn plugin_name(&self) -> Option<&str> {
            self.name
        }
    }

    fn plugin(name: &'static str, defs: Vec<HookImplDef>) -> Arc<dyn Plugin> {
        Arc::new(TestPlugin {
            name: Some(name),
            defs,
        })
    }

    fn spec_marker() -> HookspecMarker {
        HookspecMarker::new(PROJECT)
    }

    fn impl_marker() -> HookimplMarker {
        HookimplMarker::new(PROJECT)
    }

    fn greet_specs() -> Namespace {
        Namespace {
            label: "greet-specs",
            defs: vec![spec_marker().hook("greet").args(["name"]).build()],
        }
    }

    #[test]
    fn test_register_and_call() {
        let pm = PluginManager::new(PROJECT);
        pm.add_hookspecs(&greet_specs()).unwrap();
        let p = plugin(
            "p1",
            vec![
                impl_marker()
                    .hook("greet")
                    .args(["name"])
                    .function(|args| Ok(json!(format!("hi {}", args[0].as_str().unwrap())))),
            ],
        );
        let name = pm.register(Arc::clone(&p), None).unwrap();
        assert_eq!(name.as_deref(), Some("p1"));

        let res = pm
            .hook("greet")
            .unwrap()
            .call(&kwargs! { "name" => "bob" })
            .unwrap();
        assert_eq!(res, json!(["hi bob"]));
    }

    #[test]
    fn test_register_unregister_round_trip() {
        let pm = PluginManager::new(PROJECT);
        pm.add_hookspecs(&greet_specs()).unwrap();
        let p = plugin(
            "p1",
            vec![
                impl_marker()
                    .hook("greet")
                    .args(["name"])
                    .function(|_| Ok(json!("x"))),
            ],
        );

        pm.register(Arc::clone(&p), None).unwrap();
        assert!(pm.is_registered(&p));
        assert!(pm.has_plugin("p1"));
        assert_eq!(pm.get_name(&p).as_deref(), Some("p1"));
        assert_eq!(pm.get_hookcallers(&p).unwrap().len(), 1);

        assert_eq!(pm.unregister(&p).as_deref(), Some("p1"));
        assert!(!pm.is_registered(&p));
        assert!(!pm.has_plugin("p1"));
        assert!(pm.get_plugins().is_empty());
        assert!(pm.get_hookcallers(&p).is_none());
        // The caller survives, emptied.
        assert!(pm.hook("greet").unwrap().get_hookimpls().is_empty());
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let pm = PluginManager::new(PROJECT);
        let p = plugin("p1", Vec::new());
        pm.register(Arc::clone(&p), None).unwrap();

        let other = plugin("p1", Vec::new());
        let err = pm.register(other, None).unwrap_err();
        assert!(matches!(err, RegistryError::NameInUse(_)));

        // Same object under a different name is also rejected.
        let err = pm.register(Arc::clone(&p), Some("alias")).unwrap_err();
        assert!(matches!(err, RegistryError::PluginInUse(_)));
    }

    #[test]
    fn test_blocked_name_returns_none() {
        let pm = PluginManager::new(PROJECT);
        pm.set_blocked("banned");
        assert!(pm.is_blocked("banned"));

        let res = pm.register(plugin("banned", Vec::new()), None).unwrap();
        assert!(res.is_none());
        assert!(!pm.has_plugin("banned"));
    }

    #[test]
    fn test_block_unblock_round_trip() {
        let pm = PluginManager::new(PROJECT);
        pm.set_blocked("name");
        assert!(pm.unblock("name"));
        assert!(!pm.is_blocked("name"));
        assert!(!pm.unblock("name"));

        pm.register(plugin("name", Vec::new()), None)
            .unwrap()
            .expect("name usable again");
    }

    #[test]
    fn test_blocking_unregisters_current_holder() {
        let pm = PluginManager::new(PROJECT);
        let p = plugin("p1", Vec::new());
        pm.register(Arc::clone(&p), None).unwrap();

        pm.set_blocked("p1");
        assert!(!pm.is_registered(&p));
        assert!(pm.is_blocked("p1"));
    }

    #[test]
    fn test_canonical_name_fallback() {
        let pm = PluginManager::new(PROJECT);
        let anonymous: Arc<dyn Plugin> = Arc::new(TestPlugin {
            name: None,
            defs: Vec::new(),
        });
        let name = pm.get_canonical_name(&anonymous);
        assert!(name.starts_with("plugin-"));

        let registered = pm.register(Arc::clone(&anonymous), None).unwrap().unwrap();
        assert_eq!(registered, name);
    }

    #[test]
    fn test_impls_from_other_projects_are_invisible() {
        let pm = PluginManager::new(PROJECT);
        pm.add_hookspecs(&greet_specs()).unwrap();
        let foreign = HookimplMarker::new("otherproject")
            .hook("greet")
            .args(["name"])
            .function(|_| Ok(json!("intruder")));
        pm.register(plugin("p1", vec![foreign]), None).unwrap();

        assert!(pm.hook("greet").unwrap().get_hookimpls().is_empty());
    }

    #[test]
    fn test_validation_failure_leaves_manager_unchanged() {
        let pm = PluginManager::new(PROJECT);
        pm.add_hookspecs(&greet_specs()).unwrap();

        // Second def declares an argument the spec does not have; the
        // first def alone would be fine.
        let p = plugin(
            "p1",
            vec![
                impl_marker()
                    .hook("greet")
                    .args(["name"])
                    .function(|_| Ok(json!("ok"))),
                impl_marker()
                    .hook("greet")
                    .args(["name", "shoe_size"])
                    .function(|_| Ok(json!("bad"))),
            ],
        );
        let err = pm.register(Arc::clone(&p), None).unwrap_err();
        assert!(matches!(err, RegistryError::Validation(_)));
        assert!(err.to_string().contains("shoe_size"));

        assert!(!pm.is_registered(&p));
        assert!(pm.get_plugins().is_empty());
        assert!(pm.hook("greet").unwrap().get_hookimpls().is_empty());
    }

    #[test]
    fn test_failed_registration_creates_no_callers() {
        let pm = PluginManager::new(PROJECT);
        pm.add_hookspecs(&greet_specs()).unwrap();

        let p = plugin(
            "p1",
            vec![
                // Unknown hook: would create a fresh caller on commit.
                impl_marker().hook("unseen").function(|_| Ok(json!(1))),
                impl_marker()
                    .hook("greet")
                    .args(["bogus"])
                    .function(|_| Ok(json!(2))),
            ],
        );
        assert!(pm.register(p, None).is_err());
        assert!(pm.hook("unseen").is_none());
    }

    #[test]
    fn test_spec_upgrade_validates_pre_registered_impls() {
        let pm = PluginManager::new(PROJECT);
        let p = plugin(
            "early",
            vec![
                impl_marker()
                    .hook("greet")
                    .args(["name", "mood"])
                    .function(|_| Ok(json!("hm"))),
            ],
        );
        pm.register(p, None).unwrap();

        // The arriving spec does not declare 'mood'.
        let err = pm.add_hookspecs(&greet_specs()).unwrap_err();
        assert!(matches!(err, RegistryError::Validation(_)));
        // Rejected upgrade leaves the caller unspecified.
        assert!(!pm.hook("greet").unwrap().has_spec());
    }

    #[test]
    fn test_repeated_add_hookspecs_rejected_without_change() {
        let pm = PluginManager::new(PROJECT);
        pm.add_hookspecs(&greet_specs()).unwrap();
        let err = pm.add_hookspecs(&greet_specs()).unwrap_err();
        assert!(matches!(err, RegistryError::SpecAlreadySet { .. }));

        // Still exactly one known hook, still specified.
        assert_eq!(pm.relay().names(), ["greet"]);
        assert!(pm.hook("greet").unwrap().has_spec());
    }

    #[test]
    fn test_empty_namespace_rejected() {
        let pm = PluginManager::new(PROJECT);
        let err = pm
            .add_hookspecs(&Namespace {
                label: "empty",
                defs: Vec::new(),
            })
            .unwrap_err();
        assert!(matches!(err, RegistryError::EmptyNamespace(_)));
    }

    #[test]
    fn test_check_pending() {
        let pm = PluginManager::new(PROJECT);
        pm.register(
            plugin(
                "tolerated",
                vec![
                    impl_marker()
                        .hook("unknown_hook")
                        .optional()
                        .function(|_| Ok(json!(1))),
                ],
            ),
            None,
        )
        .unwrap();
        pm.check_pending().unwrap();

        pm.register(
            plugin(
                "strict",
                vec![impl_marker().hook("unknown_hook").function(|_| Ok(json!(2)))],
            ),
            None,
        )
        .unwrap();
        let err = pm.check_pending().unwrap_err();
        assert!(err.message.contains("unknown_hook"));
        assert_eq!(err.plugin, "strict");
    }

    #[test]
    fn test_historic_replay() {
        let pm = PluginManager::new(PROJECT);
        pm.add_hookspecs(&Namespace {
            label: "historic-specs",
            defs: vec![spec_marker().hook("hello").args(["arg"]).historic().build()],
        })
        .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: crate::caller::HookResultCallback =
            Arc::new(move |value| sink.lock().push(value.clone()));

        let hook = pm.hook("hello").unwrap();
        hook.call_historic(Some(callback), kwargs! { "arg" => 1 })
            .unwrap();
        assert!(seen.lock().is_empty());

        pm.register(
            plugin(
                "p1",
                vec![
                    impl_marker()
                        .hook("hello")
                        .args(["arg"])
                        .function(|args| Ok(json!(args[0].as_i64().unwrap() * 10))),
                ],
            ),
            None,
        )
        .unwrap();
        assert_eq!(*seen.lock(), [json!(10)]);

        pm.register(
            plugin(
                "p2",
                vec![
                    impl_marker()
                        .hook("hello")
                        .args(["arg"])
                        .function(|args| Ok(json!(args[0].as_i64().unwrap() + 100))),
                ],
            ),
            None,
        )
        .unwrap();
        assert_eq!(*seen.lock(), [json!(10), json!(101)]);

        // A fresh historic call reaches both implementations.
        let fresh = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fresh);
        let callback: crate::caller::HookResultCallback =
            Arc::new(move |value| sink.lock().push(value.clone()));
        hook.call_historic(Some(callback), kwargs! { "arg" => 2 })
            .unwrap();
        assert_eq!(*fresh.lock(), [json!(102), json!(20)]);
    }

    #[test]
    fn test_historic_rejects_wrapper_registration() {
        let pm = PluginManager::new(PROJECT);
        pm.add_hookspecs(&Namespace {
            label: "historic-specs",
            defs: vec![spec_marker().hook("hello").args(["arg"]).historic().build()],
        })
        .unwrap();

        let p = plugin(
            "wrapping",
            vec![impl_marker().hook("hello").wrapper(|| {
                FnWrap::new(|_args: &[Value]| Ok(()), |_state, outcome| outcome)
            })],
        );
        let err = pm.register(p, None).unwrap_err();
        assert!(err.to_string().contains("historic"));
    }

    #[test]
    fn test_firstresult_pick() {
        let pm = PluginManager::new(PROJECT);
        pm.add_hookspecs(&Namespace {
            label: "pick-specs",
            defs: vec![spec_marker().hook("pick").args(["value"]).firstresult().build()],
        })
        .unwrap();

        let invoked = Arc::new(AtomicUsize::new(0));
        let mut defs = Vec::new();
        // Registered A, B, C: execution order is C, B, A.
        for answer in [json!(null), json!("b"), json!("c")] {
            let counter = Arc::clone(&invoked);
            defs.push(impl_marker().hook("pick").args(["value"]).function(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(answer.clone())
            }));
        }
        // Reverse so that execution order is A(null), B("b"), C("c").
        defs.reverse();
        pm.register(plugin("p1", defs), None).unwrap();

        let res = pm
            .hook("pick")
            .unwrap()
            .call(&kwargs! { "value" => 0 })
            .unwrap();
        assert_eq!(res, json!("b"));
        assert_eq!(invoked.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_subset_hook_caller() {
        let pm = PluginManager::new(PROJECT);
        pm.add_hookspecs(&greet_specs()).unwrap();

        let mut plugins = Vec::new();
        for who in ["p1", "p2", "p3"] {
            let p = plugin(
                who,
                vec![
                    impl_marker()
                        .hook("greet")
                        .args(["name"])
                        .function(move |_| Ok(json!(who))),
                ],
            );
            pm.register(Arc::clone(&p), None).unwrap();
            plugins.push(p);
        }

        let view = pm
            .subset_hook_caller("greet", &plugins[1..2])
            .expect("hook exists");
        let res = view.call(&kwargs! { "name" => "x" }).unwrap();
        assert_eq!(res, json!(["p3", "p1"]));
        assert_eq!(view.get_hookimpls().len(), 2);

        // The permanent caller still sees all three.
        let res = pm
            .hook("greet")
            .unwrap()
            .call(&kwargs! { "name" => "x" })
            .unwrap();
        assert_eq!(res, json!(["p3", "p2", "p1"]));
    }

    #[test]
    fn test_missing_argument_error() {
        let pm = PluginManager::new(PROJECT);
        pm.add_hookspecs(&Namespace {
            label: "pair-specs",
            defs: vec![spec_marker().hook("pair").args(["a", "b"]).build()],
        })
        .unwrap();
        pm.register(
            plugin(
                "p1",
                vec![
                    impl_marker()
                        .hook("pair")
                        .args(["a", "b"])
                        .function(|args| Ok(json!([args[0], args[1]]))),
                ],
            ),
            None,
        )
        .unwrap();

        let err = pm
            .hook("pair")
            .unwrap()
            .call(&kwargs! { "a" => 1 })
            .unwrap_err();
        let err = err.downcast::<HookCallError>().unwrap();
        assert_eq!(err.argname, "b");
    }

    #[test]
    fn test_hookcall_monitoring_and_undo() {
        let pm = PluginManager::new(PROJECT);
        pm.add_hookspecs(&greet_specs()).unwrap();
        pm.register(
            plugin(
                "p1",
                vec![
                    impl_marker()
                        .hook("greet")
                        .args(["name"])
                        .function(|_| Ok(json!("hi"))),
                ],
            ),
            None,
        )
        .unwrap();

        let before_calls = Arc::new(AtomicUsize::new(0));
        let after_calls = Arc::new(AtomicUsize::new(0));
        let before_counter = Arc::clone(&before_calls);
        let after_counter = Arc::clone(&after_calls);

        let undo = pm.add_hookcall_monitoring(
            move |hook_name, impls, kwargs| {
                assert_eq!(hook_name, "greet");
                assert_eq!(impls.len(), 1);
                assert!(kwargs.contains("name"));
                before_counter.fetch_add(1, Ordering::SeqCst);
            },
            move |outcome, _hook_name, _impls, _kwargs| {
                assert_eq!(outcome.result(), Some(&json!(["hi"])));
                after_counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        let hook = pm.hook("greet").unwrap();
        hook.call(&kwargs! { "name" => "a" }).unwrap();
        assert_eq!(before_calls.load(Ordering::SeqCst), 1);
        assert_eq!(after_calls.load(Ordering::SeqCst), 1);

        undo.undo();
        hook.call(&kwargs! { "name" => "a" }).unwrap();
        assert_eq!(before_calls.load(Ordering::SeqCst), 1);
        assert_eq!(after_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_enable_tracing_output() {
        let pm = PluginManager::new(PROJECT);
        pm.add_hookspecs(&greet_specs()).unwrap();
        pm.register(
            plugin(
                "p1",
                vec![
                    impl_marker()
                        .hook("greet")
                        .args(["name"])
                        .function(|args| Ok(json!(format!("hi {}", args[0].as_str().unwrap())))),
                ],
            ),
            None,
        )
        .unwrap();

        let buffer = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&buffer);
        pm.tracer().set_writer(Some(Box::new(move |message| {
            sink.lock().push_str(message);
        })));

        let undo = pm.enable_tracing();
        pm.hook("greet")
            .unwrap()
            .call(&kwargs! { "name" => "bob" })
            .unwrap();
        undo.undo();

        assert_eq!(
            *buffer.lock(),
            "  greet [hook]\n      name: bob\n  finish greet --> [\"hi bob\"] [hook]\n"
        );
        assert_eq!(pm.tracer().indent(), 0);
    }

    #[test]
    fn test_load_entry_points() {
        struct Provider;

        impl EntryPoints for Provider {
            fn entry_points(&self, group: &str) -> Vec<crate::entrypoints::EntryPoint> {
                if group != "test.plugins" {
                    return Vec::new();
                }
                ["alpha", "beta", "gamma"]
                    .into_iter()
                    .map(|name| crate::entrypoints::EntryPoint {
                        name: name.to_string(),
                        dist: DistInfo {
                            project_name: format!("dist-{name}"),
                            version: "1.0.0".into(),
                        },
                        loader: Box::new(move || {
                            Ok(Arc::new(TestPlugin {
                                name: None,
                                defs: Vec::new(),
                            }) as Arc<dyn Plugin>)
                        }),
                    })
                    .collect()
            }
        }

        let pm = PluginManager::new(PROJECT);
        pm.set_blocked("beta");
        pm.register(plugin("gamma", Vec::new()), None).unwrap();

        let count = pm
            .load_entry_points(&Provider, "test.plugins", None)
            .unwrap();
        assert_eq!(count, 1);
        assert!(pm.has_plugin("alpha"));

        let distinfo = pm.list_plugin_distinfo();
        assert_eq!(distinfo.len(), 1);
        assert_eq!(distinfo[0].1.project_name, "dist-alpha");

        // Nothing new on a second pass.
        let count = pm
            .load_entry_points(&Provider, "test.plugins", None)
            .unwrap();
        assert_eq!(count, 0);

        // Name filter only matches one entry (already loaded).
        let count = pm
            .load_entry_points(&Provider, "test.plugins", Some("alpha"))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_specname_matches_other_hook() {
        let pm = PluginManager::new(PROJECT);
        pm.add_hookspecs(&greet_specs()).unwrap();
        pm.register(
            plugin(
                "p1",
                vec![
                    impl_marker()
                        .hook("greet_politely")
                        .specname("greet")
                        .args(["name"])
                        .function(|_| Ok(json!("good day"))),
                ],
            ),
            None,
        )
        .unwrap();

        let res = pm
            .hook("greet")
            .unwrap()
            .call(&kwargs! { "name" => "x" })
            .unwrap();
        assert_eq!(res, json!(["good day"]));
        assert!(pm.hook("greet_politely").is_none());
    }

    #[test]
    fn test_list_name_plugin_sorted() {
        let pm = PluginManager::new(PROJECT);
        pm.register(plugin("zeta", Vec::new()), None).unwrap();
        pm.register(plugin("alpha", Vec::new()), None).unwrap();
        pm.set_blocked("hidden");

        let names: Vec<_> = pm
            .list_name_plugin()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, ["alpha", "zeta"]);
    }

    #[test]
    fn test_register_during_historic_dispatch() {
        // A replayed implementation registering another plugin must not
        // deadlock, and the nested registrant sees the history too.
        let pm = Arc::new(PluginManager::new(PROJECT));
        pm.add_hookspecs(&Namespace {
            label: "historic-specs",
            defs: vec![spec_marker().hook("hello").args(["arg"]).historic().build()],
        })
        .unwrap();

        pm.hook("hello")
            .unwrap()
            .call_historic(None, kwargs! { "arg" => 7 })
            .unwrap();

        let nested_seen = Arc::new(Mutex::new(Vec::new()));
        let inner_sink = Arc::clone(&nested_seen);
        let inner = plugin(
            "inner",
            vec![impl_marker().hook("hello").args(["arg"]).function(move |args| {
                inner_sink.lock().push(args[0].clone());
                Ok(Value::Null)
            })],
        );

        let manager = Arc::clone(&pm);
        let outer = plugin(
            "outer",
            vec![impl_marker().hook("hello").args(["arg"]).function(move |_| {
                manager.register(Arc::clone(&inner), None).unwrap();
                Ok(Value::Null)
            })],
        );

        pm.register(outer, None).unwrap();
        // The outer replay registered 'inner', whose own replay saw arg=7.
        assert!(pm.has_plugin("inner"));
        assert_eq!(*nested_seen.lock(), [json!(7)]);
    }

    #[test]
    fn test_warning_diagnostics() {
        struct Capture(Arc<Mutex<Vec<u8>>>);

        impl std::io::Write for Capture {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || Capture(Arc::clone(&sink)))
            .with_max_level(tracing::Level::WARN)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let pm = PluginManager::new(PROJECT);
            pm.add_hookspecs(&Namespace {
                label: "warny-specs",
                defs: vec![
                    spec_marker()
                        .hook("legacy")
                        .args(["a", "b"])
                        .warn_on_impl("legacy hook, migrate to 'modern'")
                        .warn_on_impl_arg("b", "argument 'b' is going away")
                        .build(),
                ],
            })
            .unwrap();

            pm.register(
                plugin(
                    "p1",
                    vec![
                        impl_marker()
                            .hook("legacy")
                            .args(["b"])
                            .function(|_| Ok(json!(1))),
                    ],
                ),
                None,
            )
            .unwrap();

            // 'a' is declared in the spec but missing from the call; the
            // call still proceeds since no implementation extracts it.
            pm.hook("legacy")
                .unwrap()
                .call(&kwargs! { "b" => 2 })
                .unwrap();
        });

        let output = String::from_utf8(buffer.lock().clone()).unwrap();
        assert!(output.contains("legacy hook, migrate to 'modern'"));
        assert!(output.contains("argument 'b' is going away"));
        assert!(output.contains("missing an argument"));
    }

    #[test]
    fn test_subset_view_errors_on_historic_misuse() {
        let pm = PluginManager::new(PROJECT);
        pm.add_hookspecs(&greet_specs()).unwrap();
        let view = pm.subset_hook_caller("greet", &[]).unwrap();
        let err = view.call_historic(None, Kwargs::new()).unwrap_err();
        let err = err.downcast::<CallerError>().unwrap();
        assert!(matches!(*err, CallerError::NotHistoric(_)));
    }
}
