//! Per-hook callers: the objects that own implementation chains and drive
//! dispatch.
//!
//! One [`HookCaller`] exists per hook name per manager, shared as `Arc` so
//! hosts can hold it across registrations. A caller is in one of four modes
//! derived from its (optional) specification: *unspecified* (accumulating
//! implementations before any spec arrives), *normal*, *firstresult*, or
//! *historic*. Attaching a specification upgrades the caller in place, so
//! handles acquired earlier stay valid.
//!
//! # Ordering
//!
//! Each caller keeps normal and wrapping implementations in separate lists,
//! both arranged `[trylast…, plain…, tryfirst…]` and executed in reverse
//! list order. Within one priority class, list positions follow
//! registration order, which makes execution within a class last-registered
//! first and puts `tryfirst` implementations before plain ones, plain ones
//! before `trylast`.
//!
//! # Reentrancy
//!
//! Calls snapshot the implementation lists under a short lock and dispatch
//! outside it, so a plugin may register further plugins (mutating this very
//! caller) while a call is in flight without corrupting the iteration.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{BoxError, CallerError, PluginValidationError, RegistryError};
use crate::hooks::{ExtraHook, HookImpl, HookSpec};
use crate::kwargs::Kwargs;
use crate::multicall::HookExec;
use crate::plugin::{Plugin, PluginId};

/// Callback invoked once per non-null result of a historic call.
pub type HookResultCallback = Arc<dyn Fn(&Value) + Send + Sync>;

type CallHistory = Vec<(Kwargs, Option<HookResultCallback>)>;

// ─── HookCaller ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct CallerInner {
    spec: Option<HookSpec>,
    normal: Vec<Arc<HookImpl>>,
    wrappers: Vec<Arc<HookImpl>>,
    history: CallHistory,
}

/// A caller of all registered implementations of one hook.
pub struct HookCaller {
    name: String,
    exec: Arc<HookExec>,
    inner: RwLock<CallerInner>,
}

impl HookCaller {
    pub(crate) fn new(name: impl Into<String>, exec: Arc<HookExec>) -> Self {
        Self {
            name: name.into(),
            exec,
            inner: RwLock::new(CallerInner::default()),
        }
    }

    pub(crate) fn with_spec(spec: HookSpec, exec: Arc<HookExec>) -> Self {
        let caller = Self::new(spec.name().to_string(), exec);
        caller.inner.write().spec = Some(spec);
        caller
    }

    /// Name of the hook this caller dispatches.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The attached specification, if any.
    pub fn spec(&self) -> Option<HookSpec> {
        self.inner.read().spec.clone()
    }

    /// Whether a specification has been attached.
    pub fn has_spec(&self) -> bool {
        self.inner.read().spec.is_some()
    }

    /// Whether this caller memorizes and replays calls.
    pub fn is_historic(&self) -> bool {
        self.inner
            .read()
            .spec
            .as_ref()
            .is_some_and(|spec| spec.config().historic)
    }

    /// All registered implementations, in list order (normal
    /// implementations first, then wrappers).
    pub fn get_hookimpls(&self) -> Vec<Arc<HookImpl>> {
        let inner = self.inner.read();
        inner
            .normal
            .iter()
            .chain(inner.wrappers.iter())
            .cloned()
            .collect()
    }

    /// Number of memorized calls (always zero for non-historic callers).
    pub fn history_len(&self) -> usize {
        self.inner.read().history.len()
    }

    /// Attaches a specification, upgrading an unspecified caller in place.
    ///
    /// Fails when a specification is already attached, when the
    /// configuration is self-contradictory, or when a historic
    /// specification meets already-registered wrapper implementations.
    pub fn set_specification(&self, spec: HookSpec) -> Result<(), RegistryError> {
        spec.config()
            .validate()
            .map_err(|err| RegistryError::InvalidConfig {
                name: self.name.clone(),
                reason: err.to_string(),
            })?;
        let mut inner = self.inner.write();
        if let Some(existing) = &inner.spec {
            return Err(RegistryError::SpecAlreadySet {
                name: self.name.clone(),
                namespace: existing.namespace().to_string(),
            });
        }
        if spec.config().historic
            && let Some(wrapper) = inner.wrappers.first()
        {
            return Err(PluginValidationError {
                plugin: wrapper.plugin_name().to_string(),
                message: format!(
                    "hook '{}' is historic and cannot be wrapped",
                    self.name
                ),
            }
            .into());
        }
        inner.spec = Some(spec);
        Ok(())
    }

    pub(crate) fn add_hookimpl(&self, imp: Arc<HookImpl>) {
        let mut inner = self.inner.write();
        let list = if imp.is_wrapper() {
            &mut inner.wrappers
        } else {
            &mut inner.normal
        };
        insert_ordered(list, imp);
    }

    /// Removes every implementation contributed by the given plugin.
    pub(crate) fn remove_plugin(&self, id: PluginId) {
        let matches = |imp: &Arc<HookImpl>| {
            imp.plugin()
                .is_some_and(|plugin| PluginId::of(plugin) == id)
        };
        let mut inner = self.inner.write();
        inner.normal.retain(|imp| !matches(imp));
        inner.wrappers.retain(|imp| !matches(imp));
    }

    /// Calls the hook with the given keyword arguments.
    ///
    /// Returns the aggregate the outermost wrapper leaves behind: nominally
    /// a list of non-null results, or in firstresult mode the first
    /// non-null result (`Null` when none).
    pub fn call(&self, kwargs: &Kwargs) -> Result<Value, BoxError> {
        let (spec, normal, wrappers) = {
            let inner = self.inner.read();
            if let Some(spec) = &inner.spec
                && spec.config().historic
            {
                return Err(Box::new(CallerError::HistoricDirectCall(self.name.clone())));
            }
            (
                inner.spec.clone(),
                inner.normal.clone(),
                inner.wrappers.clone(),
            )
        };
        if let Some(spec) = &spec {
            spec.warn_missing_call_args(kwargs);
        }
        let firstresult = spec.is_some_and(|spec| spec.config().firstresult);
        self.exec
            .run(&self.name, &normal, &wrappers, kwargs, firstresult)
    }

    /// Calls a historic hook: memorizes the call, dispatches it to the
    /// currently registered implementations, and replays it on every
    /// implementation registered later.
    ///
    /// The history entry is recorded before dispatch, so plugins registered
    /// *during* the dispatch also see the call. When a callback is given it
    /// is invoked once per non-null result.
    pub fn call_historic(
        &self,
        callback: Option<HookResultCallback>,
        kwargs: Kwargs,
    ) -> Result<(), BoxError> {
        let spec = {
            let inner = self.inner.read();
            match &inner.spec {
                Some(spec) if spec.config().historic => spec.clone(),
                _ => return Err(Box::new(CallerError::NotHistoric(self.name.clone()))),
            }
        };
        spec.warn_missing_call_args(&kwargs);
        let normal = {
            let mut inner = self.inner.write();
            inner.history.push((kwargs.clone(), callback.clone()));
            inner.normal.clone()
        };
        let res = self.exec.run(&self.name, &normal, &[], &kwargs, false)?;
        if let (Some(callback), Value::Array(values)) = (callback, res) {
            for value in &values {
                callback(value);
            }
        }
        Ok(())
    }

    /// Calls the hook as if the given methods were registered as plain
    /// implementations, for this one call only.
    pub fn call_extra(&self, methods: Vec<ExtraHook>, kwargs: &Kwargs) -> Result<Value, BoxError> {
        let (spec, mut normal, wrappers) = {
            let inner = self.inner.read();
            if let Some(spec) = &inner.spec
                && spec.config().historic
            {
                return Err(Box::new(CallerError::HistoricCallExtra(self.name.clone())));
            }
            (
                inner.spec.clone(),
                inner.normal.clone(),
                inner.wrappers.clone(),
            )
        };
        if let Some(spec) = &spec {
            spec.warn_missing_call_args(kwargs);
        }
        for method in methods {
            insert_ordered(&mut normal, Arc::new(method.into_impl()));
        }
        let firstresult = spec.is_some_and(|spec| spec.config().firstresult);
        self.exec
            .run(&self.name, &normal, &wrappers, kwargs, firstresult)
    }

    /// Returns a read-only view of this caller that skips every
    /// implementation contributed by the given plugins.
    pub fn subset(self: &Arc<Self>, remove: &[Arc<dyn Plugin>]) -> SubsetHookCaller {
        SubsetHookCaller {
            orig: Arc::clone(self),
            removed: remove.iter().map(PluginId::of).collect(),
        }
    }

    /// Replays the memorized calls onto one newly added implementation.
    pub(crate) fn apply_history(&self, imp: &Arc<HookImpl>) -> Result<(), BoxError> {
        let history = self.inner.read().history.clone();
        let chain = [Arc::clone(imp)];
        for (kwargs, callback) in history {
            let res = self.exec.run(&self.name, &chain, &[], &kwargs, false)?;
            if let (Some(callback), Value::Array(values)) = (callback, res)
                && let Some(first) = values.first()
            {
                callback(first);
            }
        }
        Ok(())
    }

    fn snapshot_filtered(
        &self,
        removed: &HashSet<PluginId>,
    ) -> (Option<HookSpec>, Vec<Arc<HookImpl>>, Vec<Arc<HookImpl>>) {
        let keep = |imp: &&Arc<HookImpl>| {
            imp.plugin()
                .is_none_or(|plugin| !removed.contains(&PluginId::of(plugin)))
        };
        let inner = self.inner.read();
        (
            inner.spec.clone(),
            inner.normal.iter().filter(keep).cloned().collect(),
            inner.wrappers.iter().filter(keep).cloned().collect(),
        )
    }
}

impl fmt::Debug for HookCaller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("HookCaller")
            .field("name", &self.name)
            .field("has_spec", &inner.spec.is_some())
            .field("normal", &inner.normal.len())
            .field("wrappers", &inner.wrappers.len())
            .finish()
    }
}

/// Maintains the `[trylast…, plain…, tryfirst…]` arrangement; within one
/// priority class, positions follow registration order.
fn insert_ordered(list: &mut Vec<Arc<HookImpl>>, imp: Arc<HookImpl>) {
    let config = imp.config();
    let index = if config.trylast {
        list.iter().take_while(|m| m.config().trylast).count()
    } else if config.tryfirst {
        list.len()
    } else {
        let mut i = list.len();
        while i > 0 && list[i - 1].config().tryfirst {
            i -= 1;
        }
        i
    };
    list.insert(index, imp);
}

// ─── SubsetHookCaller ─────────────────────────────────────────────────────────

/// A read-only proxy to a [`HookCaller`] that filters out a fixed set of
/// plugins at call time.
///
/// The underlying caller is untouched: implementations registered after the
/// proxy was created show through it (minus the filtered plugins), and the
/// proxy never mutates the chain or the specification.
#[derive(Clone)]
pub struct SubsetHookCaller {
    orig: Arc<HookCaller>,
    removed: HashSet<PluginId>,
}

impl SubsetHookCaller {
    /// Name of the underlying hook.
    pub fn name(&self) -> &str {
        self.orig.name()
    }

    /// The underlying specification, if any.
    pub fn spec(&self) -> Option<HookSpec> {
        self.orig.spec()
    }

    /// Whether the underlying caller has a specification.
    pub fn has_spec(&self) -> bool {
        self.orig.has_spec()
    }

    /// Whether the underlying caller is historic.
    pub fn is_historic(&self) -> bool {
        self.orig.is_historic()
    }

    /// The registered implementations minus the filtered plugins.
    pub fn get_hookimpls(&self) -> Vec<Arc<HookImpl>> {
        let (_, normal, wrappers) = self.orig.snapshot_filtered(&self.removed);
        normal.into_iter().chain(wrappers).collect()
    }

    /// Subset views are read-only; attaching a specification through one is
    /// always an error.
    pub fn set_specification(&self, _spec: HookSpec) -> Result<(), CallerError> {
        Err(CallerError::SubsetSpecMutation(self.orig.name().to_string()))
    }

    /// Calls the hook with the filtered implementation chain.
    pub fn call(&self, kwargs: &Kwargs) -> Result<Value, BoxError> {
        if self.is_historic() {
            return Err(Box::new(CallerError::HistoricDirectCall(
                self.orig.name().to_string(),
            )));
        }
        let (spec, normal, wrappers) = self.orig.snapshot_filtered(&self.removed);
        if let Some(spec) = &spec {
            spec.warn_missing_call_args(kwargs);
        }
        let firstresult = spec.is_some_and(|spec| spec.config().firstresult);
        self.orig
            .exec
            .run(self.orig.name(), &normal, &wrappers, kwargs, firstresult)
    }

    /// Historic call through the subset view: the entry lands in the
    /// underlying caller's history, but only the filtered chain runs now.
    pub fn call_historic(
        &self,
        callback: Option<HookResultCallback>,
        kwargs: Kwargs,
    ) -> Result<(), BoxError> {
        if !self.is_historic() {
            return Err(Box::new(CallerError::NotHistoric(
                self.orig.name().to_string(),
            )));
        }
        let (spec, normal, _) = self.orig.snapshot_filtered(&self.removed);
        if let Some(spec) = &spec {
            spec.warn_missing_call_args(&kwargs);
        }
        self.orig
            .inner
            .write()
            .history
            .push((kwargs.clone(), callback.clone()));
        let res = self
            .orig
            .exec
            .run(self.orig.name(), &normal, &[], &kwargs, false)?;
        if let (Some(callback), Value::Array(values)) = (callback, res) {
            for value in &values {
                callback(value);
            }
        }
        Ok(())
    }

    /// `call_extra` over the filtered chain.
    pub fn call_extra(&self, methods: Vec<ExtraHook>, kwargs: &Kwargs) -> Result<Value, BoxError> {
        if self.is_historic() {
            return Err(Box::new(CallerError::HistoricCallExtra(
                self.orig.name().to_string(),
            )));
        }
        let (spec, mut normal, wrappers) = self.orig.snapshot_filtered(&self.removed);
        if let Some(spec) = &spec {
            spec.warn_missing_call_args(kwargs);
        }
        for method in methods {
            insert_ordered(&mut normal, Arc::new(method.into_impl()));
        }
        let firstresult = spec.is_some_and(|spec| spec.config().firstresult);
        self.orig
            .exec
            .run(self.orig.name(), &normal, &wrappers, kwargs, firstresult)
    }
}

impl fmt::Debug for SubsetHookCaller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubsetHookCaller")
            .field("name", &self.orig.name())
            .field("removed", &self.removed.len())
            .finish()
    }
}

// ─── HookRelay ────────────────────────────────────────────────────────────────

/// Name-indexed container of hook callers: the surface through which hosts
/// invoke hooks.
#[derive(Default)]
pub struct HookRelay {
    hooks: RwLock<HashMap<String, Arc<HookCaller>>>,
}

impl HookRelay {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Looks up the caller for a hook name.
    pub fn get(&self, name: &str) -> Option<Arc<HookCaller>> {
        self.hooks.read().get(name).cloned()
    }

    /// All known hook names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.hooks.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// All callers, in name order.
    pub fn callers(&self) -> Vec<Arc<HookCaller>> {
        let hooks = self.hooks.read();
        let mut entries: Vec<_> = hooks.iter().collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries.into_iter().map(|(_, c)| Arc::clone(c)).collect()
    }

    /// Number of known hooks.
    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    /// Whether no hooks are known yet.
    pub fn is_empty(&self) -> bool {
        self.hooks.read().is_empty()
    }

    pub(crate) fn insert(&self, caller: Arc<HookCaller>) {
        self.hooks
            .write()
            .insert(caller.name().to_string(), caller);
    }

    pub(crate) fn get_or_insert(&self, name: &str, exec: &Arc<HookExec>) -> Arc<HookCaller> {
        let mut hooks = self.hooks.write();
        hooks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(HookCaller::new(name, Arc::clone(exec))))
            .clone()
    }
}

impl fmt::Debug for HookRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRelay")
            .field("hooks", &self.names())
            .finish()
    }
}
