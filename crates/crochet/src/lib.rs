//! # crochet
//!
//! A plugin and hook dispatch engine: the host declares named extension
//! points ("hook specifications"), independently authored plugins
//! contribute named "hook implementations", and invoking an extension
//! point calls every matching implementation in a deterministic,
//! configurable order.
//!
//! The engine provides:
//! - A name-keyed [`PluginManager`] registry with blocking, validation
//!   against specifications, and entry-point discovery
//! - Ordered dispatch chains honoring `tryfirst`/`trylast` priorities
//! - Wrapping implementations that pause around the inner chain and may
//!   observe, replace, or suppress its outcome
//! - `firstresult` short-circuit dispatch and `historic` calls replayed
//!   onto plugins registered later
//! - Hook-call monitoring and tagged tracing around every dispatch
//!
//! Dispatch is single-threaded and cooperative: all work happens on the
//! calling thread, and the only suspension points are the wrappers' own.
//!
//! # Getting started
//!
//! ```
//! use crochet::{HookimplMarker, HookspecMarker, HookImplDef, HookSpecDef};
//! use crochet::{Plugin, PluginManager, SpecNamespace, json, kwargs};
//! use std::sync::Arc;
//!
//! struct Specs;
//! impl SpecNamespace for Specs {
//!     fn hook_specs(&self) -> Vec<HookSpecDef> {
//!         vec![
//!             HookspecMarker::new("demo")
//!                 .hook("on_save")
//!                 .args(["path"])
//!                 .build(),
//!         ]
//!     }
//! }
//!
//! struct Backup;
//! impl Plugin for Backup {
//!     fn hook_impls(&self) -> Vec<HookImplDef> {
//!         vec![
//!             HookimplMarker::new("demo")
//!                 .hook("on_save")
//!                 .args(["path"])
//!                 .function(|args| Ok(json!(format!("backed up {}", args[0].as_str().unwrap())))),
//!         ]
//!     }
//!     fn plugin_name(&self) -> Option<&str> {
//!         Some("backup")
//!     }
//! }
//!
//! let pm = PluginManager::new("demo");
//! pm.add_hookspecs(&Specs).unwrap();
//! pm.register(Arc::new(Backup), None).unwrap();
//!
//! let results = pm.hook("on_save").unwrap().call(&kwargs! { "path" => "a.txt" }).unwrap();
//! assert_eq!(results, json!(["backed up a.txt"]));
//! ```

pub mod caller;
pub mod config;
pub mod entrypoints;
pub mod error;
pub mod hooks;
pub mod kwargs;
pub mod manager;
pub mod markers;
mod multicall;
pub mod outcome;
pub mod plugin;
pub mod signature;
pub mod trace;
pub mod wrapper;

pub use caller::{HookCaller, HookRelay, HookResultCallback, SubsetHookCaller};
pub use config::{ImplConfig, Project, SpecConfig};
pub use entrypoints::{
    DistInfo, EntryPoint, EntryPoints, STATIC_ENTRY_POINTS, StaticEntryPoint, StaticEntryPoints,
};
pub use error::{
    BoxError, CallerError, ConfigError, HookCallError, PluginValidationError, RegistryError,
    WrapperProblem, WrapperProtocolError,
};
pub use hooks::{ExtraHook, HookFn, HookImpl, HookImplDef, HookSpec, HookSpecDef, ImplKind};
pub use kwargs::Kwargs;
pub use manager::{MonitoringUndo, PluginManager};
pub use markers::{HookimplMarker, HookspecMarker, ImplBuilder, SpecBuilder};
pub use outcome::CallOutcome;
pub use plugin::{Plugin, PluginId, SpecNamespace};
pub use signature::Signature;
pub use trace::{TagTracer, TagTracerSub, TraceProcessor, TraceWriter};
pub use wrapper::{
    FnOutcomeWrap, FnWrap, OutcomeController, OutcomeWrapFactory, WrapController, WrapFactory,
    WrapFlow,
};

/// Hook argument and result values.
pub use serde_json::Value;

/// Re-export of [`serde_json::json`] for building hook values; the
/// [`kwargs!`] macro routes through it.
pub use serde_json::json;
