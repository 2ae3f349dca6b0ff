//! Entry-point discovery: loading plugins from outside the host's own code.
//!
//! The engine only depends on the contract: something can enumerate
//! `(name, loader, distribution)` triples for a named group. The
//! [`EntryPoints`] trait is that contract;
//! [`PluginManager::load_entry_points`](crate::manager::PluginManager::load_entry_points)
//! consumes it.
//!
//! A built-in provider, [`StaticEntryPoints`], enumerates the
//! [`STATIC_ENTRY_POINTS`] distributed slice: any crate linked into the
//! final binary can contribute plugins at link time by adding an entry to
//! the slice, no central registration list required.
//!
//! ```rust,ignore
//! use crochet::{STATIC_ENTRY_POINTS, StaticEntryPoint};
//! use linkme::distributed_slice;
//!
//! #[distributed_slice(STATIC_ENTRY_POINTS)]
//! static SPELLCHECK: StaticEntryPoint = StaticEntryPoint {
//!     group: "editor.plugins",
//!     name: "spellcheck",
//!     dist_name: "editor-spellcheck",
//!     dist_version: "1.4.2",
//!     load: || Ok(std::sync::Arc::new(SpellcheckPlugin::default())),
//! };
//! ```

use std::fmt;
use std::sync::Arc;

use linkme::distributed_slice;
use serde::{Deserialize, Serialize};

use crate::error::BoxError;
use crate::plugin::Plugin;

/// Distribution metadata for an entry-point-loaded plugin.
///
/// An opaque facade: the engine stores it and hands it back through
/// [`list_plugin_distinfo`](crate::manager::PluginManager::list_plugin_distinfo)
/// without interpreting anything beyond `project_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistInfo {
    /// Name of the distribution that shipped the plugin.
    pub project_name: String,
    /// Version of that distribution.
    pub version: String,
}

/// One discoverable plugin: a name, its distribution, and a loader.
pub struct EntryPoint {
    /// Registration name for the loaded plugin.
    pub name: String,
    /// Distribution metadata recorded alongside the plugin.
    pub dist: DistInfo,
    /// Produces the plugin; invoked at most once, and only when the entry
    /// point is not filtered out.
    pub loader: Box<dyn FnOnce() -> Result<Arc<dyn Plugin>, BoxError> + Send>,
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPoint")
            .field("name", &self.name)
            .field("dist", &self.dist)
            .finish_non_exhaustive()
    }
}

/// Enumerates the entry points of a named group.
pub trait EntryPoints {
    /// All entry points registered under `group`.
    fn entry_points(&self, group: &str) -> Vec<EntryPoint>;
}

// ─── Link-time registry ───────────────────────────────────────────────────────

/// A statically registered entry point, suitable for `static` items.
#[derive(Debug)]
pub struct StaticEntryPoint {
    /// Group the entry point belongs to.
    pub group: &'static str,
    /// Registration name for the loaded plugin.
    pub name: &'static str,
    /// Name of the distribution that ships the plugin.
    pub dist_name: &'static str,
    /// Version of that distribution.
    pub dist_version: &'static str,
    /// Produces the plugin.
    pub load: fn() -> Result<Arc<dyn Plugin>, BoxError>,
}

/// Registry of statically declared entry points, populated at link time.
#[distributed_slice]
pub static STATIC_ENTRY_POINTS: [StaticEntryPoint];

/// [`EntryPoints`] provider over [`STATIC_ENTRY_POINTS`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticEntryPoints;

impl EntryPoints for StaticEntryPoints {
    fn entry_points(&self, group: &str) -> Vec<EntryPoint> {
        STATIC_ENTRY_POINTS
            .iter()
            .filter(|ep| ep.group == group)
            .map(|ep| EntryPoint {
                name: ep.name.to_string(),
                dist: DistInfo {
                    project_name: ep.dist_name.to_string(),
                    version: ep.dist_version.to_string(),
                },
                loader: Box::new(ep.load),
            })
            .collect()
    }
}
