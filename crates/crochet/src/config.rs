//! Configuration value records for hook specifications and implementations.
//!
//! These records are normally produced by the marker builders in
//! [`markers`](crate::markers); they are plain data so hosts with their own
//! discovery schemes can also construct them directly. Hand-built records
//! are re-validated by the [`PluginManager`](crate::manager::PluginManager)
//! on registration.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ─── Project ──────────────────────────────────────────────────────────────────

/// Short project name that namespaces a plugin system.
///
/// Markers stamp the project into every definition they build, and a
/// [`PluginManager`](crate::manager::PluginManager) only sees definitions
/// stamped with its own project. This lets several independent plugin
/// systems coexist in one process without their hooks colliding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Project(Cow<'static, str>);

impl Project {
    /// Creates a project from its short name.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Returns the project name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for Project {
    fn from(name: &'static str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Project {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── SpecConfig ───────────────────────────────────────────────────────────────

/// Dispatch options attached to a hook specification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecConfig {
    /// Stop at the first non-null result instead of collecting all results.
    pub firstresult: bool,

    /// Memorize every call and replay it on implementations registered
    /// later. Historic hooks cannot be called directly and do not accept
    /// wrapping implementations.
    pub historic: bool,

    /// Diagnostic emitted whenever any implementation of this hook is
    /// registered.
    pub warn_on_impl: Option<String>,

    /// Per-argument diagnostics, emitted when an implementation declares
    /// the named argument.
    #[serde(default)]
    pub warn_on_impl_args: BTreeMap<String, String>,
}

impl SpecConfig {
    /// Rejects contradictory option combinations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.historic && self.firstresult {
            return Err(ConfigError::HistoricFirstResult);
        }
        Ok(())
    }
}

// ─── ImplConfig ───────────────────────────────────────────────────────────────

/// Dispatch options attached to a hook implementation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplConfig {
    /// The implementation wraps the rest of the chain (new style: it
    /// consumes the inner outcome and finishes with a replacement).
    pub wrapper: bool,

    /// The implementation wraps the rest of the chain (old style: it
    /// receives a [`CallOutcome`](crate::outcome::CallOutcome) envelope and
    /// mutates it in place). Mutually exclusive with `wrapper`.
    pub outcome_wrapper: bool,

    /// Tolerate the absence of a matching specification.
    pub optional: bool,

    /// Order this implementation towards the front of the execution order.
    pub tryfirst: bool,

    /// Order this implementation towards the back of the execution order.
    pub trylast: bool,

    /// Match against this specification name instead of the definition's
    /// own name.
    pub specname: Option<String>,
}

impl ImplConfig {
    /// Whether either wrapping style is requested.
    pub fn is_wrapper(&self) -> bool {
        self.wrapper || self.outcome_wrapper
    }

    /// Rejects contradictory option combinations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wrapper && self.outcome_wrapper {
            return Err(ConfigError::DoubleWrapper);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_display() {
        let project = Project::new("eggsample");
        assert_eq!(project.to_string(), "eggsample");
        assert_eq!(project.name(), "eggsample");
    }

    #[test]
    fn test_historic_firstresult_rejected() {
        let config = SpecConfig {
            firstresult: true,
            historic: true,
            ..SpecConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::HistoricFirstResult));
    }

    #[test]
    fn test_default_spec_config_is_valid() {
        assert!(SpecConfig::default().validate().is_ok());
    }

    #[test]
    fn test_double_wrapper_rejected() {
        let config = ImplConfig {
            wrapper: true,
            outcome_wrapper: true,
            ..ImplConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::DoubleWrapper));
        assert!(config.is_wrapper());
    }
}
