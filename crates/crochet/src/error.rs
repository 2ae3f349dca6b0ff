//! Error types for the crochet engine.
//!
//! Three categories flow through the crate:
//!
//! - **Validation errors** ([`PluginValidationError`], [`RegistryError`]) are
//!   raised by registration-time checks and leave the manager unchanged for
//!   the plugin or namespace that failed.
//! - **Dispatch-contract errors** ([`HookCallError`],
//!   [`WrapperProtocolError`]) surface through the normal call path and are
//!   observable by wrapper teardowns like any other call failure.
//! - **Plugin failures** are arbitrary [`BoxError`] values returned by hook
//!   implementations; the engine never interprets them, it only threads them
//!   through wrapper teardowns to the host.

use std::fmt;
use std::panic::Location;

use thiserror::Error;

/// Boxed error type carried through hook dispatch.
///
/// Hook implementations report failure by returning any error boxed into
/// this type; wrappers observe, replace, or suppress it during teardown.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A hook was called without an argument its implementations require.
#[derive(Debug, Clone, Error)]
#[error("hook call must provide argument '{argname}'")]
pub struct HookCallError {
    /// Name of the missing argument.
    pub argname: String,
}

/// A plugin failed validation against a hook specification.
#[derive(Debug, Clone, Error)]
#[error("plugin '{plugin}': {message}")]
pub struct PluginValidationError {
    /// Registered (or canonical) name of the offending plugin.
    pub plugin: String,
    /// Human-readable description of the mismatch.
    pub message: String,
}

/// Which rule of the single-suspension wrapper protocol was broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperProblem {
    /// The controller ran to completion during setup instead of suspending.
    DidNotSuspend,
    /// The controller suspended again instead of finishing during teardown.
    SecondSuspend,
}

impl fmt::Display for WrapperProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WrapperProblem::DidNotSuspend => f.write_str("did not suspend"),
            WrapperProblem::SecondSuspend => f.write_str("suspended a second time"),
        }
    }
}

/// A wrapping implementation violated the single-suspension protocol.
///
/// `location` is the source location recorded when the implementation was
/// built, so the offending wrapper can be found without a backtrace.
#[derive(Debug, Clone, Error)]
#[error("wrap controller registered at {location} {problem}")]
pub struct WrapperProtocolError {
    /// Where the offending implementation was declared.
    pub location: &'static Location<'static>,
    /// The protocol rule that was broken.
    pub problem: WrapperProblem,
}

/// Errors raised by [`PluginManager`](crate::manager::PluginManager)
/// registration operations.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// A different plugin is already registered under this name.
    #[error("plugin '{0}' is already registered")]
    NameInUse(String),

    /// This exact plugin object is already registered (possibly under
    /// another name).
    #[error("plugin object is already registered under name '{0}'")]
    PluginInUse(String),

    /// The hook already carries a specification.
    #[error("hook '{name}' already has a specification (from namespace '{namespace}')")]
    SpecAlreadySet {
        /// Hook name whose specification was attached twice.
        name: String,
        /// Label of the namespace that provided the existing specification.
        namespace: String,
    },

    /// A specification namespace contributed no hook specifications for
    /// this manager's project.
    #[error("did not find any hook specifications in namespace '{0}'")]
    EmptyNamespace(String),

    /// A specification or implementation configuration is self-contradictory.
    #[error("hook '{name}': {reason}")]
    InvalidConfig {
        /// Hook the configuration belongs to.
        name: String,
        /// Which combination was rejected.
        reason: String,
    },

    /// Replaying memorized historic calls onto a freshly registered
    /// implementation failed. The registration itself has already
    /// committed when this is reported.
    #[error("replaying history of hook '{hook}' failed: {reason}")]
    HistoricReplay {
        /// Historic hook whose replay failed.
        hook: String,
        /// The implementation's failure, rendered.
        reason: String,
    },

    /// An entry-point loader failed to produce a plugin.
    #[error("entry point '{name}' failed to load: {reason}")]
    EntryPointLoad {
        /// Entry-point name.
        name: String,
        /// Loader failure, rendered.
        reason: String,
    },

    /// A plugin failed validation against a hook specification.
    #[error(transparent)]
    Validation(#[from] PluginValidationError),
}

/// Misuse of a hook caller's calling surface.
#[derive(Debug, Clone, Error)]
pub enum CallerError {
    /// A historic hook was invoked like a regular hook.
    #[error("cannot directly call historic hook '{0}', use call_historic instead")]
    HistoricDirectCall(String),

    /// `call_historic` was used on a hook that is not historic.
    #[error("hook '{0}' is not historic, call_historic is not available")]
    NotHistoric(String),

    /// `call_extra` was used on a historic hook.
    #[error("cannot use call_extra on historic hook '{0}', use call_historic instead")]
    HistoricCallExtra(String),

    /// A subset view was asked to mutate the underlying specification.
    #[error("cannot set a specification through a subset view of hook '{0}'")]
    SubsetSpecMutation(String),
}

/// A self-contradictory configuration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `historic` and `firstresult` cannot be combined on one hook.
    #[error("cannot have a historic firstresult hook")]
    HistoricFirstResult,

    /// An implementation cannot use both wrapping styles at once.
    #[error("an implementation cannot be both a wrapper and an outcome wrapper")]
    DoubleWrapper,
}
