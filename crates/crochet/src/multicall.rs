//! The multicall engine: one end-to-end dispatch across a hook's chain.
//!
//! The engine receives the caller's snapshots of the normal and wrapper
//! implementation lists and drives the two-phase protocol:
//!
//! 1. wrapper setup, in reverse wrapper-list order (outermost first);
//! 2. normal implementations, in reverse list order, collecting non-null
//!    results (stopping early in firstresult mode);
//! 3. teardown of every started wrapper, in reverse setup order, with the
//!    current outcome threaded through — each wrapper may observe it,
//!    replace it, or turn an error into a value and back.
//!
//! Failures during setup or normal execution never skip teardown: every
//! started wrapper is resumed, with the pending error thrown in.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::warn;

use crate::error::{BoxError, WrapperProblem, WrapperProtocolError};
use crate::hooks::{HookImpl, ImplKind};
use crate::kwargs::Kwargs;
use crate::outcome::CallOutcome;
use crate::wrapper::{OutcomeController, WrapController, WrapFlow};

// ─── Swappable execution slot ─────────────────────────────────────────────────

/// Signature of the function every hook call funnels through.
pub(crate) type ExecFn = dyn Fn(&str, &[Arc<HookImpl>], &[Arc<HookImpl>], &Kwargs, bool) -> Result<Value, BoxError>
    + Send
    + Sync;

/// The execution slot shared by a manager and all of its callers.
///
/// Normally it holds [`multicall`]; hook-call monitoring swaps in a
/// wrapping function and restores the previous one on undo.
pub(crate) struct HookExec {
    inner: RwLock<Arc<ExecFn>>,
}

impl HookExec {
    pub(crate) fn new() -> Arc<Self> {
        let inner: Arc<ExecFn> = Arc::new(multicall);
        Arc::new(Self {
            inner: RwLock::new(inner),
        })
    }

    pub(crate) fn run(
        &self,
        name: &str,
        normal: &[Arc<HookImpl>],
        wrappers: &[Arc<HookImpl>],
        kwargs: &Kwargs,
        firstresult: bool,
    ) -> Result<Value, BoxError> {
        let exec = self.inner.read().clone();
        exec(name, normal, wrappers, kwargs, firstresult)
    }

    pub(crate) fn current(&self) -> Arc<ExecFn> {
        self.inner.read().clone()
    }

    pub(crate) fn set(&self, exec: Arc<ExecFn>) {
        *self.inner.write() = exec;
    }
}

// ─── The engine ───────────────────────────────────────────────────────────────

enum Teardown {
    Wrapper(Box<dyn WrapController>, Arc<HookImpl>),
    Outcome(Box<dyn OutcomeController>, Arc<HookImpl>),
}

fn wrapfail(imp: &HookImpl, problem: WrapperProblem) -> BoxError {
    Box::new(WrapperProtocolError {
        location: imp.location(),
        problem,
    })
}

/// Executes a hook call across the given implementation chains.
pub(crate) fn multicall(
    hook_name: &str,
    normal: &[Arc<HookImpl>],
    wrappers: &[Arc<HookImpl>],
    kwargs: &Kwargs,
    firstresult: bool,
) -> Result<Value, BoxError> {
    let mut results: Vec<Value> = Vec::new();
    let mut exception: Option<BoxError> = None;
    let mut teardowns: Vec<Teardown> = Vec::new();

    // Phase 1: start every wrapper, outermost first.
    for imp in wrappers.iter().rev() {
        let args = match imp.signature().collect(kwargs) {
            Ok(args) => args,
            Err(err) => {
                exception = Some(err.into());
                break;
            }
        };
        match imp.kind() {
            ImplKind::Wrapper(factory) => {
                let mut controller = factory();
                match controller.enter(&args) {
                    Ok(WrapFlow::Suspend) => {
                        teardowns.push(Teardown::Wrapper(controller, Arc::clone(imp)));
                    }
                    Ok(WrapFlow::Finish(_)) => {
                        exception = Some(wrapfail(imp, WrapperProblem::DidNotSuspend));
                        break;
                    }
                    Err(err) => {
                        exception = Some(err);
                        break;
                    }
                }
            }
            ImplKind::OutcomeWrapper(factory) => {
                let mut controller = factory();
                match controller.enter(&args) {
                    Ok(WrapFlow::Suspend) => {
                        teardowns.push(Teardown::Outcome(controller, Arc::clone(imp)));
                    }
                    Ok(WrapFlow::Finish(_)) => {
                        exception = Some(wrapfail(imp, WrapperProblem::DidNotSuspend));
                        break;
                    }
                    Err(err) => {
                        exception = Some(err);
                        break;
                    }
                }
            }
            // Callers keep the lists partitioned; a plain impl here would
            // have nothing to wrap, so it is skipped.
            ImplKind::Normal(_) => {}
        }
    }

    // Phase 2: run the normal implementations, highest priority first.
    if exception.is_none() {
        for imp in normal.iter().rev() {
            let args = match imp.signature().collect(kwargs) {
                Ok(args) => args,
                Err(err) => {
                    exception = Some(err.into());
                    break;
                }
            };
            let ImplKind::Normal(function) = imp.kind() else {
                continue;
            };
            match function(&args) {
                Ok(Value::Null) => {}
                Ok(value) => {
                    results.push(value);
                    if firstresult {
                        break;
                    }
                }
                Err(err) => {
                    exception = Some(err);
                    break;
                }
            }
        }
    }

    let mut outcome: Result<Value, BoxError> = match exception {
        Some(err) => Err(err),
        None if firstresult => Ok(results.into_iter().next().unwrap_or(Value::Null)),
        None => Ok(Value::Array(results)),
    };

    // Phase 3: resume every started wrapper, innermost first.
    for teardown in teardowns.into_iter().rev() {
        match teardown {
            Teardown::Wrapper(mut controller, imp) => {
                outcome = match controller.resume(outcome) {
                    Ok(WrapFlow::Finish(value)) => Ok(value),
                    Ok(WrapFlow::Suspend) => Err(wrapfail(&imp, WrapperProblem::SecondSuspend)),
                    Err(err) => Err(err),
                };
            }
            Teardown::Outcome(mut controller, imp) => {
                let mut envelope = CallOutcome::from(outcome);
                match controller.resume(&mut envelope) {
                    Ok(WrapFlow::Finish(_)) => {}
                    Ok(WrapFlow::Suspend) => {
                        envelope.force_exception(wrapfail(&imp, WrapperProblem::SecondSuspend));
                    }
                    Err(err) => {
                        warn!(
                            hook = hook_name,
                            plugin = %imp.plugin_name(),
                            location = %imp.location(),
                            error = %err,
                            "error escaped an outcome-wrapper teardown"
                        );
                        envelope.force_exception(err);
                    }
                }
                outcome = envelope.into_result();
            }
        }
    }

    outcome
}
