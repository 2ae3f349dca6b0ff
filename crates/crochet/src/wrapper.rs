//! Wrapping hook implementations as single-suspension state machines.
//!
//! A wrapper runs logic *around* the rest of a hook's implementation chain.
//! The engine drives it in two phases: [`enter`](WrapController::enter)
//! before the inner chain runs, and [`resume`](WrapController::resume) once
//! the inner outcome is known. Between the phases the controller is
//! suspended; a well-behaved controller suspends exactly once.
//!
//! Two controller styles exist:
//!
//! - [`WrapController`] (new style) resumes with the inner `Result` and
//!   finishes with a replacement value, or fails with a replacement error.
//! - [`OutcomeController`] (old style) resumes with a mutable
//!   [`CallOutcome`] envelope and edits it in place.
//!
//! Controllers are produced fresh for every call by a factory, so a single
//! registered wrapper can participate in overlapping (reentrant) calls.
//! Hand-written controllers may break the protocol; the engine reports that
//! as a [`WrapperProtocolError`](crate::error::WrapperProtocolError) naming
//! the registration site. The [`FnWrap`] and [`FnOutcomeWrap`] adapters
//! build controllers from closure pairs that cannot break it.

use std::sync::Arc;

use serde_json::Value;

use crate::error::BoxError;
use crate::outcome::CallOutcome;

// ─── Controller protocol ──────────────────────────────────────────────────────

/// Where a controller stopped after being driven through one phase.
#[derive(Debug)]
pub enum WrapFlow {
    /// Paused at the suspension point, waiting for the inner outcome.
    Suspend,
    /// Ran to completion with a final value.
    ///
    /// Legal only while resuming; finishing during
    /// [`enter`](WrapController::enter) breaks the protocol. Old-style
    /// controllers communicate through the envelope instead, so their
    /// finish value is ignored.
    Finish(Value),
}

/// A new-style wrapping implementation body.
pub trait WrapController: Send {
    /// Setup phase, run before the inner chain with this wrapper's
    /// extracted arguments.
    fn enter(&mut self, args: &[Value]) -> Result<WrapFlow, BoxError>;

    /// Teardown phase: consumes the inner outcome (value or error) and
    /// finishes with the outcome this wrapper hands outward.
    fn resume(&mut self, outcome: Result<Value, BoxError>) -> Result<WrapFlow, BoxError>;
}

/// An old-style wrapping implementation body, operating on the outcome
/// envelope in place.
pub trait OutcomeController: Send {
    /// Setup phase, run before the inner chain.
    fn enter(&mut self, args: &[Value]) -> Result<WrapFlow, BoxError>;

    /// Teardown phase: may inspect and rewrite the envelope. The envelope's
    /// state afterwards becomes the current outcome.
    fn resume(&mut self, outcome: &mut CallOutcome) -> Result<WrapFlow, BoxError>;
}

/// Factory producing a fresh new-style controller per hook call.
pub type WrapFactory = Arc<dyn Fn() -> Box<dyn WrapController> + Send + Sync>;

/// Factory producing a fresh old-style controller per hook call.
pub type OutcomeWrapFactory = Arc<dyn Fn() -> Box<dyn OutcomeController> + Send + Sync>;

// ─── Closure adapters ─────────────────────────────────────────────────────────

/// Builds a well-behaved new-style controller from a closure pair.
///
/// `enter` runs the setup phase and produces a state value; `resume`
/// consumes that state together with the inner outcome and produces the
/// final one.
///
/// # Example
///
/// ```
/// use crochet::{FnWrap, json};
///
/// let controller = FnWrap::new(
///     |_args: &[crochet::Value]| Ok(std::time::Instant::now()),
///     |started: std::time::Instant, outcome| {
///         let _elapsed = started.elapsed();
///         outcome
///     },
/// );
/// # let _ = controller;
/// ```
pub struct FnWrap<S, E, R> {
    enter: E,
    resume: R,
    state: Option<S>,
}

impl<S, E, R> FnWrap<S, E, R>
where
    E: FnMut(&[Value]) -> Result<S, BoxError> + Send,
    R: FnMut(S, Result<Value, BoxError>) -> Result<Value, BoxError> + Send,
    S: Send,
{
    /// Pairs a setup closure with a teardown closure.
    pub fn new(enter: E, resume: R) -> Self {
        Self {
            enter,
            resume,
            state: None,
        }
    }
}

impl<S, E, R> WrapController for FnWrap<S, E, R>
where
    E: FnMut(&[Value]) -> Result<S, BoxError> + Send,
    R: FnMut(S, Result<Value, BoxError>) -> Result<Value, BoxError> + Send,
    S: Send,
{
    fn enter(&mut self, args: &[Value]) -> Result<WrapFlow, BoxError> {
        self.state = Some((self.enter)(args)?);
        Ok(WrapFlow::Suspend)
    }

    fn resume(&mut self, outcome: Result<Value, BoxError>) -> Result<WrapFlow, BoxError> {
        match self.state.take() {
            Some(state) => (self.resume)(state, outcome).map(WrapFlow::Finish),
            None => Err("wrap controller resumed before setup".into()),
        }
    }
}

/// Builds a well-behaved old-style controller from a closure pair.
///
/// Like [`FnWrap`], but the teardown closure edits the
/// [`CallOutcome`] envelope instead of returning a value.
pub struct FnOutcomeWrap<S, E, R> {
    enter: E,
    resume: R,
    state: Option<S>,
}

impl<S, E, R> FnOutcomeWrap<S, E, R>
where
    E: FnMut(&[Value]) -> Result<S, BoxError> + Send,
    R: FnMut(S, &mut CallOutcome) -> Result<(), BoxError> + Send,
    S: Send,
{
    /// Pairs a setup closure with an envelope-editing teardown closure.
    pub fn new(enter: E, resume: R) -> Self {
        Self {
            enter,
            resume,
            state: None,
        }
    }
}

impl<S, E, R> OutcomeController for FnOutcomeWrap<S, E, R>
where
    E: FnMut(&[Value]) -> Result<S, BoxError> + Send,
    R: FnMut(S, &mut CallOutcome) -> Result<(), BoxError> + Send,
    S: Send,
{
    fn enter(&mut self, args: &[Value]) -> Result<WrapFlow, BoxError> {
        self.state = Some((self.enter)(args)?);
        Ok(WrapFlow::Suspend)
    }

    fn resume(&mut self, outcome: &mut CallOutcome) -> Result<WrapFlow, BoxError> {
        match self.state.take() {
            Some(state) => {
                (self.resume)(state, outcome)?;
                Ok(WrapFlow::Finish(Value::Null))
            }
            None => Err("wrap controller resumed before setup".into()),
        }
    }
}
