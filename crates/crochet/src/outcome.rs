//! The value-or-exception envelope threaded through wrapper teardown.

use serde_json::Value;

use crate::error::BoxError;

/// Outcome of a hook call while wrappers may still transform it.
///
/// Holds exactly one of a result value or a pending error. Old-style
/// [`OutcomeController`](crate::wrapper::OutcomeController)s receive the
/// envelope during teardown and may replace either side; whatever state the
/// envelope is left in becomes the outcome seen by the next wrapper out, and
/// ultimately by the host.
#[derive(Debug)]
pub struct CallOutcome {
    state: Result<Value, BoxError>,
}

impl CallOutcome {
    /// Wraps a result value.
    pub fn from_result(value: Value) -> Self {
        Self { state: Ok(value) }
    }

    /// Wraps a pending error.
    pub fn from_exception(error: BoxError) -> Self {
        Self { state: Err(error) }
    }

    /// Runs a closure and captures its success or failure.
    pub fn from_call(call: impl FnOnce() -> Result<Value, BoxError>) -> Self {
        Self { state: call() }
    }

    /// Replaces the outcome with a value, clearing any pending error.
    pub fn force_result(&mut self, value: Value) {
        self.state = Ok(value);
    }

    /// Replaces the outcome with an error, discarding any value.
    pub fn force_exception(&mut self, error: BoxError) {
        self.state = Err(error);
    }

    /// The result value, if no error is pending.
    pub fn result(&self) -> Option<&Value> {
        self.state.as_ref().ok()
    }

    /// The pending error, if any.
    pub fn exception(&self) -> Option<&BoxError> {
        self.state.as_ref().err()
    }

    /// Borrows the outcome: the value, or the pending error.
    pub fn get_result(&self) -> Result<&Value, &BoxError> {
        self.state.as_ref()
    }

    /// Unwraps the envelope into a plain `Result`.
    pub fn into_result(self) -> Result<Value, BoxError> {
        self.state
    }
}

impl From<Result<Value, BoxError>> for CallOutcome {
    fn from(state: Result<Value, BoxError>) -> Self {
        Self { state }
    }
}

impl From<CallOutcome> for Result<Value, BoxError> {
    fn from(outcome: CallOutcome) -> Self {
        outcome.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_force_result_clears_exception() {
        let mut outcome = CallOutcome::from_exception("boom".into());
        assert!(outcome.exception().is_some());

        outcome.force_result(json!(42));
        assert_eq!(outcome.result(), Some(&json!(42)));
        assert!(outcome.exception().is_none());
    }

    #[test]
    fn test_force_exception_discards_value() {
        let mut outcome = CallOutcome::from_result(json!([1, 2]));
        outcome.force_exception("late failure".into());
        assert!(outcome.result().is_none());
        assert_eq!(outcome.into_result().unwrap_err().to_string(), "late failure");
    }

    #[test]
    fn test_from_call_captures_both_sides() {
        let ok = CallOutcome::from_call(|| Ok(json!("fine")));
        assert_eq!(ok.get_result().unwrap(), &json!("fine"));

        let err = CallOutcome::from_call(|| Err("nope".into()));
        assert_eq!(err.get_result().unwrap_err().to_string(), "nope");
    }
}
