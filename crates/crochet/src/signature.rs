//! Declared call signatures for hook functions.
//!
//! Rust functions do not expose parameter names at runtime, so hook
//! specifications and implementations declare them explicitly when they are
//! built. A [`Signature`] separates *positional* names, whose values are
//! extracted from the call's [`Kwargs`] and handed to the function, from
//! *keyword* names, which are backed by defaults inside the function and
//! only recorded for introspection and validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HookCallError;
use crate::kwargs::Kwargs;

/// The declared parameter names of a hook function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    args: Vec<String>,
    kwargs: Vec<String>,
}

impl Signature {
    /// Creates a signature with positional and keyword parameter names.
    pub fn new<A, K>(args: A, kwargs: K) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        K: IntoIterator,
        K::Item: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            kwargs: kwargs.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a signature with positional parameter names only.
    pub fn positional<A>(args: A) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
    {
        Self::new(args, Vec::<String>::new())
    }

    /// The signature of a callable with no declared parameters.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Positional parameter names, in declaration order.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Keyword (default-backed) parameter names.
    pub fn kwargs(&self) -> &[String] {
        &self.kwargs
    }

    /// Extracts the positional argument values from a call's keyword map.
    ///
    /// Values come back in declaration order; the first missing name fails
    /// with a [`HookCallError`] naming it.
    pub fn collect(&self, kwargs: &Kwargs) -> Result<Vec<Value>, HookCallError> {
        self.args
            .iter()
            .map(|name| {
                kwargs.get(name).cloned().ok_or_else(|| HookCallError {
                    argname: name.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kwargs;
    use serde_json::json;

    #[test]
    fn test_collect_in_declaration_order() {
        let sig = Signature::positional(["b", "a"]);
        let values = sig.collect(&kwargs! { "a" => 1, "b" => 2 }).unwrap();
        assert_eq!(values, vec![json!(2), json!(1)]);
    }

    #[test]
    fn test_collect_reports_first_missing_name() {
        let sig = Signature::positional(["a", "b", "c"]);
        let err = sig.collect(&kwargs! { "a" => 1 }).unwrap_err();
        assert_eq!(err.argname, "b");
    }

    #[test]
    fn test_keyword_names_are_not_extracted() {
        let sig = Signature::new(["a"], ["opts"]);
        let values = sig.collect(&kwargs! { "a" => 1 }).unwrap();
        assert_eq!(values, vec![json!(1)]);
        assert_eq!(sig.kwargs(), ["opts"]);
    }

    #[test]
    fn test_empty_signature_collects_nothing() {
        let sig = Signature::empty();
        assert!(sig.collect(&kwargs! { "a" => 1 }).unwrap().is_empty());
    }
}
