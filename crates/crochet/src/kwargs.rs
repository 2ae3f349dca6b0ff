//! Keyword-argument maps passed to hook calls.
//!
//! Hooks are always called with named arguments. The engine treats a
//! [`Kwargs`] map as read-only: every implementation of a hook observes the
//! same values, extracted by name according to its declared
//! [`Signature`](crate::signature::Signature).

use std::collections::BTreeMap;
use std::collections::btree_map;

use serde_json::Value;

/// Keyword arguments for a hook call, keyed by parameter name.
///
/// Backed by an ordered map so diagnostics and trace output are
/// deterministic.
///
/// # Example
///
/// ```
/// use crochet::kwargs;
///
/// let kw = kwargs! { "path" => "/tmp/x", "depth" => 3 };
/// assert_eq!(kw.get("depth"), Some(&crochet::json!(3)));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Kwargs {
    entries: BTreeMap<String, Value>,
}

impl Kwargs {
    /// Creates an empty argument map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an argument, replacing any previous value under the name.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.entries.insert(name.into(), value);
        self
    }

    /// Inserts an argument, consuming and returning the map.
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    /// Looks up an argument by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    /// Whether an argument with the given name is present.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of arguments in the map.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Renders the map as a JSON object value.
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

impl FromIterator<(String, Value)> for Kwargs {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Kwargs {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Builds a [`Kwargs`] map from `name => value` pairs.
///
/// Values go through [`json!`](crate::json), so any JSON-expressible literal
/// or expression works.
///
/// ```
/// use crochet::kwargs;
///
/// let kw = kwargs! { "a" => 1, "b" => ["x", "y"] };
/// assert_eq!(kw.len(), 2);
/// ```
#[macro_export]
macro_rules! kwargs {
    () => { $crate::Kwargs::new() };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut kw = $crate::Kwargs::new();
        $( kw.insert($name, $crate::json!($value)); )+
        kw
    }};
}
