//! Method arguments and their wire form.
//!
//! Arguments are collected as JSON values so callers can pass strings, numbers,
//! booleans and lists without converting them first. Right before a request is sent
//! they are flattened into the string map the API expects by [`stringify_values`].

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Named arguments for one method call.
///
/// # Examples
///
/// ```
/// use vkcall::Arguments;
///
/// let args = Arguments::new()
///     .with("user_ids", vec![1, 2, 3])
///     .with("fields", "photo_50")
///     .with("extended", true);
///
/// let wire = vkcall::params::stringify_values(&args);
/// assert_eq!(wire["user_ids"], "1,2,3");
/// assert_eq!(wire["extended"], "1");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: BTreeMap<String, Value>,
}

impl Arguments {
    /// Creates an empty argument set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an argument, replacing any previous value under the same name.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Adds an argument in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Builds arguments from any value that serializes to a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SerializationFailed`] if serialization fails or the value
    /// is not an object.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> crate::Result<Self> {
        match serde_json::to_value(value) {
            Ok(Value::Object(map)) => Ok(map.into()),
            Ok(other) => Err(crate::Error::SerializationFailed(format!(
                "method arguments must serialize to an object, got {}",
                other
            ))),
            Err(e) => Err(crate::Error::SerializationFailed(e.to_string())),
        }
    }

    /// Returns the value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Returns the number of arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over the arguments in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Returns `defaults` overlaid with `self`; names present here win.
    pub fn merged_over(&self, defaults: &Arguments) -> Arguments {
        let mut values = defaults.values.clone();
        values.extend(self.values.iter().map(|(k, v)| (k.clone(), v.clone())));
        Arguments { values }
    }
}

impl From<Map<String, Value>> for Arguments {
    fn from(map: Map<String, Value>) -> Self {
        Self {
            values: map.into_iter().collect(),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Converts every argument to its wire string form.
///
/// Strings pass through, numbers keep their JSON spelling, booleans become `1`/`0`,
/// arrays are comma-joined, `null` is empty and objects are sent as compact JSON.
pub fn stringify_values(arguments: &Arguments) -> BTreeMap<String, String> {
    arguments
        .iter()
        .map(|(name, value)| (name.clone(), stringify_value(value)))
        .collect()
}

/// Converts one argument value to its wire string form.
pub fn stringify_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(stringify_value)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => value.to_string(),
    }
}
