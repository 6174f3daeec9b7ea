//! # Property Bags
//!
//! Ordered key/value mappings attached to services, configurations and
//! component instances.
//!
//! Values are a closed set of variants rather than arbitrary objects, so every
//! collaborator (service registry, configuration source, management layer)
//! agrees on what a property can hold.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Property keys recognised by the lifecycle engine.
pub mod keys {
    /// Registry-assigned service identifier (assignment order).
    pub const SERVICE_ID: &str = "service.id";
    /// Service rank used for binding tie-breaks. Higher wins.
    pub const SERVICE_RANKING: &str = "service.ranking";
    /// Interfaces a service is registered under.
    pub const OBJECT_CLASS: &str = "objectClass";
    /// Name of the component that registered a service.
    pub const COMPONENT_NAME: &str = "component.name";
    /// Identifier of the component manager that registered a service.
    pub const COMPONENT_ID: &str = "component.id";
    /// Factory identifier of a component factory service.
    pub const COMPONENT_FACTORY: &str = "component.factory";
    /// Persistent identity of a configuration.
    pub const SERVICE_PID: &str = "service.pid";
    /// Factory pid of a factory configuration.
    pub const FACTORY_PID: &str = "service.factoryPid";

    /// Engine setting: log level.
    pub const DS_LOG_LEVEL: &str = "ds.loglevel";
    /// Engine setting: component factories accept factory configurations.
    pub const DS_FACTORY_ENABLED: &str = "ds.factory.enabled";
    /// Engine setting: keep delayed instances without consumers.
    pub const DS_KEEP_INSTANCES: &str = "ds.delayed.keepInstances";
    /// Engine setting: activation lock timeout in milliseconds.
    pub const DS_LOCK_TIMEOUT: &str = "ds.lock.timeout.milliseconds";
    /// Engine setting: publish the info service.
    pub const DS_INFO_SERVICE: &str = "ds.info.service";
}

/// A single property value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Number(i64),
    /// Plain string.
    String(String),
    /// Ordered list of strings.
    StringList(Vec<String>),
}

impl PropertyValue {
    /// Returns the value as a string slice if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as an integer.
    ///
    /// Strings holding a decimal integer are accepted as well.
    pub fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns the value as a boolean.
    ///
    /// Strings `"true"`/`"false"` (any case) are accepted as well.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
            Self::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }

    /// Returns true if this value equals `expected` or, for lists, contains it.
    ///
    /// Comparison is done on the textual form so that `Number(10)` matches
    /// `"10"`.
    pub fn matches_text(&self, expected: &str) -> bool {
        match self {
            Self::StringList(items) => items.iter().any(|item| item == expected),
            Self::String(s) => s == expected,
            Self::Number(n) => expected.trim().parse::<i64>().is_ok_and(|e| e == *n),
            Self::Bool(b) => expected
                .parse::<bool>()
                .map(|e| e == *b)
                .unwrap_or(false),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{}", s),
            Self::StringList(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Number(i64::from(value))
    }
}

impl From<u64> for PropertyValue {
    fn from(value: u64) -> Self {
        Self::Number(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(value: Vec<String>) -> Self {
        Self::StringList(value)
    }
}

impl From<Vec<&str>> for PropertyValue {
    fn from(value: Vec<&str>) -> Self {
        Self::StringList(value.into_iter().map(String::from).collect())
    }
}

/// Ordered property mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, PropertyValue>);

impl Properties {
    /// Create an empty property bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a value, returning the previous one.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Option<PropertyValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove a value.
    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.0.remove(key)
    }

    /// Look up a value.
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.0.get(key)
    }

    /// Look up a string value.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(PropertyValue::as_str)
    }

    /// Look up an integer value.
    pub fn get_number(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(PropertyValue::as_number)
    }

    /// Look up a boolean value.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(PropertyValue::as_bool)
    }

    /// Check whether a key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// The `service.ranking` of this bag, defaulting to 0.
    pub fn ranking(&self) -> i64 {
        self.get_number(keys::SERVICE_RANKING).unwrap_or(0)
    }

    /// Overlay `other` on top of `self`; keys in `other` win.
    #[must_use]
    pub fn merged(mut self, other: &Properties) -> Self {
        for (key, value) in other.iter() {
            self.0.insert(key.clone(), value.clone());
        }
        self
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.0.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the bag holds no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<PropertyValue>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
