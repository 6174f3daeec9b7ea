//! # Target Filters
//!
//! Predicates over service properties used to narrow a reference's
//! candidates. Filters are built programmatically; `Display` renders the
//! familiar LDAP-style form for management output.
//!
//! ```rust,ignore
//! let filter = TargetFilter::and(vec![
//!     TargetFilter::eq("region", "eu"),
//!     TargetFilter::not(TargetFilter::present("deprecated")),
//! ]);
//! assert_eq!(filter.to_string(), "(&(region=eu)(!(deprecated=*)))");
//! ```

use crate::properties::Properties;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A predicate over a property bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TargetFilter {
    /// Key present with a value equal to (or, for lists, containing) `value`.
    Equals { key: String, value: String },
    /// Key present with any value.
    Present { key: String },
    /// Numeric value greater than or equal to `value`.
    AtLeast { key: String, value: i64 },
    /// Numeric value less than or equal to `value`.
    AtMost { key: String, value: i64 },
    /// All sub-filters match.
    And { filters: Vec<TargetFilter> },
    /// Any sub-filter matches.
    Or { filters: Vec<TargetFilter> },
    /// Sub-filter does not match.
    Not { filter: Box<TargetFilter> },
}

impl TargetFilter {
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equals {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn present(key: impl Into<String>) -> Self {
        Self::Present { key: key.into() }
    }

    pub fn at_least(key: impl Into<String>, value: i64) -> Self {
        Self::AtLeast {
            key: key.into(),
            value,
        }
    }

    pub fn at_most(key: impl Into<String>, value: i64) -> Self {
        Self::AtMost {
            key: key.into(),
            value,
        }
    }

    pub fn and(filters: Vec<TargetFilter>) -> Self {
        Self::And { filters }
    }

    pub fn or(filters: Vec<TargetFilter>) -> Self {
        Self::Or { filters }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: TargetFilter) -> Self {
        Self::Not {
            filter: Box::new(filter),
        }
    }

    /// Evaluate the filter against a property bag.
    pub fn matches(&self, properties: &Properties) -> bool {
        match self {
            Self::Equals { key, value } => properties
                .get(key)
                .is_some_and(|actual| actual.matches_text(value)),
            Self::Present { key } => properties.contains_key(key),
            Self::AtLeast { key, value } => properties
                .get_number(key)
                .is_some_and(|actual| actual >= *value),
            Self::AtMost { key, value } => properties
                .get_number(key)
                .is_some_and(|actual| actual <= *value),
            Self::And { filters } => filters.iter().all(|f| f.matches(properties)),
            Self::Or { filters } => filters.iter().any(|f| f.matches(properties)),
            Self::Not { filter } => !filter.matches(properties),
        }
    }
}

impl fmt::Display for TargetFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals { key, value } => write!(f, "({}={})", key, value),
            Self::Present { key } => write!(f, "({}=*)", key),
            Self::AtLeast { key, value } => write!(f, "({}>={})", key, value),
            Self::AtMost { key, value } => write!(f, "({}<={})", key, value),
            Self::And { filters } => {
                write!(f, "(&")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                write!(f, ")")
            }
            Self::Or { filters } => {
                write!(f, "(|")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                write!(f, ")")
            }
            Self::Not { filter } => write!(f, "(!{})", filter),
        }
    }
}
