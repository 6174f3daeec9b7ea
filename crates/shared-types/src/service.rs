//! # Service Tokens
//!
//! A `ServiceToken` is the registry's handle for one published service: its
//! assignment-order id, rank, interfaces and properties. References bind to
//! tokens; the service object itself is only fetched when a component is
//! activated.

use crate::properties::{keys, Properties};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Registry-assigned service identifier. Lower ids were registered earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceId(pub u64);

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The opaque service object handed to consumers.
pub type ServiceObject = Arc<dyn Any + Send + Sync>;

/// A published service as seen by consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceToken {
    /// Assignment-order id.
    pub id: ServiceId,
    /// Declared rank (`service.ranking`).
    pub rank: i64,
    /// Interfaces the service is registered under.
    pub interfaces: Vec<String>,
    /// Service properties, including `service.id` and `objectClass`.
    pub properties: Properties,
}

impl ServiceToken {
    /// Build a token, deriving the rank from the properties and stamping the
    /// engine-managed keys.
    pub fn new(id: ServiceId, interfaces: Vec<String>, properties: Properties) -> Self {
        let rank = properties.ranking();
        let properties = properties
            .with(keys::SERVICE_ID, id.0)
            .with(keys::OBJECT_CLASS, interfaces.clone());
        Self {
            id,
            rank,
            interfaces,
            properties,
        }
    }

    /// True if the service is registered under `interface`.
    pub fn provides(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|i| i == interface)
    }

    /// Binding preference: `Ordering::Less` means `self` is preferred.
    ///
    /// Higher rank wins; equal ranks fall back to the lower (older) id.
    pub fn preference(&self, other: &ServiceToken) -> Ordering {
        other
            .rank
            .cmp(&self.rank)
            .then_with(|| self.id.cmp(&other.id))
    }

    /// True if `self` should be bound in preference to `other`.
    pub fn outranks(&self, other: &ServiceToken) -> bool {
        self.preference(other) == Ordering::Less
    }
}

impl fmt::Display for ServiceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (id={}, ranking={})",
            self.interfaces.join(", "),
            self.id,
            self.rank
        )
    }
}
