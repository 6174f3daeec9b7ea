//! # Service Events
//!
//! Defines the notifications that flow from the service registry to
//! interested component managers.

use serde::{Deserialize, Serialize};
use shared_types::ServiceToken;

/// What happened to a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceEventKind {
    /// The service was published.
    Registered,
    /// The service's properties (and possibly rank) changed.
    Modified,
    /// The service was withdrawn.
    Unregistering,
}

/// A service lifecycle notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEvent {
    pub kind: ServiceEventKind,
    /// Token as it looks after the event (before removal for
    /// `Unregistering`).
    pub token: ServiceToken,
}

impl ServiceEvent {
    #[must_use]
    pub fn registered(token: ServiceToken) -> Self {
        Self {
            kind: ServiceEventKind::Registered,
            token,
        }
    }

    #[must_use]
    pub fn modified(token: ServiceToken) -> Self {
        Self {
            kind: ServiceEventKind::Modified,
            token,
        }
    }

    #[must_use]
    pub fn unregistering(token: ServiceToken) -> Self {
        Self {
            kind: ServiceEventKind::Unregistering,
            token,
        }
    }
}

/// Filter for service subscriptions.
///
/// Only the interface is filtered here. Target filters are evaluated by each
/// reference, because a `Modified` event for a service that no longer matches
/// a target must still reach the reference so it can drop the candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceFilter {
    /// Interfaces of interest (empty = all).
    pub interfaces: Vec<String>,
}

impl ServiceFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific interfaces.
    #[must_use]
    pub fn interfaces<I, S>(interfaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            interfaces: interfaces.into_iter().map(Into::into).collect(),
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &ServiceEvent) -> bool {
        self.interfaces.is_empty()
            || self
                .interfaces
                .iter()
                .any(|interface| event.token.provides(interface))
    }
}
