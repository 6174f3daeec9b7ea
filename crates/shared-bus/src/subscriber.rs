//! # Service Subscriptions
//!
//! The receiving side of the service registry's event channel.

use crate::events::{ServiceEvent, ServiceFilter};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The registry was dropped.
    #[error("Service registry closed")]
    Closed,

    /// The subscriber fell behind and events were discarded.
    ///
    /// The receiver must resynchronise from a fresh snapshot.
    #[error("Subscriber lagged, {0} events dropped")]
    Lagged(u64),
}

/// A subscription handle for receiving service events.
pub struct Subscription {
    receiver: broadcast::Receiver<ServiceEvent>,
    filter: ServiceFilter,
}

impl Subscription {
    pub(crate) fn new(receiver: broadcast::Receiver<ServiceEvent>, filter: ServiceFilter) -> Self {
        debug!(interfaces = ?filter.interfaces, "Service subscription created");
        Self { receiver, filter }
    }

    /// Receive the next event that matches the filter.
    pub async fn recv(&mut self) -> Result<ServiceEvent, SubscriptionError> {
        loop {
            let event = match self.receiver.recv().await {
                Ok(e) => e,
                Err(broadcast::error::RecvError::Closed) => return Err(SubscriptionError::Closed),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(lagged = count, "Service subscriber lagged");
                    return Err(SubscriptionError::Lagged(count));
                }
            };

            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Try to receive the next event without blocking.
    ///
    /// - `Ok(Some(event))` - An event was available and matched
    /// - `Ok(None)` - No event available
    /// - `Err(_)` - The channel was closed or the subscriber lagged
    pub fn try_recv(&mut self) -> Result<Option<ServiceEvent>, SubscriptionError> {
        loop {
            let event = match self.receiver.try_recv() {
                Ok(e) => e,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    return Err(SubscriptionError::Lagged(count))
                }
            };

            if self.filter.matches(&event) {
                return Ok(Some(event));
            }
        }
    }

    /// Get the filter for this subscription.
    #[must_use]
    pub fn filter(&self) -> &ServiceFilter {
        &self.filter
    }
}
