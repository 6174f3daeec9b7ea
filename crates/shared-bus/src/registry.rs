//! # Service Registry
//!
//! Ports through which the lifecycle engine looks up, consumes and publishes
//! services, plus the in-memory registry used by the runtime binary and tests.
//!
//! ## Ordering
//!
//! Events are broadcast while the registry's write lock is held, so a
//! subscriber that subscribes *before* taking a snapshot with
//! [`ServiceEventSource::find_candidates`] sees every change exactly once
//! relative to that snapshot (duplicates are resolved by `ServiceId`).

use crate::events::{ServiceEvent, ServiceFilter};
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{Properties, ServiceId, ServiceObject, ServiceToken, TargetFilter};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Errors raised by service lookups and publication.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// No service with this id is registered.
    #[error("Service {0} is not registered")]
    NotFound(ServiceId),

    /// The provider could not produce its object.
    #[error("Service {id} is unavailable: {reason}")]
    Unavailable { id: ServiceId, reason: String },

    /// The provider itself refused the request.
    #[error("Service provider failed: {0}")]
    Provider(String),
}

/// Produces the object behind a published service.
///
/// Every successful `get_service` is paired with one `unget_service` by the
/// consumer, which lets providers count their users.
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    async fn get_service(&self) -> Result<ServiceObject, ServiceError>;

    async fn unget_service(&self) {}
}

/// A provider that hands out one pre-built object.
pub struct SingletonService {
    object: ServiceObject,
}

impl SingletonService {
    pub fn new(object: ServiceObject) -> Self {
        Self { object }
    }
}

#[async_trait]
impl ServiceProvider for SingletonService {
    async fn get_service(&self) -> Result<ServiceObject, ServiceError> {
        Ok(self.object.clone())
    }
}

/// Read side of the service registry.
#[async_trait]
pub trait ServiceEventSource: Send + Sync {
    /// Snapshot of every live service providing `interface` and matching
    /// `target`, best-ranked first.
    fn find_candidates(&self, interface: &str, target: Option<&TargetFilter>) -> Vec<ServiceToken>;

    /// Subscribe to registration changes.
    fn subscribe(&self, filter: ServiceFilter) -> Subscription;

    /// Current token of a live service, `None` once unregistered.
    fn get_properties(&self, id: ServiceId) -> Option<ServiceToken>;

    /// Acquire the service object.
    async fn get_service(&self, id: ServiceId) -> Result<ServiceObject, ServiceError>;

    /// Release an object obtained through `get_service`.
    async fn unget_service(&self, id: ServiceId);
}

/// Write side of the service registry.
pub trait ServicePublisher: Send + Sync {
    /// Publish a service and notify subscribers.
    fn register_service(
        &self,
        interfaces: Vec<String>,
        properties: Properties,
        provider: Arc<dyn ServiceProvider>,
    ) -> ServiceToken;

    /// Replace the properties of a live service (rank included).
    fn set_properties(&self, id: ServiceId, properties: Properties)
        -> Result<ServiceToken, ServiceError>;

    /// Withdraw a service. Subscribers see `Unregistering` first.
    fn unregister_service(&self, id: ServiceId) -> Result<(), ServiceError>;
}

struct Registration {
    token: ServiceToken,
    provider: Arc<dyn ServiceProvider>,
}

/// In-memory service registry.
///
/// Uses `tokio::sync::broadcast` for event fan-out.
pub struct InMemoryServiceRegistry {
    services: RwLock<BTreeMap<ServiceId, Registration>>,
    sender: broadcast::Sender<ServiceEvent>,
    next_id: AtomicU64,
    capacity: usize,
}

impl InMemoryServiceRegistry {
    /// Create a registry with the default channel capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a registry with the specified channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            services: RwLock::new(BTreeMap::new()),
            sender,
            next_id: AtomicU64::new(1),
            capacity,
        }
    }

    /// Publish a plain object as a singleton service.
    pub fn register_object(
        &self,
        interfaces: Vec<String>,
        properties: Properties,
        object: ServiceObject,
    ) -> ServiceToken {
        self.register_service(interfaces, properties, Arc::new(SingletonService::new(object)))
    }

    /// Number of live services.
    #[must_use]
    pub fn service_count(&self) -> usize {
        self.services.read().len()
    }

    /// Every live token, in id order.
    #[must_use]
    pub fn tokens(&self) -> Vec<ServiceToken> {
        self.services
            .read()
            .values()
            .map(|r| r.token.clone())
            .collect()
    }

    /// Get the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn emit(&self, event: ServiceEvent) {
        let id = event.token.id;
        let kind = event.kind;
        match self.sender.send(event) {
            Ok(receivers) => debug!(service = %id, ?kind, receivers, "Service event sent"),
            Err(_) => debug!(service = %id, ?kind, "Service event dropped (no receivers)"),
        }
    }
}

impl Default for InMemoryServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceEventSource for InMemoryServiceRegistry {
    fn find_candidates(&self, interface: &str, target: Option<&TargetFilter>) -> Vec<ServiceToken> {
        let services = self.services.read();
        let mut tokens: Vec<ServiceToken> = services
            .values()
            .map(|r| &r.token)
            .filter(|t| t.provides(interface))
            .filter(|t| target.map_or(true, |f| f.matches(&t.properties)))
            .cloned()
            .collect();
        tokens.sort_by(|a, b| a.preference(b));
        tokens
    }

    fn subscribe(&self, filter: ServiceFilter) -> Subscription {
        Subscription::new(self.sender.subscribe(), filter)
    }

    fn get_properties(&self, id: ServiceId) -> Option<ServiceToken> {
        self.services.read().get(&id).map(|r| r.token.clone())
    }

    async fn get_service(&self, id: ServiceId) -> Result<ServiceObject, ServiceError> {
        let provider = self
            .services
            .read()
            .get(&id)
            .map(|r| r.provider.clone())
            .ok_or(ServiceError::NotFound(id))?;
        provider.get_service().await
    }

    async fn unget_service(&self, id: ServiceId) {
        let provider = self.services.read().get(&id).map(|r| r.provider.clone());
        if let Some(provider) = provider {
            provider.unget_service().await;
        }
    }
}

impl ServicePublisher for InMemoryServiceRegistry {
    fn register_service(
        &self,
        interfaces: Vec<String>,
        properties: Properties,
        provider: Arc<dyn ServiceProvider>,
    ) -> ServiceToken {
        let id = ServiceId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let token = ServiceToken::new(id, interfaces, properties);

        let mut services = self.services.write();
        services.insert(
            id,
            Registration {
                token: token.clone(),
                provider,
            },
        );
        self.emit(ServiceEvent::registered(token.clone()));
        drop(services);

        info!("[Services] Registered {}", token);
        token
    }

    fn set_properties(
        &self,
        id: ServiceId,
        properties: Properties,
    ) -> Result<ServiceToken, ServiceError> {
        let mut services = self.services.write();
        let registration = services.get_mut(&id).ok_or(ServiceError::NotFound(id))?;
        let token = ServiceToken::new(id, registration.token.interfaces.clone(), properties);
        registration.token = token.clone();
        self.emit(ServiceEvent::modified(token.clone()));
        drop(services);

        debug!("[Services] Modified {}", token);
        Ok(token)
    }

    fn unregister_service(&self, id: ServiceId) -> Result<(), ServiceError> {
        let mut services = self.services.write();
        let Some(registration) = services.remove(&id) else {
            warn!(service = %id, "[Services] Unregister of unknown service");
            return Err(ServiceError::NotFound(id));
        };
        self.emit(ServiceEvent::unregistering(registration.token.clone()));
        drop(services);

        info!("[Services] Unregistered {}", registration.token);
        Ok(())
    }
}
