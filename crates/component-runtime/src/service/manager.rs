//! # Component Manager
//!
//! Drives one component through its lifecycle.
//!
//! Each manager is a single tokio task that owns the component's
//! [`ReferenceManager`]s, its instance and its service registration. Explicit
//! commands and forwarded service/configuration events arrive on one mpsc
//! queue, so transitions of one manager never overlap and are applied in
//! arrival order. [`ComponentManager`] is the cloneable handle to that task.
//!
//! ```text
//!   enable ──▶ ENABLING ──▶ UNSATISFIED ◀──────────────┐
//!                 │              │ satisfied            │ unsatisfied
//!                 │              ▼                      │
//!                 │         REGISTERED ─consume─┐       │
//!                 │              │ immediate    ▼       │
//!                 │              └────────▶ ACTIVATING ─┴─▶ ACTIVE
//!                 └──▶ FACTORY
//! ```
//!
//! ## Cancellation
//!
//! `disable()` and `dispose()` bump a pending-stop counter *before* queueing
//! their command. A running activation checks the counter after
//! instantiation, after binding and after the activate callback, and backs
//! out through DEACTIVATING so the queued command runs next.
//!
//! ## Stale events
//!
//! Every enable cycle gets a new epoch. Forwarder tasks stamp events with the
//! epoch they were spawned in; events from an older epoch are dropped.

use crate::adapters::service_provider::ComponentServiceProvider;
use crate::domain::{
    BindingDelta, ComponentDetail, ReferenceDetail, ReferenceManager,
    ReferenceSnapshot,
};
use crate::error::{ActivationFailure, LifecycleError};
use crate::ports::{ActivationContext, BoundService, ComponentInstance, DeactivationReason};
use crate::service::context::RuntimeContext;
use crate::service::factory::{ComponentFactory, FACTORY_INTERFACE};
use crate::service::registry::RegistryInner;
use parking_lot::RwLock;
use shared_bus::{
    ConfigurationEvent, ConfigurationEventKind, ServiceError, ServiceEvent, ServiceEventKind,
    ServiceFilter, SingletonService, Subscription, SubscriptionError,
};
use shared_types::{
    keys, ComponentDescription, ComponentId, ComponentState, ConfigurationPolicy, ModuleId,
    Properties, ServiceId, ServiceObject, ServiceToken,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type Reply<T> = oneshot::Sender<T>;

/// Work items for the manager task.
pub(crate) enum Command {
    Enable(Reply<Result<bool, LifecycleError>>),
    Disable(Reply<Result<bool, LifecycleError>>),
    Dispose(Reply<bool>),
    Service {
        epoch: u64,
        reference: usize,
        event: ServiceEvent,
    },
    Resync {
        epoch: u64,
        reference: usize,
    },
    Configuration {
        epoch: u64,
        event: ConfigurationEvent,
    },
    ConfigurationResync {
        epoch: u64,
    },
    GetService(Reply<Result<ServiceObject, ServiceError>>),
    UngetService,
    Flush(Reply<()>),
}

/// Creation parameters for a manager.
pub(crate) struct ManagerParams {
    pub id: ComponentId,
    pub module: ModuleId,
    pub description: Arc<ComponentDescription>,
    pub instance_properties: Properties,
    pub factory_instance: bool,
}

/// State readable from any thread without going through the task.
struct ManagerShared {
    id: ComponentId,
    module: ModuleId,
    description: Arc<ComponentDescription>,
    instance_properties: Properties,
    factory_instance: bool,
    state: watch::Sender<ComponentState>,
    references: RwLock<Vec<ReferenceSnapshot>>,
    properties: RwLock<Properties>,
    last_failure: RwLock<Option<ActivationFailure>>,
    registration: RwLock<Option<ServiceId>>,
    factory: RwLock<Option<Arc<ComponentFactory>>>,
    pending_stops: AtomicUsize,
    explicitly_disabled: AtomicBool,
}

/// Handle to a component manager task.
#[derive(Clone)]
pub struct ComponentManager {
    shared: Arc<ManagerShared>,
    commands: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for ComponentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentManager")
            .field("id", &self.shared.id)
            .field("name", &self.shared.description.name)
            .field("state", &self.state())
            .finish()
    }
}

impl ComponentManager {
    /// Create the manager in DISABLED and start its task.
    pub(crate) fn spawn(
        params: ManagerParams,
        context: RuntimeContext,
        registry: Weak<RegistryInner>,
    ) -> Self {
        let references: Vec<ReferenceManager> = params
            .description
            .references
            .iter()
            .cloned()
            .map(ReferenceManager::new)
            .collect();

        let (state, _) = watch::channel(ComponentState::Disabled);
        let shared = Arc::new(ManagerShared {
            id: params.id,
            module: params.module,
            description: params.description,
            instance_properties: params.instance_properties,
            factory_instance: params.factory_instance,
            state,
            references: RwLock::new(references.iter().map(ReferenceManager::snapshot).collect()),
            properties: RwLock::new(Properties::new()),
            last_failure: RwLock::new(None),
            registration: RwLock::new(None),
            factory: RwLock::new(None),
            pending_stops: AtomicUsize::new(0),
            explicitly_disabled: AtomicBool::new(false),
        });

        let (commands, receiver) = mpsc::unbounded_channel();
        let core = ManagerCore {
            shared: shared.clone(),
            context,
            registry,
            commands: commands.downgrade(),
            references,
            instance: None,
            activated: false,
            acquired: Vec::new(),
            registration: None,
            configuration: None,
            epoch: 0,
            forwarders: Vec::new(),
            consumers: 0,
        };
        core.refresh_properties();
        tokio::spawn(core.run(receiver));

        Self { shared, commands }
    }

    pub fn id(&self) -> ComponentId {
        self.shared.id
    }

    pub fn module(&self) -> ModuleId {
        self.shared.module
    }

    pub fn name(&self) -> &str {
        &self.shared.description.name
    }

    pub fn description(&self) -> &Arc<ComponentDescription> {
        &self.shared.description
    }

    pub fn state(&self) -> ComponentState {
        *self.shared.state.borrow()
    }

    /// True for managers produced by a component factory.
    pub fn is_factory_instance(&self) -> bool {
        self.shared.factory_instance
    }

    /// Set by `disable()`, cleared by `enable()`.
    pub fn is_explicitly_disabled(&self) -> bool {
        self.shared.explicitly_disabled.load(Ordering::SeqCst)
    }

    /// Effective component properties.
    pub fn properties(&self) -> Properties {
        self.shared.properties.read().clone()
    }

    pub fn references(&self) -> Vec<ReferenceSnapshot> {
        self.shared.references.read().clone()
    }

    pub fn last_failure(&self) -> Option<ActivationFailure> {
        self.shared.last_failure.read().clone()
    }

    /// Id of the service registered for this component, if any.
    pub fn service_id(&self) -> Option<ServiceId> {
        *self.shared.registration.read()
    }

    /// The factory published while in FACTORY state.
    pub fn factory(&self) -> Option<Arc<ComponentFactory>> {
        self.shared.factory.read().clone()
    }

    /// Watch state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ComponentState> {
        self.shared.state.subscribe()
    }

    /// Wait until the manager reaches `target`, up to `within`.
    pub async fn wait_for_state(&self, target: ComponentState, within: Duration) -> bool {
        let mut rx = self.shared.state.subscribe();
        let reached = matches!(
            tokio::time::timeout(within, rx.wait_for(|state| *state == target)).await,
            Ok(Ok(_))
        );
        reached
    }

    /// Enable the component. Returns false if it already was enabled.
    ///
    /// # Errors
    /// - `Disposed`: the manager reached DISPOSED
    pub async fn enable(&self) -> Result<bool, LifecycleError> {
        self.shared.explicitly_disabled.store(false, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Enable(tx)).is_err() {
            return Err(self.disposed_error());
        }
        rx.await.unwrap_or_else(|_| Err(self.disposed_error()))
    }

    /// Disable the component. Returns false if it already was disabled.
    ///
    /// # Errors
    /// - `Disposed`: the manager reached DISPOSED
    pub async fn disable(&self) -> Result<bool, LifecycleError> {
        self.shared.explicitly_disabled.store(true, Ordering::SeqCst);
        self.shared.pending_stops.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Disable(tx)).is_err() {
            self.shared.pending_stops.fetch_sub(1, Ordering::SeqCst);
            return Err(self.disposed_error());
        }
        rx.await.unwrap_or_else(|_| Err(self.disposed_error()))
    }

    /// Dispose the component. Returns false if it already was disposed.
    pub async fn dispose(&self) -> bool {
        self.shared.pending_stops.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Dispose(tx)).is_err() {
            self.shared.pending_stops.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Wait until every command queued so far has been processed.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Full management view.
    pub fn detail(&self) -> ComponentDetail {
        let description = &self.shared.description;
        ComponentDetail {
            id: self.shared.id,
            name: description.name.clone(),
            module: self.shared.module,
            state: self.state(),
            implementation: description.implementation.clone(),
            default_enabled: description.enabled,
            immediate: description.immediate,
            services: description.services.clone(),
            scope: description.scope,
            configuration_policy: description.configuration_policy,
            configuration_pid: description.configuration_pid().to_string(),
            configuration_pid_declared: description.configuration_pid.is_some(),
            activate: description.activate.clone(),
            deactivate: description.deactivate.clone(),
            modified: description.modified.clone(),
            factory: description.factory.clone(),
            factory_instance: self.shared.factory_instance,
            service_id: self.service_id(),
            properties: self.properties(),
            last_failure: self.last_failure().map(|f| f.to_string()),
            references: self
                .shared
                .references
                .read()
                .iter()
                .map(ReferenceDetail::from)
                .collect(),
        }
    }

    fn disposed_error(&self) -> LifecycleError {
        LifecycleError::Disposed {
            id: self.shared.id,
            name: self.shared.description.name.clone(),
        }
    }
}

struct Acquired {
    reference: usize,
    service: BoundService,
}

/// Task-owned state of one manager.
struct ManagerCore {
    shared: Arc<ManagerShared>,
    context: RuntimeContext,
    registry: Weak<RegistryInner>,
    commands: mpsc::WeakUnboundedSender<Command>,
    references: Vec<ReferenceManager>,
    instance: Option<Box<dyn ComponentInstance>>,
    /// The activate step completed, so deactivate is owed.
    activated: bool,
    acquired: Vec<Acquired>,
    registration: Option<ServiceToken>,
    configuration: Option<Properties>,
    epoch: u64,
    forwarders: Vec<JoinHandle<()>>,
    consumers: usize,
}

impl ManagerCore {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            self.handle(command).await;
            self.publish_references();
            if self.state().is_disposed() {
                break;
            }
        }
        for forwarder in self.forwarders.drain(..) {
            forwarder.abort();
        }
        debug!(component = %self.shared.id, "[Manager] Task finished");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Enable(reply) => {
                let result = self.enable().await;
                let _ = reply.send(result);
            }
            Command::Disable(reply) => {
                self.shared.pending_stops.fetch_sub(1, Ordering::SeqCst);
                let result = self.disable().await;
                let _ = reply.send(result);
            }
            Command::Dispose(reply) => {
                self.shared.pending_stops.fetch_sub(1, Ordering::SeqCst);
                let changed = self.dispose().await;
                let _ = reply.send(changed);
            }
            Command::Service {
                epoch,
                reference,
                event,
            } if epoch == self.epoch => self.on_service_event(reference, event).await,
            Command::Resync { epoch, reference } if epoch == self.epoch => {
                self.resync_reference(reference).await
            }
            Command::Configuration { epoch, event } if epoch == self.epoch => {
                self.on_configuration_event(event).await
            }
            Command::ConfigurationResync { epoch } if epoch == self.epoch => {
                self.resync_configuration().await
            }
            Command::Service { .. }
            | Command::Resync { .. }
            | Command::Configuration { .. }
            | Command::ConfigurationResync { .. } => {
                debug!(component = %self.shared.id, "[Manager] Dropped stale event");
            }
            Command::GetService(reply) => {
                let result = self.get_service().await;
                let _ = reply.send(result);
            }
            Command::UngetService => self.unget_service().await,
            Command::Flush(reply) => {
                let _ = reply.send(());
            }
        }
    }

    // ---------------------------------------------------------------------
    // State
    // ---------------------------------------------------------------------

    fn state(&self) -> ComponentState {
        *self.shared.state.borrow()
    }

    fn name(&self) -> &str {
        &self.shared.description.name
    }

    fn transition(&self, next: ComponentState) {
        let current = self.state();
        if current == next {
            return;
        }
        if !current.can_transition_to(next) {
            error!(
                component = %self.name(),
                id = %self.shared.id,
                from = %current,
                to = %next,
                "[Manager] Refusing illegal transition"
            );
            return;
        }
        debug!(
            component = %self.name(),
            id = %self.shared.id,
            from = %current,
            to = %next,
            "[Manager] State change"
        );
        self.shared.state.send_replace(next);
    }

    fn publish_references(&self) {
        *self.shared.references.write() =
            self.references.iter().map(ReferenceManager::snapshot).collect();
    }

    fn refresh_properties(&self) {
        let description = &self.shared.description;
        let mut properties = description.properties.clone();
        if let Some(configuration) = &self.configuration {
            properties = properties.merged(configuration);
        }
        properties = properties.merged(&self.shared.instance_properties);
        properties.insert(keys::COMPONENT_NAME, description.name.as_str());
        properties.insert(keys::COMPONENT_ID, self.shared.id.0);
        *self.shared.properties.write() = properties;
    }

    fn record_failure(&self, failure: Option<ActivationFailure>) {
        *self.shared.last_failure.write() = failure;
    }

    /// Factory components enter FACTORY instead of activating. Their
    /// produced instances run the normal lifecycle.
    fn is_factory_root(&self) -> bool {
        self.shared.description.is_factory() && !self.shared.factory_instance
    }

    fn is_delayed(&self) -> bool {
        let description = &self.shared.description;
        !description.immediate && description.provides_services()
    }

    fn is_satisfied(&self) -> bool {
        let configured = self.shared.description.configuration_policy
            != ConfigurationPolicy::Require
            || self.configuration.is_some();
        configured && self.references.iter().all(ReferenceManager::is_satisfied)
    }

    fn stop_requested(&self) -> bool {
        self.shared.pending_stops.load(Ordering::SeqCst) > 0
    }

    fn checkpoint(&self) -> Result<(), ActivationFailure> {
        if self.stop_requested() {
            Err(ActivationFailure::Cancelled)
        } else {
            Ok(())
        }
    }

    // ---------------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------------

    async fn enable(&mut self) -> Result<bool, LifecycleError> {
        match self.state() {
            ComponentState::Disabled => {}
            ComponentState::Disposing | ComponentState::Disposed => {
                return Err(LifecycleError::Disposed {
                    id: self.shared.id,
                    name: self.name().to_string(),
                })
            }
            _ => return Ok(false),
        }

        info!("[Manager] Enabling component {} ({})", self.name(), self.shared.id);
        self.transition(ComponentState::Enabling);
        self.epoch += 1;
        self.record_failure(None);

        self.references = self
            .shared
            .description
            .references
            .iter()
            .cloned()
            .map(ReferenceManager::new)
            .collect();

        // Subscribe before taking the snapshot so nothing slips between them.
        for (index, reference) in self.references.iter_mut().enumerate() {
            let description = reference.description().clone();
            let subscription = self
                .context
                .services
                .subscribe(ServiceFilter::interfaces([description.interface.clone()]));
            let snapshot = self
                .context
                .services
                .find_candidates(&description.interface, description.target.as_ref());
            reference.resync(snapshot);
            self.forwarders.push(spawn_service_forwarder(
                subscription,
                self.commands.clone(),
                self.epoch,
                index,
            ));
        }

        if self.shared.description.configuration_policy != ConfigurationPolicy::Ignore {
            let receiver = self.context.configuration.subscribe();
            self.forwarders.push(spawn_configuration_forwarder(
                receiver,
                self.commands.clone(),
                self.epoch,
            ));
            if !self.is_factory_root() {
                self.configuration = self
                    .context
                    .configuration
                    .get_properties(self.shared.description.configuration_pid());
            }
        }
        self.refresh_properties();

        if self.is_factory_root() {
            self.enter_factory().await;
        } else {
            self.evaluate().await;
        }
        Ok(true)
    }

    async fn disable(&mut self) -> Result<bool, LifecycleError> {
        match self.state() {
            ComponentState::Disabled => Ok(false),
            ComponentState::Disposing | ComponentState::Disposed => Err(LifecycleError::Disposed {
                id: self.shared.id,
                name: self.name().to_string(),
            }),
            _ => {
                info!("[Manager] Disabling component {} ({})", self.name(), self.shared.id);
                self.transition(ComponentState::Disabling);
                self.teardown(DeactivationReason::Disabled).await;
                self.transition(ComponentState::Disabled);
                Ok(true)
            }
        }
    }

    async fn dispose(&mut self) -> bool {
        match self.state() {
            ComponentState::Disposed | ComponentState::Disposing => false,
            ComponentState::Disabled => {
                self.transition(ComponentState::Disposing);
                self.references.clear();
                self.transition(ComponentState::Disposed);
                info!("[Manager] Disposed component {} ({})", self.name(), self.shared.id);
                true
            }
            _ => {
                self.transition(ComponentState::Disposing);
                self.teardown(DeactivationReason::Disposed).await;
                self.references.clear();
                self.transition(ComponentState::Disposed);
                info!("[Manager] Disposed component {} ({})", self.name(), self.shared.id);
                true
            }
        }
    }

    /// Release everything an enable cycle acquired.
    async fn teardown(&mut self, reason: DeactivationReason) {
        self.epoch += 1;
        for forwarder in self.forwarders.drain(..) {
            forwarder.abort();
        }

        let factory = self.shared.factory.write().take();
        if let Some(factory) = factory {
            factory.dispose_all().await;
        }

        self.release_instance(reason).await;
        self.unregister_service();
        for reference in &mut self.references {
            reference.clear();
        }
        self.configuration = None;
        self.refresh_properties();
    }

    // ---------------------------------------------------------------------
    // Activation
    // ---------------------------------------------------------------------

    /// Decide where an enabled, non-factory manager should be.
    async fn evaluate(&mut self) {
        if !self.is_satisfied() {
            self.transition(ComponentState::Unsatisfied);
            debug!(component = %self.name(), "[Manager] Unsatisfied");
            return;
        }

        if self.is_delayed() {
            if self.registration.is_none() {
                self.register_service();
            }
            self.transition(ComponentState::Registered);
            info!("[Manager] Component {} registered (delayed)", self.name());
        } else {
            self.activate().await;
        }
    }

    /// Run one activation attempt. Returns true on ACTIVE.
    async fn activate(&mut self) -> bool {
        self.transition(ComponentState::Activating);

        let timeout = self.context.config.lock_timeout();
        let result = match tokio::time::timeout(timeout, self.try_activate()).await {
            Ok(result) => result,
            Err(_) => Err(ActivationFailure::Timeout {
                millis: self.context.config.lock_timeout_ms,
            }),
        };

        match result {
            Ok(()) => {
                self.transition(ComponentState::Active);
                self.record_failure(None);
                info!("[Manager] Component {} ({}) active", self.name(), self.shared.id);
                true
            }
            Err(failure) => {
                warn!(
                    component = %self.name(),
                    id = %self.shared.id,
                    error = %failure,
                    "[Manager] Activation failed"
                );
                if failure == ActivationFailure::Cancelled {
                    self.transition(ComponentState::Deactivating);
                }
                self.release_instance(DeactivationReason::ActivationAborted)
                    .await;
                self.unregister_service();
                self.transition(ComponentState::Unsatisfied);
                self.record_failure(Some(failure));
                false
            }
        }
    }

    async fn try_activate(&mut self) -> Result<(), ActivationFailure> {
        let description = self.shared.description.clone();
        let ctx = self.activation_context();

        let instance = self
            .context
            .instances
            .create_instance(&description, &ctx)
            .await
            .map_err(|e| ActivationFailure::Instantiation(e.to_string()))?;
        self.instance = Some(instance);
        self.checkpoint()?;

        for index in 0..self.references.len() {
            self.bind_reference(index).await?;
        }
        self.checkpoint()?;

        if let Some(method) = &description.activate {
            if let Some(instance) = self.instance.as_mut() {
                instance.activate(method, &ctx).await.map_err(|e| {
                    ActivationFailure::ActivateCallback {
                        method: method.clone(),
                        reason: e.to_string(),
                    }
                })?;
            }
        }
        self.activated = true;
        self.checkpoint()?;

        if description.provides_services() && self.registration.is_none() {
            self.register_service();
        }
        Ok(())
    }

    fn activation_context(&self) -> ActivationContext {
        ActivationContext {
            component_id: self.shared.id,
            component_name: self.name().to_string(),
            properties: self.shared.properties.read().clone(),
        }
    }

    /// Acquire and bind every bound-but-unacquired service of a reference.
    /// Services that cannot be acquired are dropped and the next candidate
    /// is tried.
    async fn bind_reference(&mut self, index: usize) -> Result<(), ActivationFailure> {
        loop {
            let pending: Vec<ServiceToken> = self.references[index]
                .bound()
                .iter()
                .filter(|t| !self.is_acquired(index, t.id))
                .cloned()
                .collect();
            if pending.is_empty() {
                break;
            }
            for token in pending {
                if !self.bind_service(index, token).await {
                    break;
                }
            }
        }

        if self.references[index].is_satisfied() {
            Ok(())
        } else {
            Err(ActivationFailure::ReferenceUnsatisfied {
                reference: self.references[index].name().to_string(),
            })
        }
    }

    fn is_acquired(&self, index: usize, id: ServiceId) -> bool {
        self.acquired
            .iter()
            .any(|a| a.reference == index && a.service.token.id == id)
    }

    /// Returns false if the service was dropped from the reference.
    async fn bind_service(&mut self, index: usize, token: ServiceToken) -> bool {
        let reference = self.references[index].name().to_string();
        let id = token.id;

        let object = match self.acquire(id).await {
            Ok(object) => object,
            Err(e) => {
                warn!(
                    component = %self.name(),
                    reference = %reference,
                    service = %id,
                    error = %e,
                    "[Manager] Service unavailable, trying next candidate"
                );
                self.references[index].drop_unavailable(id);
                return false;
            }
        };

        let service = BoundService { token, object };
        if let Some(instance) = self.instance.as_mut() {
            if let Err(e) = instance.bind(&reference, &service).await {
                warn!(
                    component = %self.name(),
                    reference = %reference,
                    service = %id,
                    error = %e,
                    "[Manager] Bind failed, trying next candidate"
                );
                self.context.services.unget_service(id).await;
                self.references[index].drop_unavailable(id);
                return false;
            }
        }

        debug!(component = %self.name(), reference = %reference, service = %id, "[Manager] Bound");
        self.acquired.push(Acquired {
            reference: index,
            service,
        });
        true
    }

    async fn acquire(&self, id: ServiceId) -> Result<ServiceObject, ServiceError> {
        let timeout = self.context.config.lock_timeout();
        match tokio::time::timeout(timeout, self.context.services.get_service(id)).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::Unavailable {
                id,
                reason: "acquisition timed out".to_string(),
            }),
        }
    }

    /// Unbind acquired services of a reference that are no longer bound.
    async fn release_stale(&mut self, index: usize) {
        let (stale, kept): (Vec<Acquired>, Vec<Acquired>) = std::mem::take(&mut self.acquired)
            .into_iter()
            .partition(|a| a.reference == index && !self.references[index].is_bound(a.service.token.id));
        self.acquired = kept;

        let reference = self.references[index].name().to_string();
        for acquired in stale {
            if let Some(instance) = self.instance.as_mut() {
                instance.unbind(&reference, &acquired.service).await;
            }
            self.context
                .services
                .unget_service(acquired.service.token.id)
                .await;
            debug!(
                component = %self.name(),
                reference = %reference,
                service = %acquired.service.token.id,
                "[Manager] Unbound"
            );
        }
    }

    /// Deactivate callback, unbind and release every acquired service, drop
    /// the instance.
    async fn release_instance(&mut self, reason: DeactivationReason) {
        let acquired = std::mem::take(&mut self.acquired);
        let instance = self.instance.take();

        if let Some(mut instance) = instance {
            if self.activated {
                if let Some(method) = &self.shared.description.deactivate {
                    instance.deactivate(method, reason).await;
                }
            }
            for acquired in acquired.iter().rev() {
                let reference = self.references[acquired.reference].name().to_string();
                instance.unbind(&reference, &acquired.service).await;
            }
        }
        for acquired in acquired.iter().rev() {
            self.context
                .services
                .unget_service(acquired.service.token.id)
                .await;
        }

        self.activated = false;
        self.consumers = 0;
    }

    /// ACTIVE → DEACTIVATING → UNSATISFIED (or REGISTERED when the delayed
    /// registration is kept).
    async fn deactivate(&mut self, reason: DeactivationReason, keep_registration: bool) {
        info!(
            "[Manager] Deactivating component {} ({}): {:?}",
            self.name(),
            self.shared.id,
            reason
        );
        self.transition(ComponentState::Deactivating);
        self.release_instance(reason).await;
        if keep_registration && self.registration.is_some() {
            self.transition(ComponentState::Registered);
        } else {
            self.unregister_service();
            self.transition(ComponentState::Unsatisfied);
        }
    }

    // ---------------------------------------------------------------------
    // Service registration
    // ---------------------------------------------------------------------

    fn register_service(&mut self) {
        let description = &self.shared.description;
        let provider = Arc::new(ComponentServiceProvider::new(
            self.shared.id,
            self.commands.clone(),
        ));
        let token = self.context.publisher.register_service(
            description.services.clone(),
            self.shared.properties.read().clone(),
            provider,
        );
        *self.shared.registration.write() = Some(token.id);
        self.registration = Some(token);
    }

    fn unregister_service(&mut self) {
        if let Some(token) = self.registration.take() {
            *self.shared.registration.write() = None;
            if let Err(e) = self.context.publisher.unregister_service(token.id) {
                warn!(component = %self.name(), error = %e, "[Manager] Unregister failed");
            }
        }
    }

    fn update_registration_properties(&mut self) {
        if let Some(token) = &self.registration {
            let properties = self.shared.properties.read().clone();
            match self.context.publisher.set_properties(token.id, properties) {
                Ok(updated) => self.registration = Some(updated),
                Err(e) => warn!(component = %self.name(), error = %e, "[Manager] Property update failed"),
            }
        }
    }

    // ---------------------------------------------------------------------
    // Service events
    // ---------------------------------------------------------------------

    async fn on_service_event(&mut self, index: usize, event: ServiceEvent) {
        let Some(reference) = self.references.get_mut(index) else {
            return;
        };
        let delta = match event.kind {
            ServiceEventKind::Registered => {
                // The snapshot may already hold it, or it may be gone again.
                match self.context.services.get_properties(event.token.id) {
                    Some(current) => reference.candidate_added(current),
                    None => return,
                }
            }
            ServiceEventKind::Modified => match self.context.services.get_properties(event.token.id) {
                Some(current) => reference.candidate_modified(current),
                None => return,
            },
            ServiceEventKind::Unregistering => reference.candidate_removed(event.token.id),
        };
        self.apply_delta(index, delta).await;
    }

    async fn resync_reference(&mut self, index: usize) {
        let Some(reference) = self.references.get_mut(index) else {
            return;
        };
        warn!(
            component = %self.shared.description.name,
            reference = %reference.name(),
            "[Manager] Event stream lagged, resynchronising"
        );
        let description = reference.description().clone();
        let snapshot = self
            .context
            .services
            .find_candidates(&description.interface, description.target.as_ref());
        let delta = reference.resync(snapshot);
        self.apply_delta(index, delta).await;
    }

    async fn apply_delta(&mut self, index: usize, delta: BindingDelta) {
        if delta.is_empty() && !delta.satisfaction_changed() {
            return;
        }

        match self.state() {
            ComponentState::Unsatisfied => {
                if self.is_satisfied() {
                    self.evaluate().await;
                }
            }
            ComponentState::Registered => {
                if !self.is_satisfied() {
                    self.unregister_service();
                    self.transition(ComponentState::Unsatisfied);
                }
            }
            ComponentState::Active => {
                if !self.is_satisfied() {
                    self.deactivate(DeactivationReason::ReferenceUnsatisfied, false)
                        .await;
                } else if delta.is_empty() {
                    // satisfaction flip only
                } else if self.references[index].description().is_static() {
                    info!(
                        component = %self.name(),
                        reference = %self.references[index].name(),
                        "[Manager] Static reference changed, reactivating"
                    );
                    self.deactivate(DeactivationReason::Rebind, false).await;
                    self.evaluate().await;
                } else {
                    self.rebind_dynamic(index).await;
                }
            }
            _ => {}
        }
    }

    /// Bind new services first, then unbind the ones that left, all on the
    /// live instance.
    async fn rebind_dynamic(&mut self, index: usize) {
        let bound = self.bind_reference(index).await;
        self.release_stale(index).await;
        if bound.is_err() || !self.is_satisfied() {
            self.deactivate(DeactivationReason::ReferenceUnsatisfied, false)
                .await;
        }
    }

    // ---------------------------------------------------------------------
    // Consumption of delayed services
    // ---------------------------------------------------------------------

    async fn get_service(&mut self) -> Result<ServiceObject, ServiceError> {
        let id = self
            .registration
            .as_ref()
            .map_or(ServiceId(0), |t| t.id);

        match self.state() {
            ComponentState::Active => {}
            ComponentState::Registered => {
                if !self.activate().await {
                    let reason = self
                        .shared
                        .last_failure
                        .read()
                        .as_ref()
                        .map_or_else(|| "activation failed".to_string(), ToString::to_string);
                    return Err(ServiceError::Unavailable { id, reason });
                }
            }
            state => {
                return Err(ServiceError::Unavailable {
                    id,
                    reason: format!("component is {}", state),
                })
            }
        }

        let object = self
            .instance
            .as_ref()
            .and_then(|i| i.service_object())
            .ok_or_else(|| ServiceError::Unavailable {
                id,
                reason: ActivationFailure::NoServiceObject.to_string(),
            })?;
        self.consumers += 1;
        Ok(object)
    }

    async fn unget_service(&mut self) {
        self.consumers = self.consumers.saturating_sub(1);
        if self.consumers == 0
            && self.state() == ComponentState::Active
            && self.is_delayed()
            && !self.context.config.keep_instances
        {
            self.deactivate(DeactivationReason::NoConsumers, true).await;
        }
    }

    // ---------------------------------------------------------------------
    // Configuration
    // ---------------------------------------------------------------------

    async fn on_configuration_event(&mut self, event: ConfigurationEvent) {
        let pid = self.shared.description.configuration_pid().to_string();

        if self.is_factory_root() {
            if self.context.config.factory_enabled && event.factory_pid.as_deref() == Some(&pid) {
                let factory = self.shared.factory.read().clone();
                if let Some(factory) = factory {
                    match event.kind {
                        ConfigurationEventKind::Updated => {
                            let configurations = self.context.configuration.factory_configurations(&pid);
                            if let Some((_, properties)) =
                                configurations.into_iter().find(|(p, _)| *p == event.pid)
                            {
                                factory.configure(&event.pid, properties).await;
                            }
                        }
                        ConfigurationEventKind::Deleted => factory.unconfigure(&event.pid).await,
                    }
                }
            }
            return;
        }

        if event.pid != pid || event.factory_pid.is_some() {
            return;
        }

        self.configuration = match event.kind {
            ConfigurationEventKind::Updated => self.context.configuration.get_properties(&pid),
            ConfigurationEventKind::Deleted => None,
        };
        info!(component = %self.name(), pid = %pid, kind = ?event.kind, "[Manager] Configuration changed");
        self.refresh_properties();
        self.configuration_changed().await;
    }

    async fn resync_configuration(&mut self) {
        let pid = self.shared.description.configuration_pid().to_string();
        if self.is_factory_root() {
            if self.context.config.factory_enabled {
                let factory = self.shared.factory.read().clone();
                if let Some(factory) = factory {
                    factory
                        .sync_configurations(self.context.configuration.factory_configurations(&pid))
                        .await;
                }
            }
            return;
        }

        let current = self.context.configuration.get_properties(&pid);
        if current != self.configuration {
            self.configuration = current;
            self.refresh_properties();
            self.configuration_changed().await;
        }
    }

    async fn configuration_changed(&mut self) {
        let required = self.shared.description.configuration_policy == ConfigurationPolicy::Require;
        let missing = self.configuration.is_none();

        match self.state() {
            ComponentState::Unsatisfied => {
                if self.is_satisfied() {
                    self.evaluate().await;
                }
            }
            ComponentState::Registered => {
                if required && missing {
                    self.unregister_service();
                    self.transition(ComponentState::Unsatisfied);
                } else {
                    self.update_registration_properties();
                }
            }
            ComponentState::Active => {
                if required && missing {
                    self.deactivate(DeactivationReason::ConfigurationDeleted, false)
                        .await;
                    return;
                }

                if let Some(method) = self.shared.description.modified.clone() {
                    let properties = self.shared.properties.read().clone();
                    if let Some(instance) = self.instance.as_mut() {
                        match instance.modified(&method, &properties).await {
                            Ok(()) => {
                                self.update_registration_properties();
                                return;
                            }
                            Err(e) => warn!(
                                component = %self.name(),
                                error = %e,
                                "[Manager] Modified method failed, reactivating"
                            ),
                        }
                    }
                }

                self.deactivate(DeactivationReason::ConfigurationModified, false)
                    .await;
                self.evaluate().await;
            }
            _ => {}
        }
    }

    // ---------------------------------------------------------------------
    // Factory
    // ---------------------------------------------------------------------

    async fn enter_factory(&mut self) {
        let description = self.shared.description.clone();
        let Some(factory_id) = description.factory.clone() else {
            return;
        };

        let factory = Arc::new(ComponentFactory::new(
            factory_id.clone(),
            self.shared.module,
            description.clone(),
            self.registry.clone(),
        ));

        let properties = Properties::new()
            .with(keys::COMPONENT_FACTORY, factory_id.as_str())
            .with(keys::COMPONENT_NAME, description.name.as_str())
            .with(keys::COMPONENT_ID, self.shared.id.0);
        let object: ServiceObject = factory.clone();
        let token = self.context.publisher.register_service(
            vec![FACTORY_INTERFACE.to_string()],
            properties,
            Arc::new(SingletonService::new(object)),
        );
        *self.shared.registration.write() = Some(token.id);
        self.registration = Some(token);
        *self.shared.factory.write() = Some(factory.clone());

        self.transition(ComponentState::Factory);
        info!("[Manager] Component {} is factory {}", description.name, factory_id);

        if self.context.config.factory_enabled {
            let configurations = self
                .context
                .configuration
                .factory_configurations(description.configuration_pid());
            factory.sync_configurations(configurations).await;
        }
    }
}

fn spawn_service_forwarder(
    mut subscription: Subscription,
    commands: mpsc::WeakUnboundedSender<Command>,
    epoch: u64,
    reference: usize,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let command = match subscription.recv().await {
                Ok(event) => Command::Service {
                    epoch,
                    reference,
                    event,
                },
                Err(SubscriptionError::Lagged(_)) => Command::Resync { epoch, reference },
                Err(SubscriptionError::Closed) => break,
            };
            let Some(sender) = commands.upgrade() else {
                break;
            };
            if sender.send(command).is_err() {
                break;
            }
        }
    })
}

fn spawn_configuration_forwarder(
    mut receiver: broadcast::Receiver<ConfigurationEvent>,
    commands: mpsc::WeakUnboundedSender<Command>,
    epoch: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let command = match receiver.recv().await {
                Ok(event) => Command::Configuration { epoch, event },
                Err(broadcast::error::RecvError::Lagged(_)) => Command::ConfigurationResync { epoch },
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let Some(sender) = commands.upgrade() else {
                break;
            };
            if sender.send(command).is_err() {
                break;
            }
        }
    })
}
