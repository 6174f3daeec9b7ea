//! # Test Fixtures
//!
//! [`Harness`] wires a [`ComponentRegistry`] to fresh in-memory adapters and
//! one active module. [`RecordingInstance`] logs every lifecycle callback
//! into a shared [`Recorder`]; [`Latch`] holds an activation open so tests
//! can act while a manager sits in ACTIVATING.

use async_trait::async_trait;
use component_runtime::{
    ActivationContext, BoundService, ComponentInstance, ComponentManager, ComponentRegistry,
    DeactivationReason, EngineConfig, InstanceCatalog, InstanceError, RuntimeContext,
};
use parking_lot::Mutex;
use shared_bus::{
    InMemoryConfigurationStore, InMemoryModuleRegistry, InMemoryServiceRegistry,
    ServiceEventSource, ServicePublisher,
};
use shared_types::{
    keys, ComponentDescription, ComponentState, ModuleId, Properties, ServiceId, ServiceObject,
    ServiceToken,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

/// Upper bound for any wait in the suite.
pub const WAIT: Duration = Duration::from_secs(3);

/// One recorded lifecycle callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Activate(String),
    Deactivate(String, DeactivationReason),
    Modified(String),
    Bind(String, String, ServiceId),
    Unbind(String, String, ServiceId),
}

#[derive(Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Recorder {
    pub fn push(&self, call: Call) {
        self.calls.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| predicate(c)).count()
    }

    pub fn activations(&self, component: &str) -> usize {
        self.count(|c| matches!(c, Call::Activate(n) if n == component))
    }

    pub fn deactivations(&self, component: &str) -> usize {
        self.count(|c| matches!(c, Call::Deactivate(n, _) if n == component))
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

/// Blocks an activation until released.
#[derive(Clone)]
pub struct Latch {
    entered: Arc<Notify>,
    gate: Arc<Semaphore>,
}

impl Default for Latch {
    fn default() -> Self {
        Self {
            entered: Arc::new(Notify::new()),
            gate: Arc::new(Semaphore::new(0)),
        }
    }
}

impl Latch {
    async fn hold(&self) {
        self.entered.notify_one();
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
    }

    /// Wait until an activation is parked on the latch.
    pub async fn entered(&self) {
        tokio::time::timeout(WAIT, self.entered.notified())
            .await
            .expect("activation never reached the latch");
    }

    pub fn release(&self) {
        self.gate.add_permits(64);
    }
}

/// Knobs for instances built by [`Harness::install`].
#[derive(Clone, Default)]
pub struct Behaviour {
    pub fail_activate: bool,
    pub fail_bind: bool,
    pub fail_modified: bool,
    pub latch: Option<Latch>,
    pub activate_delay: Option<Duration>,
    /// Blocks the constructor thread before the instance exists.
    pub construct_delay: Option<Duration>,
}

pub struct RecordingInstance {
    name: String,
    recorder: Recorder,
    behaviour: Behaviour,
    object: ServiceObject,
}

#[async_trait]
impl ComponentInstance for RecordingInstance {
    async fn activate(&mut self, _method: &str, _ctx: &ActivationContext) -> Result<(), InstanceError> {
        if let Some(latch) = &self.behaviour.latch {
            latch.hold().await;
        }
        if let Some(delay) = self.behaviour.activate_delay {
            tokio::time::sleep(delay).await;
        }
        if self.behaviour.fail_activate {
            return Err(InstanceError::failed("activate refused"));
        }
        self.recorder.push(Call::Activate(self.name.clone()));
        Ok(())
    }

    async fn deactivate(&mut self, _method: &str, reason: DeactivationReason) {
        self.recorder.push(Call::Deactivate(self.name.clone(), reason));
    }

    async fn modified(&mut self, _method: &str, _properties: &Properties) -> Result<(), InstanceError> {
        if self.behaviour.fail_modified {
            return Err(InstanceError::failed("modified refused"));
        }
        self.recorder.push(Call::Modified(self.name.clone()));
        Ok(())
    }

    async fn bind(&mut self, reference: &str, service: &BoundService) -> Result<(), InstanceError> {
        if self.behaviour.fail_bind {
            return Err(InstanceError::failed("bind refused"));
        }
        self.recorder.push(Call::Bind(
            self.name.clone(),
            reference.to_string(),
            service.token.id,
        ));
        Ok(())
    }

    async fn unbind(&mut self, reference: &str, service: &BoundService) {
        self.recorder.push(Call::Unbind(
            self.name.clone(),
            reference.to_string(),
            service.token.id,
        ));
    }

    fn service_object(&self) -> Option<ServiceObject> {
        Some(self.object.clone())
    }
}

pub struct Harness {
    pub services: Arc<InMemoryServiceRegistry>,
    pub modules: Arc<InMemoryModuleRegistry>,
    pub configuration: Arc<InMemoryConfigurationStore>,
    pub catalog: InstanceCatalog,
    pub registry: ComponentRegistry,
    pub recorder: Recorder,
    pub module: ModuleId,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig {
            lock_timeout_ms: 1000,
            ..EngineConfig::default()
        })
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let services = Arc::new(InMemoryServiceRegistry::new());
        let modules = Arc::new(InMemoryModuleRegistry::new());
        let configuration = Arc::new(InMemoryConfigurationStore::new());
        let catalog = InstanceCatalog::new();
        let module = modules.install("org.test.components");
        modules.start(module);

        let context = RuntimeContext::new(
            config,
            services.clone(),
            modules.clone(),
            Arc::new(catalog.clone()),
        )
        .with_configuration(configuration.clone());
        let registry = ComponentRegistry::new(context);
        registry.watch_modules();

        let harness = Self {
            services,
            modules,
            configuration,
            catalog,
            registry,
            recorder: Recorder::default(),
            module,
        };
        harness.install("recording", Behaviour::default());
        harness
    }

    /// Register an implementation that records into the shared recorder.
    pub fn install(&self, implementation: &str, behaviour: Behaviour) {
        let recorder = self.recorder.clone();
        self.catalog.register(implementation, move |ctx| {
            if let Some(delay) = behaviour.construct_delay {
                std::thread::sleep(delay);
            }
            let object: ServiceObject = Arc::new(ctx.component_name.clone());
            Ok(Box::new(RecordingInstance {
                name: ctx.component_name.clone(),
                recorder: recorder.clone(),
                behaviour: behaviour.clone(),
                object,
            }) as Box<dyn ComponentInstance>)
        });
    }

    pub async fn register(&self, description: ComponentDescription) -> ComponentManager {
        self.registry
            .register(description, self.module)
            .await
            .expect("registration failed")
    }

    /// Publish a plain service with a ranking.
    pub fn publish(&self, interface: &str, ranking: i64) -> ServiceToken {
        self.publish_with(interface, Properties::new().with(keys::SERVICE_RANKING, ranking))
    }

    pub fn publish_with(&self, interface: &str, properties: Properties) -> ServiceToken {
        self.services
            .register_object(vec![interface.to_string()], properties, Arc::new(interface.to_string()))
    }

    pub fn unpublish(&self, token: &ServiceToken) {
        self.services
            .unregister_service(token.id)
            .expect("service was not registered");
    }

    /// Number of live registrations for an interface.
    pub fn published(&self, interface: &str) -> usize {
        self.services.find_candidates(interface, None).len()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// A component with the given name, using the recording implementation.
pub fn component(name: &str) -> shared_types::ComponentBuilder {
    ComponentDescription::builder(name)
        .implementation("recording")
        .activate("activate")
        .deactivate("deactivate")
}

/// Poll `condition` until it holds or [`WAIT`] elapses.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn reach(manager: &ComponentManager, state: ComponentState) {
    assert!(
        manager.wait_for_state(state, WAIT).await,
        "{} stuck in {} waiting for {}",
        manager.name(),
        manager.state(),
        state
    );
}

/// Ids bound on the manager's reference at `index`.
pub fn bound_ids(manager: &ComponentManager, index: usize) -> Vec<ServiceId> {
    manager.references()[index].bound.iter().map(|t| t.id).collect()
}

/// Run `future` under [`WAIT`].
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(WAIT, future)
        .await
        .expect("operation timed out")
}
