//! # Component Factory
//!
//! Published while a factory component sits in FACTORY state. Each
//! `new_instance` call creates, registers and enables a fresh manager built
//! from the factory's description plus the caller's properties.
//!
//! When factory configurations are enabled, every configuration whose
//! factory pid matches the component's configuration pid also yields one
//! instance, replaced on update and disposed on delete.

use crate::error::LifecycleError;
use crate::service::manager::ComponentManager;
use crate::service::registry::{ComponentRegistry, RegistryInner};
use parking_lot::Mutex;
use shared_types::{ComponentDescription, ModuleId, Properties};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{info, warn};

/// Interface under which factories are published.
pub const FACTORY_INTERFACE: &str = "component.factory";

pub struct ComponentFactory {
    factory_id: String,
    module: ModuleId,
    description: Arc<ComponentDescription>,
    registry: Weak<RegistryInner>,
    instances: Mutex<Vec<ComponentManager>>,
    configured: Mutex<BTreeMap<String, ComponentManager>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for ComponentFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentFactory")
            .field("factory_id", &self.factory_id)
            .field("component", &self.description.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ComponentFactory {
    pub(crate) fn new(
        factory_id: String,
        module: ModuleId,
        description: Arc<ComponentDescription>,
        registry: Weak<RegistryInner>,
    ) -> Self {
        Self {
            factory_id,
            module,
            description,
            registry,
            instances: Mutex::new(Vec::new()),
            configured: Mutex::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn factory_id(&self) -> &str {
        &self.factory_id
    }

    pub fn component_name(&self) -> &str {
        &self.description.name
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Live managers created by this factory, explicit and configured.
    pub fn instances(&self) -> Vec<ComponentManager> {
        let mut all = self.instances.lock().clone();
        all.extend(self.configured.lock().values().cloned());
        all.retain(|m| !m.state().is_disposed());
        all.sort_by_key(ComponentManager::id);
        all
    }

    /// Create and enable a new instance.
    ///
    /// # Errors
    /// - `FactoryClosed`: the factory's component left FACTORY state
    /// - `RegistryClosed`: the owning registry is gone
    pub async fn new_instance(&self, properties: Properties) -> Result<ComponentManager, LifecycleError> {
        let manager = self.spawn_instance(properties)?;
        let accepted = {
            let mut instances = self.instances.lock();
            if self.is_closed() {
                false
            } else {
                instances.retain(|m| !m.state().is_disposed());
                instances.push(manager.clone());
                true
            }
        };
        if !accepted {
            self.discard(&manager).await;
            return Err(LifecycleError::FactoryClosed(self.factory_id.clone()));
        }

        self.start(&manager).await;
        Ok(manager)
    }

    fn spawn_instance(&self, properties: Properties) -> Result<ComponentManager, LifecycleError> {
        if self.is_closed() {
            return Err(LifecycleError::FactoryClosed(self.factory_id.clone()));
        }
        let registry =
            ComponentRegistry::upgrade(&self.registry).ok_or(LifecycleError::RegistryClosed)?;
        Ok(registry.spawn_manager(self.module, self.description.clone(), properties, true))
    }

    async fn start(&self, manager: &ComponentManager) {
        if let Err(e) = manager.enable().await {
            warn!("[Factory] Instance {} of {} did not enable: {}", manager.id(), self.factory_id, e);
            return;
        }
        info!(
            "[Factory] Created instance {} of {} ({})",
            manager.id(),
            self.factory_id,
            manager.state()
        );
    }

    /// Dispose a manager and drop it from the registry.
    async fn discard(&self, manager: &ComponentManager) {
        manager.dispose().await;
        if let Some(registry) = ComponentRegistry::upgrade(&self.registry) {
            registry.forget(manager.id());
        }
    }

    /// Replace the instance tied to a factory configuration.
    pub(crate) async fn configure(&self, pid: &str, properties: Properties) {
        let previous = self.configured.lock().remove(pid);
        if let Some(previous) = previous {
            self.discard(&previous).await;
        }

        let manager = match self.spawn_instance(properties) {
            Ok(manager) => manager,
            Err(e) => {
                warn!("[Factory] Configuration {} ignored: {}", pid, e);
                return;
            }
        };
        let accepted = {
            let mut configured = self.configured.lock();
            if self.is_closed() {
                false
            } else {
                configured.insert(pid.to_string(), manager.clone());
                true
            }
        };
        if accepted {
            self.start(&manager).await;
        } else {
            self.discard(&manager).await;
        }
    }

    pub(crate) async fn unconfigure(&self, pid: &str) {
        let previous = self.configured.lock().remove(pid);
        if let Some(previous) = previous {
            info!("[Factory] Configuration {} deleted, disposing {}", pid, previous.id());
            self.discard(&previous).await;
        }
    }

    /// Bring configured instances in line with the given configurations.
    /// Existing instances whose configuration still exists are kept.
    pub(crate) async fn sync_configurations(&self, configurations: Vec<(String, Properties)>) {
        let stale: Vec<String> = self
            .configured
            .lock()
            .keys()
            .filter(|pid| !configurations.iter().any(|(p, _)| p == *pid))
            .cloned()
            .collect();
        for pid in stale {
            self.unconfigure(&pid).await;
        }

        for (pid, properties) in configurations {
            let known = self.configured.lock().contains_key(&pid);
            if !known {
                self.configure(&pid, properties).await;
            }
        }
    }

    /// Close the factory and dispose everything it produced.
    pub(crate) async fn dispose_all(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut managers: Vec<ComponentManager> = self.instances.lock().drain(..).collect();
        managers.extend(std::mem::take(&mut *self.configured.lock()).into_values());
        managers.sort_by_key(ComponentManager::id);

        if !managers.is_empty() {
            info!(
                "[Factory] Disposing {} instance(s) of {}",
                managers.len(),
                self.factory_id
            );
        }
        for manager in managers {
            self.discard(&manager).await;
        }
    }
}
