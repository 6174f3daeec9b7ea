//! # Component Registry
//!
//! Owns every [`ComponentManager`] by id and ties them to module lifecycle.
//!
//! ## Features
//!
//! - **Registration**: validates descriptions and assigns ascending ids
//! - **Module tracking**: enables components when their module starts,
//!   disposes and forgets them when it stops
//! - **Lookup**: by id, exact name, or full-match name pattern
//! - **Factories**: routes `new_instance` to the manager publishing a factory
//!
//! ## Usage
//!
//! ```rust,ignore
//! let registry = ComponentRegistry::new(context);
//! registry.watch_modules();
//!
//! let manager = registry.register(description, module).await?;
//! registry.disable("greeter").await?;
//!
//! registry.shutdown().await;
//! ```

use crate::domain::{ChangeOutcome, ChangeReport, ChangeResult};
use crate::error::LifecycleError;
use crate::service::context::RuntimeContext;
use crate::service::manager::{ComponentManager, ManagerParams};
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use shared_bus::ModuleEvent;
use shared_types::{ComponentDescription, ComponentId, ComponentState, ModuleId, Properties};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub(crate) struct RegistryInner {
    components: RwLock<BTreeMap<ComponentId, ComponentManager>>,
    next_id: AtomicU64,
    context: RuntimeContext,
    watcher: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.get_mut().take() {
            watcher.abort();
        }
    }
}

/// Central registry for all component managers.
#[derive(Clone)]
pub struct ComponentRegistry {
    inner: Arc<RegistryInner>,
}

impl ComponentRegistry {
    pub fn new(context: RuntimeContext) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                components: RwLock::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                context,
                watcher: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.inner.context
    }

    pub(crate) fn downgrade(&self) -> Weak<RegistryInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<RegistryInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn len(&self) -> usize {
        self.inner.components.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.components.read().is_empty()
    }

    /// Register a component description for a module.
    ///
    /// The manager starts DISABLED and is enabled right away when the
    /// description is default-enabled and the module is active.
    ///
    /// # Errors
    /// - `Description`: the description failed validation
    /// - `RegistryClosed`: `shutdown` already ran
    pub async fn register(
        &self,
        description: ComponentDescription,
        module: ModuleId,
    ) -> Result<ComponentManager, LifecycleError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(LifecycleError::RegistryClosed);
        }
        description.validate()?;

        let manager = self.spawn_manager(module, Arc::new(description), Properties::new(), false);
        info!(
            "[Registry] Registered component {} ({}) for module {}",
            manager.name(),
            manager.id(),
            module
        );

        if manager.description().enabled && self.module_active(module) {
            if let Err(e) = manager.enable().await {
                warn!("[Registry] Component {} did not enable: {}", manager.id(), e);
            }
        }
        Ok(manager)
    }

    pub(crate) fn spawn_manager(
        &self,
        module: ModuleId,
        description: Arc<ComponentDescription>,
        instance_properties: Properties,
        factory_instance: bool,
    ) -> ComponentManager {
        let id = ComponentId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let manager = ComponentManager::spawn(
            ManagerParams {
                id,
                module,
                description,
                instance_properties,
                factory_instance,
            },
            self.inner.context.clone(),
            self.downgrade(),
        );
        self.inner.components.write().insert(id, manager.clone());
        manager
    }

    /// Drop a manager from the map without touching its state.
    pub(crate) fn forget(&self, id: ComponentId) -> Option<ComponentManager> {
        self.inner.components.write().remove(&id)
    }

    fn module_active(&self, module: ModuleId) -> bool {
        self.inner
            .context
            .modules
            .module(module)
            .is_some_and(|m| m.active)
    }

    // ---------------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------------

    /// All managers sorted by id, optionally for one module.
    pub fn get_components(&self, module: Option<ModuleId>) -> Vec<ComponentManager> {
        self.inner
            .components
            .read()
            .values()
            .filter(|m| module.map_or(true, |id| m.module() == id))
            .cloned()
            .collect()
    }

    pub fn get_component(&self, id: ComponentId) -> Option<ComponentManager> {
        self.inner.components.read().get(&id).cloned()
    }

    pub fn get_components_by_name(&self, name: &str) -> Vec<ComponentManager> {
        self.inner
            .components
            .read()
            .values()
            .filter(|m| m.name() == name)
            .cloned()
            .collect()
    }

    /// Resolve an identifier to managers: numeric id, then exact name, then
    /// a pattern that must match the whole name.
    ///
    /// # Errors
    /// - `NotFound`: nothing matched
    /// - `InvalidPattern`: the identifier is not a valid pattern
    pub fn resolve(&self, ident: &str) -> Result<Vec<ComponentManager>, LifecycleError> {
        let ident = ident.trim();
        if let Ok(number) = ident.parse::<u64>() {
            return self
                .get_component(ComponentId(number))
                .map(|m| vec![m])
                .ok_or_else(|| LifecycleError::NotFound(ident.to_string()));
        }

        let exact = self.get_components_by_name(ident);
        if !exact.is_empty() {
            return Ok(exact);
        }

        let pattern = Regex::new(&format!("^(?:{})$", ident)).map_err(|e| {
            LifecycleError::InvalidPattern {
                pattern: ident.to_string(),
                reason: e.to_string(),
            }
        })?;
        let matched: Vec<ComponentManager> = self
            .inner
            .components
            .read()
            .values()
            .filter(|m| pattern.is_match(m.name()))
            .cloned()
            .collect();

        if matched.is_empty() {
            Err(LifecycleError::NotFound(ident.to_string()))
        } else {
            Ok(matched)
        }
    }

    // ---------------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------------

    /// Enable every matching component. Disposed targets are reported, the
    /// rest still run.
    pub async fn enable(&self, ident: &str) -> Result<ChangeReport, LifecycleError> {
        let mut report = ChangeReport::default();
        for manager in self.resolve(ident)? {
            let result = match manager.enable().await {
                Ok(true) => ChangeResult::Enabled,
                Ok(false) => ChangeResult::AlreadyEnabled,
                Err(LifecycleError::Disposed { .. }) => ChangeResult::AlreadyDisposed,
                Err(e) => return Err(e),
            };
            report.outcomes.push(outcome(&manager, result));
        }
        Ok(report)
    }

    pub async fn disable(&self, ident: &str) -> Result<ChangeReport, LifecycleError> {
        let mut report = ChangeReport::default();
        for manager in self.resolve(ident)? {
            let result = match manager.disable().await {
                Ok(true) => ChangeResult::Disabled,
                Ok(false) => ChangeResult::AlreadyDisabled,
                Err(LifecycleError::Disposed { .. }) => ChangeResult::AlreadyDisposed,
                Err(e) => return Err(e),
            };
            report.outcomes.push(outcome(&manager, result));
        }
        Ok(report)
    }

    /// Dispose every matching component. Disposed managers stay listed.
    pub async fn dispose(&self, ident: &str) -> Result<ChangeReport, LifecycleError> {
        let mut report = ChangeReport::default();
        for manager in self.resolve(ident)? {
            let result = if manager.dispose().await {
                ChangeResult::Disposed
            } else {
                ChangeResult::AlreadyDisposed
            };
            report.outcomes.push(outcome(&manager, result));
        }
        Ok(report)
    }

    /// Ask the factory with `factory_id` for a new instance.
    ///
    /// # Errors
    /// - `FactoryNotFound`: no component in FACTORY state declares the id
    /// - `FactoryClosed`: the factory closed while creating
    pub async fn new_instance(
        &self,
        factory_id: &str,
        properties: Properties,
    ) -> Result<ComponentManager, LifecycleError> {
        let factory = self
            .inner
            .components
            .read()
            .values()
            .filter(|m| m.state() == ComponentState::Factory)
            .find(|m| m.description().factory.as_deref() == Some(factory_id))
            .and_then(ComponentManager::factory)
            .ok_or_else(|| LifecycleError::FactoryNotFound(factory_id.to_string()))?;
        factory.new_instance(properties).await
    }

    // ---------------------------------------------------------------------
    // Module lifecycle
    // ---------------------------------------------------------------------

    /// Enable the module's default-enabled components that are still
    /// DISABLED and were not disabled on purpose.
    pub async fn module_started(&self, module: ModuleId) {
        let managers: Vec<ComponentManager> = self
            .get_components(Some(module))
            .into_iter()
            .filter(|m| {
                m.description().enabled
                    && m.state() == ComponentState::Disabled
                    && !m.is_explicitly_disabled()
                    && !m.is_factory_instance()
            })
            .collect();

        info!(
            "[Registry] Module {} started, enabling {} component(s)",
            module,
            managers.len()
        );
        for manager in managers {
            if let Err(e) = manager.enable().await {
                warn!("[Registry] Component {} did not enable: {}", manager.id(), e);
            }
        }
    }

    /// Disable, dispose and forget the module's components in ascending id
    /// order.
    pub async fn module_stopping(&self, module: ModuleId) {
        let managers = self.get_components(Some(module));
        info!(
            "[Registry] Module {} stopping, disposing {} component(s)",
            module,
            managers.len()
        );
        for manager in managers {
            if let Err(e) = manager.disable().await {
                debug!("[Registry] Component {} not disabled: {}", manager.id(), e);
            }
            manager.dispose().await;
            self.forget(manager.id());
        }
    }

    /// Follow module events until the registry is dropped or shut down.
    pub fn watch_modules(&self) {
        let mut events = self.inner.context.modules.subscribe();
        let registry = self.downgrade();

        let handle = tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("[Registry] Missed {} module event(s)", missed);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(registry) = ComponentRegistry::upgrade(&registry) else {
                    break;
                };
                match event {
                    ModuleEvent::Started(module) => registry.module_started(module).await,
                    ModuleEvent::Stopping(module) => registry.module_stopping(module).await,
                }
            }
        });

        if let Some(previous) = self.inner.watcher.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop watching modules and dispose every manager in ascending id
    /// order.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(watcher) = self.inner.watcher.lock().take() {
            watcher.abort();
        }

        let managers = self.get_components(None);
        info!("[Registry] Shutting down {} component(s)", managers.len());
        for manager in managers {
            manager.dispose().await;
        }
    }
}

fn outcome(manager: &ComponentManager, result: ChangeResult) -> ChangeOutcome {
    ChangeOutcome {
        id: manager.id(),
        name: manager.name().to_string(),
        result,
    }
}
