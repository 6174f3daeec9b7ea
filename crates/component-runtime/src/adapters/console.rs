//! # Management Console
//!
//! [`ManagementApi`] over a [`ComponentRegistry`]. Can also publish itself
//! as the `component.info` service so other modules can query components.

use crate::config::ConfigSnapshot;
use crate::domain::{ChangeReport, ComponentDetail, ComponentSummary};
use crate::error::LifecycleError;
use crate::ports::ManagementApi;
use crate::service::{ComponentManager, ComponentRegistry};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_bus::SingletonService;
use shared_types::{keys, ModuleId, Properties, ServiceId, ServiceObject};
use std::sync::Arc;
use tracing::{info, warn};

/// Interface of the published console.
pub const INFO_INTERFACE: &str = "component.info";

#[derive(Clone)]
pub struct ManagementConsole {
    registry: ComponentRegistry,
    info_registration: Arc<Mutex<Option<ServiceId>>>,
}

impl ManagementConsole {
    pub fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry,
            info_registration: Arc::new(Mutex::new(None)),
        }
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Publish or withdraw the `component.info` service.
    pub fn update(&self, info_as_service: bool) -> Option<ServiceId> {
        let publisher = &self.registry.context().publisher;
        let mut registration = self.info_registration.lock();

        match (info_as_service, *registration) {
            (true, None) => {
                let object: ServiceObject = Arc::new(self.clone());
                let token = publisher.register_service(
                    vec![INFO_INTERFACE.to_string()],
                    Properties::new().with(keys::SERVICE_RANKING, 0i64),
                    Arc::new(SingletonService::new(object)),
                );
                info!("[Console] Published {} as service {}", INFO_INTERFACE, token.id);
                *registration = Some(token.id);
            }
            (false, Some(id)) => {
                if let Err(e) = publisher.unregister_service(id) {
                    warn!("[Console] Could not withdraw {}: {}", INFO_INTERFACE, e);
                }
                *registration = None;
            }
            _ => {}
        }
        *registration
    }

    pub fn is_published(&self) -> bool {
        self.info_registration.lock().is_some()
    }

    fn resolve_module(&self, filter: &str) -> Result<ModuleId, LifecycleError> {
        let modules = &self.registry.context().modules;
        let found = match filter.trim().parse::<u64>() {
            Ok(number) => modules.module(ModuleId(number)),
            Err(_) => modules.find_by_name(filter.trim()),
        };
        let module = found.ok_or_else(|| LifecycleError::ModuleNotFound(filter.to_string()))?;
        if !module.active {
            return Err(LifecycleError::ModuleNotActive(filter.to_string()));
        }
        Ok(module.id)
    }
}

fn summary(manager: &ComponentManager) -> ComponentSummary {
    ComponentSummary {
        id: manager.id(),
        name: manager.name().to_string(),
        module: manager.module(),
        state: manager.state(),
    }
}

#[async_trait]
impl ManagementApi for ManagementConsole {
    fn list(&self, module: Option<&str>) -> Result<Vec<ComponentSummary>, LifecycleError> {
        let module = module.map(|m| self.resolve_module(m)).transpose()?;
        Ok(self
            .registry
            .get_components(module)
            .iter()
            .map(summary)
            .collect())
    }

    fn info(&self, ident: Option<&str>) -> Result<Vec<ComponentDetail>, LifecycleError> {
        let mut managers = match ident {
            Some(ident) => self.registry.resolve(ident)?,
            None => self.registry.get_components(None),
        };
        managers.sort_by_key(|m| (m.module(), m.id()));
        Ok(managers.iter().map(ComponentManager::detail).collect())
    }

    async fn enable(&self, ident: &str) -> Result<ChangeReport, LifecycleError> {
        self.registry.enable(ident).await
    }

    async fn disable(&self, ident: &str) -> Result<ChangeReport, LifecycleError> {
        self.registry.disable(ident).await
    }

    fn config(&self) -> ConfigSnapshot {
        self.registry.context().config.snapshot()
    }
}
