//! Collaborators shared by the registry and every manager it creates.

use crate::config::EngineConfig;
use crate::ports::InstanceProvider;
use shared_bus::{
    ConfigurationSource, ModuleLifecycleSource, NoConfiguration, ServiceEventSource,
    ServicePublisher,
};
use std::sync::Arc;

/// Cheap-to-clone bundle of the engine's outbound ports.
#[derive(Clone)]
pub struct RuntimeContext {
    pub config: Arc<EngineConfig>,
    pub services: Arc<dyn ServiceEventSource>,
    pub publisher: Arc<dyn ServicePublisher>,
    pub configuration: Arc<dyn ConfigurationSource>,
    pub modules: Arc<dyn ModuleLifecycleSource>,
    pub instances: Arc<dyn InstanceProvider>,
}

impl RuntimeContext {
    /// Build a context around one service registry that serves both lookups
    /// and publication. Configuration defaults to [`NoConfiguration`].
    pub fn new<R>(
        config: EngineConfig,
        registry: Arc<R>,
        modules: Arc<dyn ModuleLifecycleSource>,
        instances: Arc<dyn InstanceProvider>,
    ) -> Self
    where
        R: ServiceEventSource + ServicePublisher + 'static,
    {
        Self {
            config: Arc::new(config),
            services: registry.clone(),
            publisher: registry,
            configuration: Arc::new(NoConfiguration),
            modules,
            instances,
        }
    }

    #[must_use]
    pub fn with_configuration(mut self, configuration: Arc<dyn ConfigurationSource>) -> Self {
        self.configuration = configuration;
        self
    }
}
