//! # Component Runtime Demo
//!
//! Wires the engine to the in-memory service registry, configuration store
//! and module registry, then walks a few components through their
//! lifecycle.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from the environment
//! 2. Initialise tracing
//! 3. Register components for one module and start it
//! 4. Print the management view as JSON
//! 5. Wait for Ctrl+C (skipped with `--once`), then shut down
//!
//! ```text
//! demo.Printer ──greeter (static, 1..1)──▶ demo.Greeter (delayed)
//! demo.Worker  ──factory demo.worker──▶ instances on request
//! ```

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use component_runtime::{
    register_command_frontend, telemetry, ActivationContext, BoundService, ComponentInstance,
    ComponentRegistry, DeactivationReason, EngineConfig, InstanceCatalog, InstanceError,
    ManagementApi, ManagementConsole, RuntimeContext,
};
use shared_bus::{InMemoryConfigurationStore, InMemoryModuleRegistry, InMemoryServiceRegistry};
use shared_types::{
    ComponentDescription, ComponentState, ConfigurationPolicy, Properties, ReferenceDescription,
    ServiceObject,
};

const GREETER_INTERFACE: &str = "demo.Greeter";

/// Object published by the greeter component.
struct GreeterService {
    greeting: String,
}

impl GreeterService {
    fn greet(&self, name: &str) -> String {
        format!("{}, {}!", self.greeting, name)
    }
}

struct Greeter {
    service: Arc<GreeterService>,
}

#[async_trait]
impl ComponentInstance for Greeter {
    async fn deactivate(&mut self, _method: &str, reason: DeactivationReason) {
        info!("[Demo] Greeter going away ({:?})", reason);
    }

    fn service_object(&self) -> Option<ServiceObject> {
        let object: Arc<dyn Any + Send + Sync> = self.service.clone();
        Some(object)
    }
}

#[derive(Default)]
struct Printer {
    greeter: Option<Arc<GreeterService>>,
}

#[async_trait]
impl ComponentInstance for Printer {
    async fn activate(&mut self, _method: &str, ctx: &ActivationContext) -> Result<(), InstanceError> {
        let greeter = self
            .greeter
            .as_ref()
            .ok_or_else(|| InstanceError::failed("greeter not bound"))?;
        info!("[Demo] {}", greeter.greet(&ctx.component_name));
        Ok(())
    }

    async fn bind(&mut self, _reference: &str, service: &BoundService) -> Result<(), InstanceError> {
        let greeter = service
            .object
            .clone()
            .downcast::<GreeterService>()
            .map_err(|_| InstanceError::failed("not a greeter"))?;
        self.greeter = Some(greeter);
        Ok(())
    }

    async fn unbind(&mut self, _reference: &str, _service: &BoundService) {
        self.greeter = None;
    }
}

struct Worker;

#[async_trait]
impl ComponentInstance for Worker {
    async fn activate(&mut self, _method: &str, ctx: &ActivationContext) -> Result<(), InstanceError> {
        info!(
            "[Demo] Worker {} started with task {}",
            ctx.component_id,
            ctx.properties.get_str("task").unwrap_or("none")
        );
        Ok(())
    }
}

fn catalog() -> InstanceCatalog {
    let catalog = InstanceCatalog::new();
    catalog.register("demo.GreeterImpl", |ctx| {
        let greeting = ctx
            .properties
            .get_str("greeting")
            .unwrap_or("Hello")
            .to_string();
        Ok(Box::new(Greeter {
            service: Arc::new(GreeterService { greeting }),
        }) as Box<dyn ComponentInstance>)
    });
    catalog.register("demo.PrinterImpl", |_| {
        Ok(Box::new(Printer::default()) as Box<dyn ComponentInstance>)
    });
    catalog.register("demo.WorkerImpl", |_| Ok(Box::new(Worker) as Box<dyn ComponentInstance>));
    catalog
}

fn descriptions() -> Result<Vec<ComponentDescription>> {
    Ok(vec![
        ComponentDescription::builder("demo.Greeter")
            .implementation("demo.GreeterImpl")
            .provides(GREETER_INTERFACE)
            .deactivate("deactivate")
            .configuration_policy(ConfigurationPolicy::Optional)
            .property("greeting", "Hello")
            .build()?,
        ComponentDescription::builder("demo.Printer")
            .implementation("demo.PrinterImpl")
            .immediate(true)
            .activate("activate")
            .reference(ReferenceDescription::builder("greeter", GREETER_INTERFACE).build())
            .build()?,
        ComponentDescription::builder("demo.Worker")
            .implementation("demo.WorkerImpl")
            .activate("activate")
            .factory("demo.worker")
            .build()?,
    ])
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = EngineConfig::from_env();
    config.validate().context("invalid engine configuration")?;
    telemetry::init_tracing(&config).context("failed to initialise tracing")?;

    info!("===========================================");
    info!("  Component Runtime Demo");
    info!("===========================================");

    let services = Arc::new(InMemoryServiceRegistry::new());
    let modules = Arc::new(InMemoryModuleRegistry::new());
    let configuration = Arc::new(InMemoryConfigurationStore::new());
    configuration.update(
        "demo.Greeter",
        Properties::new().with("greeting", "Good morning"),
    );

    let context = RuntimeContext::new(
        config.clone(),
        services.clone(),
        modules.clone(),
        Arc::new(catalog()),
    )
    .with_configuration(configuration);

    let registry = ComponentRegistry::new(context);
    registry.watch_modules();

    let console = ManagementConsole::new(registry.clone());
    console.update(config.info_as_service);
    register_command_frontend(&console);

    let module = modules.install("org.example.demo");
    for description in descriptions()? {
        registry.register(description, module).await?;
    }
    modules.start(module);

    let printer = registry
        .get_components_by_name("demo.Printer")
        .into_iter()
        .next()
        .context("printer component missing")?;
    if !printer
        .wait_for_state(ComponentState::Active, Duration::from_secs(5))
        .await
    {
        warn!("[Demo] Printer did not activate: {:?}", printer.last_failure());
    }

    let factory = registry
        .get_components_by_name("demo.Worker")
        .into_iter()
        .next()
        .context("worker factory missing")?;
    factory
        .wait_for_state(ComponentState::Factory, Duration::from_secs(5))
        .await;

    let worker = registry
        .new_instance("demo.worker", Properties::new().with("task", "reindex"))
        .await?;
    info!("[Demo] Created worker {} ({})", worker.id(), worker.state());

    println!("{}", serde_json::to_string_pretty(&console.list(None)?)?);
    println!("{}", serde_json::to_string_pretty(&console.info(Some("demo\\..*"))?)?);
    println!("{}", serde_json::to_string_pretty(&console.config())?);

    if !std::env::args().any(|arg| arg == "--once") {
        info!("Press Ctrl+C to stop");
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;
    }

    info!("Shutting down...");
    registry.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}
