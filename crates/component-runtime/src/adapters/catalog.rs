//! # Instance Catalog
//!
//! [`InstanceProvider`] that maps implementation names to constructors.
//!
//! ```rust,ignore
//! let catalog = InstanceCatalog::new();
//! catalog.register("demo.Greeter", |ctx| Ok(Box::new(Greeter::new(ctx)) as _));
//! ```

use crate::error::InstanceError;
use crate::ports::{ActivationContext, ComponentInstance, InstanceProvider};
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::ComponentDescription;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

type Constructor =
    Arc<dyn Fn(&ActivationContext) -> Result<Box<dyn ComponentInstance>, InstanceError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct InstanceCatalog {
    constructors: Arc<RwLock<HashMap<String, Constructor>>>,
}

impl InstanceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the constructor for an implementation name.
    pub fn register<F>(&self, implementation: impl Into<String>, constructor: F)
    where
        F: Fn(&ActivationContext) -> Result<Box<dyn ComponentInstance>, InstanceError>
            + Send
            + Sync
            + 'static,
    {
        let implementation = implementation.into();
        debug!("[Catalog] Registered implementation {}", implementation);
        self.constructors
            .write()
            .insert(implementation, Arc::new(constructor));
    }

    pub fn contains(&self, implementation: &str) -> bool {
        self.constructors.read().contains_key(implementation)
    }
}

#[async_trait]
impl InstanceProvider for InstanceCatalog {
    /// Constructors are plain closures and may block, so they run on the
    /// blocking pool.
    async fn create_instance(
        &self,
        description: &ComponentDescription,
        ctx: &ActivationContext,
    ) -> Result<Box<dyn ComponentInstance>, InstanceError> {
        let constructor = self
            .constructors
            .read()
            .get(&description.implementation)
            .cloned()
            .ok_or_else(|| InstanceError::UnknownImplementation(description.implementation.clone()))?;
        let ctx = ctx.clone();
        tokio::task::spawn_blocking(move || constructor(&ctx))
            .await
            .map_err(|e| InstanceError::failed(format!("constructor panicked: {}", e)))?
    }
}
