//! Outbound (Driven) ports for the component runtime.
//!
//! The service, configuration and module ports live in `shared-bus`; this
//! module adds the one capability the engine needs from the code that
//! implements components: creating instances and calling their lifecycle
//! methods.

use crate::error::InstanceError;
use async_trait::async_trait;
use serde::Serialize;
use shared_types::{ComponentDescription, ComponentId, Properties, ServiceObject, ServiceToken};
use std::fmt;

/// Passed to the instance provider and to the activate callback.
#[derive(Debug, Clone)]
pub struct ActivationContext {
    pub component_id: ComponentId,
    pub component_name: String,
    /// Description properties overlaid with configuration and instance
    /// properties, plus `component.name` and `component.id`.
    pub properties: Properties,
}

/// A service handed to a component instance through `bind`.
#[derive(Clone)]
pub struct BoundService {
    pub token: ServiceToken,
    pub object: ServiceObject,
}

impl fmt::Debug for BoundService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundService")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

/// Why an instance is being deactivated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeactivationReason {
    /// A mandatory reference lost its last service.
    ReferenceUnsatisfied,
    /// A static reference was rebound.
    Rebind,
    /// Configuration changed without a modified method.
    ConfigurationModified,
    /// Required configuration was deleted.
    ConfigurationDeleted,
    /// The component was disabled.
    Disabled,
    /// The component was disposed.
    Disposed,
    /// The last consumer of a delayed component released it.
    NoConsumers,
    /// An activation was rolled back.
    ActivationAborted,
}

/// A live component object.
///
/// Callbacks are only invoked when the description declares the matching
/// method; `method` carries the declared identifier.
#[async_trait]
pub trait ComponentInstance: Send + Sync {
    async fn activate(&mut self, _method: &str, _ctx: &ActivationContext) -> Result<(), InstanceError> {
        Ok(())
    }

    async fn deactivate(&mut self, _method: &str, _reason: DeactivationReason) {}

    async fn modified(&mut self, _method: &str, _properties: &Properties) -> Result<(), InstanceError> {
        Ok(())
    }

    /// Called for every bound service, before `activate` and on dynamic
    /// rebinding.
    async fn bind(&mut self, _reference: &str, _service: &BoundService) -> Result<(), InstanceError> {
        Ok(())
    }

    async fn unbind(&mut self, _reference: &str, _service: &BoundService) {}

    /// Object published under the component's service interfaces.
    fn service_object(&self) -> Option<ServiceObject> {
        None
    }
}

/// Creates component instances from an implementation token.
///
/// Instantiation runs inside the activation timeout, so implementations
/// must not block the calling task.
#[async_trait]
pub trait InstanceProvider: Send + Sync {
    async fn create_instance(
        &self,
        description: &ComponentDescription,
        ctx: &ActivationContext,
    ) -> Result<Box<dyn ComponentInstance>, InstanceError>;
}
