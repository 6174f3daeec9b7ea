//! # Component Runtime
//!
//! Manages the lifecycle of declaratively described components. Each
//! component declares the services it provides, the services it references
//! and how it reacts to configuration; the runtime binds references as
//! matching services come and go, activates components once satisfied and
//! tears them down when they are not.
//!
//! ## Architectural Patterns
//!
//! - **Hexagonal Architecture**: the engine talks to the service registry,
//!   configuration store and module lifecycle only through `shared-bus`
//!   ports, and to component code through [`ports::InstanceProvider`]
//! - **One task per component**: every [`ComponentManager`] serializes its
//!   transitions on its own command queue
//!
//! ## Module Layout
//!
//! - `domain/` - reference binding and the management view types
//! - `ports/` - management API and component instance traits
//! - `service/` - managers, registry and factories
//! - `adapters/` - instance catalog, management console, command front-end

#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_lines)]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;
pub mod telemetry;

pub use adapters::{register_command_frontend, InstanceCatalog, ManagementConsole};
pub use config::{ConfigSnapshot, EngineConfig};
pub use domain::{
    BindingDelta, ChangeOutcome, ChangeReport, ChangeResult, ComponentDetail, ComponentSummary,
    ReferenceManager, ReferenceSnapshot,
};
pub use error::{ActivationFailure, ConfigError, InstanceError, LifecycleError};
pub use ports::{
    ActivationContext, BoundService, ComponentInstance, DeactivationReason, InstanceProvider,
    ManagementApi,
};
pub use service::{ComponentFactory, ComponentManager, ComponentRegistry, RuntimeContext};
