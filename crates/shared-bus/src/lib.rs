//! # Shared Bus - Collaborator Ports for the Lifecycle Engine
//!
//! Everything the component runtime consumes from its host lives here:
//!
//! - **Services:** lookup, acquisition, publication and change events
//! - **Configuration:** property data per pid, factory configurations
//! - **Modules:** owning-module state and start/stop notifications
//!
//! Each port is a trait with an in-memory adapter built on
//! `tokio::sync::broadcast`.
//!
//! ```text
//! ┌──────────────────┐   register/unregister   ┌──────────────────┐
//! │ ComponentManager │ ──────────────────────▶ │ Service Registry │
//! │                  │ ◀────────────────────── │                  │
//! └──────────────────┘   ServiceEvent stream   └──────────────────┘
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod configuration;
pub mod events;
pub mod modules;
pub mod registry;
pub mod subscriber;

pub use configuration::{
    ConfigurationEvent, ConfigurationEventKind, ConfigurationSource, InMemoryConfigurationStore,
    NoConfiguration,
};
pub use events::{ServiceEvent, ServiceEventKind, ServiceFilter};
pub use modules::{InMemoryModuleRegistry, ModuleEvent, ModuleInfo, ModuleLifecycleSource};
pub use registry::{
    InMemoryServiceRegistry, ServiceError, ServiceEventSource, ServiceProvider, ServicePublisher,
    SingletonService,
};
pub use subscriber::{Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before it lags.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
