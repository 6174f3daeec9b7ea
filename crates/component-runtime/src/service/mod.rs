//! # Service Layer
//!
//! The lifecycle engine: one task per component manager, the registry that
//! owns them, and the factories some of them publish.

pub mod context;
pub mod factory;
pub mod manager;
pub mod registry;

pub use context::RuntimeContext;
pub use factory::{ComponentFactory, FACTORY_INTERFACE};
pub use manager::ComponentManager;
pub use registry::ComponentRegistry;
