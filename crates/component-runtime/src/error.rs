//! # Error Types
//!
//! Only caller mistakes and conflicts surface as [`LifecycleError`].
//! Activation and binding problems are absorbed by the manager and recorded
//! as an [`ActivationFailure`].

use serde::Serialize;
use shared_types::{ComponentId, DescriptionError};
use thiserror::Error;

/// Errors returned to callers of the registry, managers and management API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// No component matched an id, name or pattern.
    #[error("Missing Component with ID {0}")]
    NotFound(String),

    /// The module filter named no installed module.
    #[error("Missing module with ID or name {0}")]
    ModuleNotFound(String),

    /// The module exists but is not active.
    #[error("Module {0} is not active")]
    ModuleNotActive(String),

    /// A command was sent to a disposed manager.
    #[error("Component {name} ({id}) has been disposed")]
    Disposed { id: ComponentId, name: String },

    /// Aggregate of every disposed target in a batch.
    #[error("Components already disposed: {}", names.join(", "))]
    AlreadyDisposed { names: Vec<String> },

    /// A name pattern failed to compile.
    #[error("Invalid component name pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// No manager in FACTORY state declares this factory id.
    #[error("No component factory {0}")]
    FactoryNotFound(String),

    /// The factory was disabled or disposed.
    #[error("Component factory {0} is closed")]
    FactoryClosed(String),

    /// The registry has been shut down.
    #[error("Component registry is shut down")]
    RegistryClosed,

    #[error(transparent)]
    Description(#[from] DescriptionError),
}

/// Why an activation attempt did not reach ACTIVE.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ActivationFailure {
    #[error("Failed to create component instance: {0}")]
    Instantiation(String),

    #[error("Activate method {method} failed: {reason}")]
    ActivateCallback { method: String, reason: String },

    #[error("Reference {reference} became unsatisfied during activation")]
    ReferenceUnsatisfied { reference: String },

    #[error("Activation timed out after {millis} ms")]
    Timeout { millis: u64 },

    #[error("Activation cancelled by a pending disable or dispose")]
    Cancelled,

    #[error("Required configuration {pid} is missing")]
    ConfigurationMissing { pid: String },

    #[error("Component provides no service object")]
    NoServiceObject,
}

/// Errors raised by component instances and instance providers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstanceError {
    #[error("No implementation registered for {0}")]
    UnknownImplementation(String),

    #[error("{0}")]
    Failed(String),
}

impl InstanceError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// Invalid engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Lock timeout must be greater than zero")]
    ZeroLockTimeout,

    #[error("Unknown log level {0}")]
    UnknownLogLevel(String),

    #[error("Invalid value {value} for {key}")]
    InvalidValue { key: String, value: String },
}
