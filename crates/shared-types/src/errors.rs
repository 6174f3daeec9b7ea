//! # Error Types
//!
//! Errors raised while building component descriptions.

use thiserror::Error;

/// Structural problems in a component description.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptionError {
    /// The component name is blank.
    #[error("Component name must not be empty")]
    EmptyName,

    /// No implementation type token.
    #[error("Component {component} declares no implementation")]
    MissingImplementation { component: String },

    /// A reference has a blank name.
    #[error("Component {component} declares a reference without a name")]
    EmptyReferenceName { component: String },

    /// A reference has a blank interface.
    #[error("Reference {reference} of component {component} declares no interface")]
    MissingInterface { component: String, reference: String },

    /// Two references share a name.
    #[error("Component {component} declares reference {reference} more than once")]
    DuplicateReference { component: String, reference: String },

    /// A service interface is declared twice.
    #[error("Component {component} declares service {service} more than once")]
    DuplicateService { component: String, service: String },

    /// A non-singleton scope without any service to scope.
    #[error("Component {component} declares a service scope but provides no service")]
    ScopeWithoutService { component: String },

    /// Factory components only support the singleton scope.
    #[error("Factory component {component} must use the singleton service scope")]
    FactoryScope { component: String },
}
