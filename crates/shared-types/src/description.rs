//! # Component Descriptions
//!
//! Immutable metadata describing a component and the services it requires
//! and provides. A description is built once and shared read-only by every
//! manager created from it.
//!
//! ## Example
//!
//! ```rust,ignore
//! let description = ComponentDescription::builder("org.example.Consumer")
//!     .implementation("ConsumerImpl")
//!     .provides("api.Consumer")
//!     .reference(
//!         ReferenceDescription::builder("greeter", "api.Greeter")
//!             .cardinality(Cardinality::MandatorySingle)
//!             .policy(ReferencePolicy::Dynamic)
//!             .build(),
//!     )
//!     .build()?;
//! ```

use crate::errors::DescriptionError;
use crate::filter::TargetFilter;
use crate::properties::Properties;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Component manager identifier, assigned by the registry in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(pub u64);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the module (bundle) that owns a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId(pub u64);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How many services a reference binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// 0..1
    OptionalSingle,
    /// 1..1
    MandatorySingle,
    /// 0..n
    OptionalMultiple,
    /// 1..n
    MandatoryMultiple,
}

impl Cardinality {
    /// Minimum bound services for the reference to be satisfied.
    pub fn min(self) -> usize {
        match self {
            Self::OptionalSingle | Self::OptionalMultiple => 0,
            Self::MandatorySingle | Self::MandatoryMultiple => 1,
        }
    }

    /// Maximum bound services; `None` is unbounded.
    pub fn max(self) -> Option<usize> {
        match self {
            Self::OptionalSingle | Self::MandatorySingle => Some(1),
            Self::OptionalMultiple | Self::MandatoryMultiple => None,
        }
    }

    pub fn is_optional(self) -> bool {
        self.min() == 0
    }

    pub fn is_multiple(self) -> bool {
        self.max().is_none()
    }

    /// Whether `bound` more services fit.
    pub fn has_room(self, bound: usize) -> bool {
        self.max().map_or(true, |max| bound < max)
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::OptionalSingle => "0..1",
            Self::MandatorySingle => "1..1",
            Self::OptionalMultiple => "0..n",
            Self::MandatoryMultiple => "1..n",
        };
        write!(f, "{}", text)
    }
}

/// Whether a binding may change on a live instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePolicy {
    /// Bound once per activation; rebinding needs a full reactivation.
    Static,
    /// Rebound on the live instance.
    Dynamic,
}

impl fmt::Display for ReferencePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static => write!(f, "static"),
            Self::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// Whether a better-ranked candidate displaces the current binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyOption {
    /// Keep the current binding until it disappears.
    Reluctant,
    /// Always prefer the highest-ranked candidate.
    Greedy,
}

impl fmt::Display for PolicyOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reluctant => write!(f, "reluctant"),
            Self::Greedy => write!(f, "greedy"),
        }
    }
}

/// How a component's service object is shared among consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceScope {
    Singleton,
    PerConsumer,
    PerRegistration,
}

impl fmt::Display for ServiceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Singleton => write!(f, "singleton"),
            Self::PerConsumer => write!(f, "per-consumer"),
            Self::PerRegistration => write!(f, "per-registration"),
        }
    }
}

/// Whether configuration data is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigurationPolicy {
    /// Never consulted.
    Ignore,
    /// Used when present.
    Optional,
    /// Activation blocked until present.
    Require,
}

impl fmt::Display for ConfigurationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ignore => write!(f, "ignore"),
            Self::Optional => write!(f, "optional"),
            Self::Require => write!(f, "require"),
        }
    }
}

/// A declared dependency on a service interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDescription {
    pub name: String,
    pub interface: String,
    pub cardinality: Cardinality,
    pub policy: ReferencePolicy,
    pub policy_option: PolicyOption,
    pub target: Option<TargetFilter>,
}

impl ReferenceDescription {
    /// Start a builder. Defaults: mandatory single, static, reluctant.
    pub fn builder(name: impl Into<String>, interface: impl Into<String>) -> ReferenceBuilder {
        ReferenceBuilder {
            reference: ReferenceDescription {
                name: name.into(),
                interface: interface.into(),
                cardinality: Cardinality::MandatorySingle,
                policy: ReferencePolicy::Static,
                policy_option: PolicyOption::Reluctant,
                target: None,
            },
        }
    }

    pub fn is_static(&self) -> bool {
        self.policy == ReferencePolicy::Static
    }

    pub fn is_greedy(&self) -> bool {
        self.policy_option == PolicyOption::Greedy
    }
}

/// Fluent builder for [`ReferenceDescription`].
#[derive(Debug, Clone)]
pub struct ReferenceBuilder {
    reference: ReferenceDescription,
}

impl ReferenceBuilder {
    pub fn cardinality(mut self, cardinality: Cardinality) -> Self {
        self.reference.cardinality = cardinality;
        self
    }

    pub fn policy(mut self, policy: ReferencePolicy) -> Self {
        self.reference.policy = policy;
        self
    }

    pub fn policy_option(mut self, option: PolicyOption) -> Self {
        self.reference.policy_option = option;
        self
    }

    pub fn greedy(self) -> Self {
        self.policy_option(PolicyOption::Greedy)
    }

    pub fn target(mut self, filter: TargetFilter) -> Self {
        self.reference.target = Some(filter);
        self
    }

    pub fn build(self) -> ReferenceDescription {
        self.reference
    }
}

/// Immutable component metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDescription {
    /// Component name (unique per module by convention, not enforced).
    pub name: String,
    /// Type token handed to the instance provider.
    pub implementation: String,
    /// Interfaces published once active (or registered, when delayed).
    pub services: Vec<String>,
    pub scope: ServiceScope,
    pub activate: Option<String>,
    pub deactivate: Option<String>,
    pub modified: Option<String>,
    pub configuration_policy: ConfigurationPolicy,
    /// Declared configuration pid; the name is used when absent.
    pub configuration_pid: Option<String>,
    pub enabled: bool,
    pub immediate: bool,
    pub factory: Option<String>,
    /// Static component properties.
    pub properties: Properties,
    pub references: Vec<ReferenceDescription>,
}

impl ComponentDescription {
    /// Start a builder. Defaults: enabled, immediate, singleton scope,
    /// optional configuration, no callbacks.
    pub fn builder(name: impl Into<String>) -> ComponentBuilder {
        let name = name.into();
        ComponentBuilder {
            description: ComponentDescription {
                implementation: name.clone(),
                name,
                services: Vec::new(),
                scope: ServiceScope::Singleton,
                activate: None,
                deactivate: None,
                modified: None,
                configuration_policy: ConfigurationPolicy::Optional,
                configuration_pid: None,
                enabled: true,
                immediate: true,
                factory: None,
                properties: Properties::new(),
                references: Vec::new(),
            },
        }
    }

    /// Effective configuration pid.
    pub fn configuration_pid(&self) -> &str {
        self.configuration_pid.as_deref().unwrap_or(&self.name)
    }

    pub fn is_factory(&self) -> bool {
        self.factory.is_some()
    }

    pub fn provides_services(&self) -> bool {
        !self.services.is_empty()
    }

    /// Look up a reference by name.
    pub fn reference(&self, name: &str) -> Option<&ReferenceDescription> {
        self.references.iter().find(|r| r.name == name)
    }

    /// Validate structural constraints.
    pub fn validate(&self) -> Result<(), DescriptionError> {
        if self.name.trim().is_empty() {
            return Err(DescriptionError::EmptyName);
        }
        if self.implementation.trim().is_empty() {
            return Err(DescriptionError::MissingImplementation {
                component: self.name.clone(),
            });
        }

        let mut seen = HashSet::new();
        for reference in &self.references {
            if reference.name.trim().is_empty() {
                return Err(DescriptionError::EmptyReferenceName {
                    component: self.name.clone(),
                });
            }
            if reference.interface.trim().is_empty() {
                return Err(DescriptionError::MissingInterface {
                    component: self.name.clone(),
                    reference: reference.name.clone(),
                });
            }
            if !seen.insert(reference.name.as_str()) {
                return Err(DescriptionError::DuplicateReference {
                    component: self.name.clone(),
                    reference: reference.name.clone(),
                });
            }
        }

        let mut interfaces = HashSet::new();
        for service in &self.services {
            if !interfaces.insert(service.as_str()) {
                return Err(DescriptionError::DuplicateService {
                    component: self.name.clone(),
                    service: service.clone(),
                });
            }
        }

        if self.scope != ServiceScope::Singleton && !self.provides_services() {
            return Err(DescriptionError::ScopeWithoutService {
                component: self.name.clone(),
            });
        }

        if self.factory.is_some() && self.scope != ServiceScope::Singleton {
            return Err(DescriptionError::FactoryScope {
                component: self.name.clone(),
            });
        }

        Ok(())
    }
}

/// Fluent builder for [`ComponentDescription`].
#[derive(Debug, Clone)]
pub struct ComponentBuilder {
    description: ComponentDescription,
}

impl ComponentBuilder {
    pub fn implementation(mut self, implementation: impl Into<String>) -> Self {
        self.description.implementation = implementation.into();
        self
    }

    pub fn provides(mut self, interface: impl Into<String>) -> Self {
        self.description.services.push(interface.into());
        self
    }

    pub fn scope(mut self, scope: ServiceScope) -> Self {
        self.description.scope = scope;
        self
    }

    pub fn activate(mut self, method: impl Into<String>) -> Self {
        self.description.activate = Some(method.into());
        self
    }

    pub fn deactivate(mut self, method: impl Into<String>) -> Self {
        self.description.deactivate = Some(method.into());
        self
    }

    pub fn modified(mut self, method: impl Into<String>) -> Self {
        self.description.modified = Some(method.into());
        self
    }

    pub fn configuration_policy(mut self, policy: ConfigurationPolicy) -> Self {
        self.description.configuration_policy = policy;
        self
    }

    pub fn configuration_pid(mut self, pid: impl Into<String>) -> Self {
        self.description.configuration_pid = Some(pid.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.description.enabled = enabled;
        self
    }

    pub fn immediate(mut self, immediate: bool) -> Self {
        self.description.immediate = immediate;
        self
    }

    pub fn factory(mut self, factory: impl Into<String>) -> Self {
        self.description.factory = Some(factory.into());
        self
    }

    pub fn property(
        mut self,
        key: impl Into<String>,
        value: impl Into<crate::properties::PropertyValue>,
    ) -> Self {
        self.description.properties.insert(key, value);
        self
    }

    pub fn reference(mut self, reference: ReferenceDescription) -> Self {
        self.description.references.push(reference);
        self
    }

    /// Validate and produce the description.
    pub fn build(self) -> Result<ComponentDescription, DescriptionError> {
        self.description.validate()?;
        Ok(self.description)
    }
}
