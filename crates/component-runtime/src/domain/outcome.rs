//! Management-facing views of component managers.

use crate::domain::binding::ReferenceSnapshot;
use crate::error::LifecycleError;
use serde::Serialize;
use shared_types::{
    Cardinality, ComponentId, ComponentState, ConfigurationPolicy, ModuleId, PolicyOption,
    Properties, ReferencePolicy, ServiceId, ServiceScope,
};
use std::fmt;

/// One line of `list` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentSummary {
    pub id: ComponentId,
    pub name: String,
    pub module: ModuleId,
    pub state: ComponentState,
}

/// A bound service as shown by `info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundDetail {
    pub service_id: ServiceId,
    pub ranking: i64,
}

/// Per-reference detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceDetail {
    pub name: String,
    pub satisfied: bool,
    pub interface: String,
    pub target: Option<String>,
    pub cardinality: Cardinality,
    pub policy: ReferencePolicy,
    pub policy_option: PolicyOption,
    pub bound: Vec<BoundDetail>,
}

impl From<&ReferenceSnapshot> for ReferenceDetail {
    fn from(snapshot: &ReferenceSnapshot) -> Self {
        let description = &snapshot.description;
        Self {
            name: description.name.clone(),
            satisfied: snapshot.satisfied,
            interface: description.interface.clone(),
            target: description.target.as_ref().map(ToString::to_string),
            cardinality: description.cardinality,
            policy: description.policy,
            policy_option: description.policy_option,
            bound: snapshot
                .bound
                .iter()
                .map(|t| BoundDetail {
                    service_id: t.id,
                    ranking: t.rank,
                })
                .collect(),
        }
    }
}

/// Full `info` output for one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentDetail {
    pub id: ComponentId,
    pub name: String,
    pub module: ModuleId,
    pub state: ComponentState,
    pub implementation: String,
    pub default_enabled: bool,
    pub immediate: bool,
    pub services: Vec<String>,
    pub scope: ServiceScope,
    pub configuration_policy: ConfigurationPolicy,
    pub configuration_pid: String,
    pub configuration_pid_declared: bool,
    pub activate: Option<String>,
    pub deactivate: Option<String>,
    pub modified: Option<String>,
    pub factory: Option<String>,
    pub factory_instance: bool,
    pub service_id: Option<ServiceId>,
    pub properties: Properties,
    pub last_failure: Option<String>,
    pub references: Vec<ReferenceDetail>,
}

/// What an enable/disable/dispose request did to one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeResult {
    Enabled,
    AlreadyEnabled,
    Disabled,
    AlreadyDisabled,
    Disposed,
    AlreadyDisposed,
}

impl fmt::Display for ChangeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Enabled => "enabled",
            Self::AlreadyEnabled => "already enabled",
            Self::Disabled => "disabled",
            Self::AlreadyDisabled => "already disabled",
            Self::Disposed => "disposed",
            Self::AlreadyDisposed => "already disposed",
        };
        f.write_str(text)
    }
}

/// Per-component outcome of a batch command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeOutcome {
    pub id: ComponentId,
    pub name: String,
    pub result: ChangeResult,
}

impl fmt::Display for ChangeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component {} ({}) {}", self.name, self.id, self.result)
    }
}

/// Outcomes of a batch command, in id order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeReport {
    pub outcomes: Vec<ChangeOutcome>,
}

impl ChangeReport {
    /// Names of components that were found already disposed.
    pub fn disposed_names(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| o.result == ChangeResult::AlreadyDisposed)
            .map(|o| o.name.clone())
            .collect()
    }

    /// Turn disposed targets into one aggregate error.
    pub fn into_result(self) -> Result<Vec<ChangeOutcome>, LifecycleError> {
        let names = self.disposed_names();
        if names.is_empty() {
            Ok(self.outcomes)
        } else {
            Err(LifecycleError::AlreadyDisposed { names })
        }
    }
}
