//! # Component State
//!
//! The externally visible lifecycle state of a component manager.
//!
//! ```text
//! DISABLED ─enable→ ENABLING ─┬→ FACTORY
//!                             ├→ UNSATISFIED ⇄ (bind events)
//!                             ├→ REGISTERED ─consume→ ACTIVATING
//!                             └→ ACTIVATING ─┬→ ACTIVE ─→ DEACTIVATING ─→ UNSATISFIED
//!                                            └→ UNSATISFIED (failure)
//! any enabled state ─disable→ DISABLING → DISABLED
//! any state         ─dispose→ DISPOSING → DISPOSED (terminal)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a component manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    Disabled,
    Enabling,
    Registered,
    Unsatisfied,
    Activating,
    Active,
    Factory,
    Deactivating,
    Disabling,
    Disposing,
    Disposed,
}

impl ComponentState {
    /// All states, in declaration order.
    pub const ALL: [ComponentState; 11] = [
        Self::Disabled,
        Self::Enabling,
        Self::Registered,
        Self::Unsatisfied,
        Self::Activating,
        Self::Active,
        Self::Factory,
        Self::Deactivating,
        Self::Disabling,
        Self::Disposing,
        Self::Disposed,
    ];

    /// Whether the state machine allows `self → next`.
    pub fn can_transition_to(self, next: ComponentState) -> bool {
        use ComponentState::*;
        matches!(
            (self, next),
            (Disabled, Enabling | Disposing)
                | (
                    Enabling,
                    Factory | Unsatisfied | Registered | Activating | Disabling | Disposing
                )
                | (Unsatisfied, Activating | Registered | Disabling | Disposing)
                | (Registered, Activating | Unsatisfied | Disabling | Disposing)
                | (Activating, Active | Unsatisfied | Deactivating)
                | (Active, Deactivating | Disabling | Disposing)
                | (Deactivating, Unsatisfied | Registered)
                | (Factory, Disabling | Disposing)
                | (Disabling, Disabled)
                | (Disposing, Disposed)
        )
    }

    /// States reached by a successful `enable()` and not yet disabled.
    pub fn is_enabled(self) -> bool {
        matches!(
            self,
            Self::Enabling
                | Self::Registered
                | Self::Unsatisfied
                | Self::Activating
                | Self::Active
                | Self::Factory
                | Self::Deactivating
        )
    }

    pub fn is_disposed(self) -> bool {
        self == Self::Disposed
    }

    /// Short lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Enabling => "enabling",
            Self::Registered => "registered",
            Self::Unsatisfied => "unsatisfied",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Factory => "factory",
            Self::Deactivating => "deactivating",
            Self::Disabling => "disabling",
            Self::Disposing => "disposing",
            Self::Disposed => "disposed",
        }
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
