//! Ports layer - Hexagonal Architecture interfaces.

pub mod inbound;
pub mod outbound;

pub use inbound::ManagementApi;
pub use outbound::{
    ActivationContext, BoundService, ComponentInstance, DeactivationReason, InstanceProvider,
};
