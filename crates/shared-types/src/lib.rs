//! # Shared Types Crate
//!
//! Domain vocabulary shared by the lifecycle engine and its collaborators:
//! property bags, target filters, service tokens, component and reference
//! descriptions, and the component state enum.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every crate in the workspace speaks these
//!   types; collaborators never invent their own property or id types.
//! - **Immutable Descriptions**: a `ComponentDescription` is validated once
//!   and then only shared read-only.
//! - **Closed Property Values**: `PropertyValue` is a fixed set of variants,
//!   never an arbitrary object.

pub mod description;
pub mod errors;
pub mod filter;
pub mod properties;
pub mod service;
pub mod state;

pub use description::*;
pub use errors::*;
pub use filter::TargetFilter;
pub use properties::{keys, Properties, PropertyValue};
pub use service::{ServiceId, ServiceObject, ServiceToken};
pub use state::ComponentState;
