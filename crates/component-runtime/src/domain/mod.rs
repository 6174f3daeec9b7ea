//! # Domain Layer
//!
//! Pure binding logic and the value types the management surface returns.
//! Nothing here touches the service registry or spawns tasks.

pub mod binding;
pub mod outcome;

pub use binding::{BindingDelta, ReferenceManager, ReferenceSnapshot};
pub use outcome::{
    BoundDetail, ChangeOutcome, ChangeReport, ChangeResult, ComponentDetail, ComponentSummary,
    ReferenceDetail,
};
