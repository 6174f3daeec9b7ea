//! # Inbound Port - ManagementApi
//!
//! Structured management surface used by command shells, the info service
//! and the demo binary. Read operations never change state; `enable` and
//! `disable` report one outcome per matched component and never stop early.
//!
//! Identifiers are resolved in this order:
//!
//! 1. a decimal number is a component id (missing id is an error)
//! 2. an exact component name
//! 3. a regular expression that must match the whole name

use crate::config::ConfigSnapshot;
use crate::domain::{ChangeReport, ComponentDetail, ComponentSummary};
use crate::error::LifecycleError;
use async_trait::async_trait;

#[async_trait]
pub trait ManagementApi: Send + Sync {
    /// Components sorted by id, optionally restricted to one module given by
    /// numeric id or symbolic name.
    ///
    /// # Errors
    /// - `ModuleNotFound`: no such module
    /// - `ModuleNotActive`: the module is installed but not active
    fn list(&self, module: Option<&str>) -> Result<Vec<ComponentSummary>, LifecycleError>;

    /// Detail for every component matching `ident` (all when `None`), sorted
    /// by module then id.
    fn info(&self, ident: Option<&str>) -> Result<Vec<ComponentDetail>, LifecycleError>;

    async fn enable(&self, ident: &str) -> Result<ChangeReport, LifecycleError>;

    async fn disable(&self, ident: &str) -> Result<ChangeReport, LifecycleError>;

    fn config(&self) -> ConfigSnapshot;
}
