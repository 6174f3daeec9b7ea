//! Adapters layer - concrete implementations of the ports.

pub mod catalog;
pub mod console;
pub mod frontends;
pub(crate) mod service_provider;

pub use catalog::InstanceCatalog;
pub use console::{ManagementConsole, INFO_INTERFACE};
pub use frontends::register_command_frontend;
