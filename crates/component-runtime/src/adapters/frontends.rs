//! Command front-end registration.
//!
//! The `scr` command scope is published only when some module provides a
//! command processor to host it.

use crate::adapters::console::ManagementConsole;
use shared_bus::SingletonService;
use shared_types::{Properties, ServiceObject, ServiceToken};
use std::sync::Arc;
use tracing::{debug, info};

pub const COMMAND_PROCESSOR_INTERFACE: &str = "command.processor";
pub const COMMANDS_INTERFACE: &str = "component.commands";
pub const COMMAND_SCOPE_KEY: &str = "osgi.command.scope";
pub const COMMAND_FUNCTION_KEY: &str = "osgi.command.function";
pub const COMMAND_SCOPE: &str = "scr";
pub const COMMAND_FUNCTIONS: [&str; 5] = ["config", "disable", "enable", "info", "list"];

/// Register the command front-end if a command processor is present.
/// Returns the registration, if one was made.
pub fn register_command_frontend(console: &ManagementConsole) -> Option<ServiceToken> {
    let context = console.registry().context();
    if context
        .services
        .find_candidates(COMMAND_PROCESSOR_INTERFACE, None)
        .is_empty()
    {
        debug!("[Frontends] No command processor, skipping {}", COMMANDS_INTERFACE);
        return None;
    }

    let properties = Properties::new()
        .with(COMMAND_SCOPE_KEY, COMMAND_SCOPE)
        .with(
            COMMAND_FUNCTION_KEY,
            COMMAND_FUNCTIONS.iter().map(|f| f.to_string()).collect::<Vec<_>>(),
        );
    let object: ServiceObject = Arc::new(console.clone());
    let token = context.publisher.register_service(
        vec![COMMANDS_INTERFACE.to_string()],
        properties,
        Arc::new(SingletonService::new(object)),
    );
    info!("[Frontends] Registered {} commands as service {}", COMMAND_SCOPE, token.id);
    Some(token)
}
