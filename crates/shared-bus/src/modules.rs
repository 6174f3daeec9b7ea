//! # Module Lifecycle
//!
//! Modules own components. The engine only needs to know whether a module is
//! active and when it starts or begins stopping.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shared_types::ModuleId;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::info;

/// A module as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub id: ModuleId,
    pub symbolic_name: String,
    pub active: bool,
}

/// Module state notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleEvent {
    Started(ModuleId),
    Stopping(ModuleId),
}

/// Read side of the module lifecycle.
pub trait ModuleLifecycleSource: Send + Sync {
    fn module(&self, id: ModuleId) -> Option<ModuleInfo>;

    fn find_by_name(&self, symbolic_name: &str) -> Option<ModuleInfo>;

    fn subscribe(&self) -> broadcast::Receiver<ModuleEvent>;
}

/// In-memory module registry.
pub struct InMemoryModuleRegistry {
    modules: RwLock<BTreeMap<ModuleId, ModuleInfo>>,
    sender: broadcast::Sender<ModuleEvent>,
    next_id: AtomicU64,
}

impl InMemoryModuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(crate::DEFAULT_CHANNEL_CAPACITY);
        Self {
            modules: RwLock::new(BTreeMap::new()),
            sender,
            next_id: AtomicU64::new(1),
        }
    }

    /// Install a module in the stopped state.
    pub fn install(&self, symbolic_name: impl Into<String>) -> ModuleId {
        let id = ModuleId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let symbolic_name = symbolic_name.into();
        info!(module = %id, name = %symbolic_name, "[Modules] Installed");
        self.modules.write().insert(
            id,
            ModuleInfo {
                id,
                symbolic_name,
                active: false,
            },
        );
        id
    }

    /// Mark a module active and announce it. Returns false if unknown or
    /// already active.
    pub fn start(&self, id: ModuleId) -> bool {
        let mut modules = self.modules.write();
        match modules.get_mut(&id) {
            Some(module) if !module.active => {
                module.active = true;
                let _ = self.sender.send(ModuleEvent::Started(id));
                info!(module = %id, "[Modules] Started");
                true
            }
            _ => false,
        }
    }

    /// Announce that a module is stopping, then mark it inactive.
    pub fn stop(&self, id: ModuleId) -> bool {
        let mut modules = self.modules.write();
        match modules.get_mut(&id) {
            Some(module) if module.active => {
                let _ = self.sender.send(ModuleEvent::Stopping(id));
                module.active = false;
                info!(module = %id, "[Modules] Stopped");
                true
            }
            _ => false,
        }
    }
}

impl Default for InMemoryModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleLifecycleSource for InMemoryModuleRegistry {
    fn module(&self, id: ModuleId) -> Option<ModuleInfo> {
        self.modules.read().get(&id).cloned()
    }

    fn find_by_name(&self, symbolic_name: &str) -> Option<ModuleInfo> {
        self.modules
            .read()
            .values()
            .find(|m| m.symbolic_name == symbolic_name)
            .cloned()
    }

    fn subscribe(&self) -> broadcast::Receiver<ModuleEvent> {
        self.sender.subscribe()
    }
}
