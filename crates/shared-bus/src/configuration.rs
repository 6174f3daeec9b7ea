//! # Configuration Source
//!
//! Supplies configuration properties keyed by persistent identity (pid).
//! Factory configurations share a factory pid and each carry their own
//! generated pid.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shared_types::{keys, Properties};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// What happened to a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigurationEventKind {
    Updated,
    Deleted,
}

/// A configuration change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationEvent {
    pub pid: String,
    pub factory_pid: Option<String>,
    pub kind: ConfigurationEventKind,
}

/// Configuration lookups and change notifications.
pub trait ConfigurationSource: Send + Sync {
    /// Properties stored under `pid`, if any.
    fn get_properties(&self, pid: &str) -> Option<Properties>;

    /// Every `(pid, properties)` pair created under `factory_pid`.
    fn factory_configurations(&self, factory_pid: &str) -> Vec<(String, Properties)>;

    /// Subscribe to configuration changes.
    fn subscribe(&self) -> broadcast::Receiver<ConfigurationEvent>;
}

/// Stand-in used when the host has no configuration facility.
///
/// Never returns data; subscriptions are closed immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConfiguration;

impl ConfigurationSource for NoConfiguration {
    fn get_properties(&self, _pid: &str) -> Option<Properties> {
        None
    }

    fn factory_configurations(&self, _factory_pid: &str) -> Vec<(String, Properties)> {
        Vec::new()
    }

    fn subscribe(&self) -> broadcast::Receiver<ConfigurationEvent> {
        let (_, receiver) = broadcast::channel(1);
        receiver
    }
}

struct StoredConfiguration {
    factory_pid: Option<String>,
    properties: Properties,
}

/// In-memory configuration store.
pub struct InMemoryConfigurationStore {
    entries: RwLock<BTreeMap<String, StoredConfiguration>>,
    sender: broadcast::Sender<ConfigurationEvent>,
    next_factory_id: AtomicU64,
}

impl InMemoryConfigurationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(crate::DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a store whose change notifications buffer `capacity` events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            entries: RwLock::new(BTreeMap::new()),
            sender,
            next_factory_id: AtomicU64::new(1),
        }
    }

    /// Create or replace the configuration for `pid`.
    pub fn update(&self, pid: &str, properties: Properties) {
        let properties = properties.with(keys::SERVICE_PID, pid);
        let mut entries = self.entries.write();
        let factory_pid = entries.get(pid).and_then(|e| e.factory_pid.clone());
        entries.insert(
            pid.to_string(),
            StoredConfiguration {
                factory_pid: factory_pid.clone(),
                properties,
            },
        );
        self.emit(ConfigurationEvent {
            pid: pid.to_string(),
            factory_pid,
            kind: ConfigurationEventKind::Updated,
        });
        drop(entries);
        info!(pid, "[Config] Configuration updated");
    }

    /// Create a new factory configuration and return its generated pid.
    pub fn create_factory_configuration(&self, factory_pid: &str, properties: Properties) -> String {
        let pid = format!(
            "{}~{}",
            factory_pid,
            self.next_factory_id.fetch_add(1, Ordering::SeqCst)
        );
        self.update_factory(factory_pid, &pid, properties);
        pid
    }

    /// Create or replace the factory configuration `pid` under `factory_pid`.
    pub fn update_factory(&self, factory_pid: &str, pid: &str, properties: Properties) {
        let properties = properties
            .with(keys::SERVICE_PID, pid)
            .with(keys::FACTORY_PID, factory_pid);
        let mut entries = self.entries.write();
        entries.insert(
            pid.to_string(),
            StoredConfiguration {
                factory_pid: Some(factory_pid.to_string()),
                properties,
            },
        );
        self.emit(ConfigurationEvent {
            pid: pid.to_string(),
            factory_pid: Some(factory_pid.to_string()),
            kind: ConfigurationEventKind::Updated,
        });
        drop(entries);
        info!(pid, factory_pid, "[Config] Factory configuration updated");
    }

    /// Delete a configuration. Returns false if nothing was stored.
    pub fn delete(&self, pid: &str) -> bool {
        let mut entries = self.entries.write();
        let Some(removed) = entries.remove(pid) else {
            return false;
        };
        self.emit(ConfigurationEvent {
            pid: pid.to_string(),
            factory_pid: removed.factory_pid,
            kind: ConfigurationEventKind::Deleted,
        });
        drop(entries);
        info!(pid, "[Config] Configuration deleted");
        true
    }

    fn emit(&self, event: ConfigurationEvent) {
        if self.sender.send(event).is_err() {
            debug!("[Config] Configuration event dropped (no receivers)");
        }
    }
}

impl Default for InMemoryConfigurationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationSource for InMemoryConfigurationStore {
    fn get_properties(&self, pid: &str) -> Option<Properties> {
        self.entries
            .read()
            .get(pid)
            .filter(|e| e.factory_pid.is_none())
            .map(|e| e.properties.clone())
    }

    fn factory_configurations(&self, factory_pid: &str) -> Vec<(String, Properties)> {
        self.entries
            .read()
            .iter()
            .filter(|(_, e)| e.factory_pid.as_deref() == Some(factory_pid))
            .map(|(pid, e)| (pid.clone(), e.properties.clone()))
            .collect()
    }

    fn subscribe(&self) -> broadcast::Receiver<ConfigurationEvent> {
        self.sender.subscribe()
    }
}
