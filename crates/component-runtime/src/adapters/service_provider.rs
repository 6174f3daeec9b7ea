//! Service provider backing a component's registration.
//!
//! Consumers reach the component's task through its command queue, so a
//! delayed component activates on first `get_service` and may deactivate
//! once the last consumer calls `unget_service`.

use crate::service::manager::Command;
use async_trait::async_trait;
use shared_bus::{ServiceError, ServiceProvider};
use shared_types::{ComponentId, ServiceObject};
use tokio::sync::{mpsc, oneshot};

pub(crate) struct ComponentServiceProvider {
    component: ComponentId,
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl ComponentServiceProvider {
    pub(crate) fn new(component: ComponentId, commands: mpsc::WeakUnboundedSender<Command>) -> Self {
        Self {
            component,
            commands,
        }
    }

    fn gone(&self) -> ServiceError {
        ServiceError::Provider(format!("component {} is gone", self.component))
    }
}

#[async_trait]
impl ServiceProvider for ComponentServiceProvider {
    async fn get_service(&self) -> Result<ServiceObject, ServiceError> {
        let sender = self.commands.upgrade().ok_or_else(|| self.gone())?;
        let (tx, rx) = oneshot::channel();
        sender
            .send(Command::GetService(tx))
            .map_err(|_| self.gone())?;
        drop(sender);
        rx.await.map_err(|_| self.gone())?
    }

    async fn unget_service(&self) {
        if let Some(sender) = self.commands.upgrade() {
            let _ = sender.send(Command::UngetService);
        }
    }
}
