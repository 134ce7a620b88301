//! One session kernel per device.
//!
//! Creating a kernel tears down and replaces whichever one was active, so
//! two kernels never hold the camera, the signaling socket or the peer
//! connection at the same time.

use tokio::sync::{mpsc, Mutex};
use tracing::info;

use crate::application::kernel::{KernelPorts, SessionKernel};
use crate::domain::config::SessionConfig;
use crate::domain::events::SessionEvent;

#[derive(Default)]
pub struct SessionRegistry {
    active: Mutex<Option<SessionKernel>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a fresh kernel and makes it the active one.
    ///
    /// The previously active kernel, if any, is disconnected first.
    pub async fn create(
        &self,
        config: SessionConfig,
        ports: KernelPorts,
    ) -> (SessionKernel, mpsc::UnboundedReceiver<SessionEvent>) {
        let (kernel, events) = SessionKernel::new(config, ports);
        let previous = self.active.lock().await.replace(kernel.clone());
        if let Some(previous) = previous {
            info!("replacing active session kernel");
            previous.disconnect().await;
        }
        (kernel, events)
    }

    pub async fn current(&self) -> Option<SessionKernel> {
        self.active.lock().await.clone()
    }

    /// Disconnects and forgets the active kernel.
    pub async fn release(&self) {
        let previous = self.active.lock().await.take();
        if let Some(previous) = previous {
            previous.disconnect().await;
        }
    }
}
