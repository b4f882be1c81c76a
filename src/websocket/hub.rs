//! Viewer Hub
//!
//! Keeps the set of live dashboard connections and fans events out to them.
//! Each viewer owns a bounded queue drained by its own socket task, so a slow
//! or dead viewer never holds up delivery to the others.

use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::messages::ViewerEvent;

/// Unique identifier for a viewer connection
pub type ViewerId = String;

/// Registry of open viewer connections
pub struct ViewerHub {
    /// Active viewers: ViewerId → ViewerHandle
    viewers: RwLock<HashMap<ViewerId, ViewerHandle>>,
    config: HubConfig,
}

/// Configuration for the viewer hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of concurrent viewers
    pub max_connections: usize,
    /// Per-viewer outbound queue length
    pub outbound_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
            outbound_capacity: 256,
        }
    }
}

/// Handle for sending frames to one viewer
struct ViewerHandle {
    sender: mpsc::Sender<ViewerEvent>,
}

impl ViewerHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            viewers: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Create the outbound queue for a new viewer, sized from the config
    pub fn channel(&self) -> (mpsc::Sender<ViewerEvent>, mpsc::Receiver<ViewerEvent>) {
        mpsc::channel(self.config.outbound_capacity)
    }

    /// Register a viewer and queue its welcome frame.
    ///
    /// Fails once the connection limit is reached.
    pub async fn register(&self, sender: mpsc::Sender<ViewerEvent>) -> Result<ViewerId, HubError> {
        let mut viewers = self.viewers.write().await;
        if viewers.len() >= self.config.max_connections {
            return Err(HubError::TooManyConnections(self.config.max_connections));
        }

        let id = Uuid::new_v4().to_string();
        // The queue is fresh, so the welcome frame is always first.
        if sender.try_send(ViewerEvent::welcome()).is_err() {
            return Err(HubError::SendFailed);
        }
        viewers.insert(id.clone(), ViewerHandle { sender });
        drop(viewers);

        tracing::info!(viewer_id = %id, "Viewer connected");
        Ok(id)
    }

    /// Remove a viewer; unknown ids are ignored
    pub async fn unregister(&self, id: &str) {
        if self.viewers.write().await.remove(id).is_some() {
            tracing::info!(viewer_id = %id, "Viewer disconnected");
        }
    }

    /// Send an event to every open viewer.
    ///
    /// Closed viewers are skipped and viewers with a full queue miss this
    /// event. Returns how many viewers accepted it.
    pub async fn broadcast(&self, event: &ViewerEvent) -> usize {
        // Snapshot so registration is never blocked by delivery
        let targets: Vec<(ViewerId, mpsc::Sender<ViewerEvent>)> = self
            .viewers
            .read()
            .await
            .iter()
            .map(|(id, handle)| (id.clone(), handle.sender.clone()))
            .collect();

        let mut sent_count = 0;
        for (id, sender) in targets {
            if sender.is_closed() {
                continue;
            }
            match sender.try_send(event.clone()) {
                Ok(()) => sent_count += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(viewer_id = %id, topic = %event.topic, "Viewer queue full, event dropped");
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }

        tracing::trace!(topic = %event.topic, viewers = sent_count, "Broadcast event");
        sent_count
    }

    pub async fn viewer_count(&self) -> usize {
        self.viewers.read().await.len()
    }
}

impl Default for ViewerHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

/// Errors that can occur in the viewer hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Too many connections (limit: {0})")]
    TooManyConnections(usize),

    #[error("Failed to send message")]
    SendFailed,
}
