//! Local connection registry and broadcast fan-out.
//!
//! Connections are indexed by their assigned channel, so a broadcast only
//! ever touches the subscribers of that channel. Each connection is a
//! queue handle; a per-connection writer task drains the queue onto the
//! socket. A connection whose queue is gone (client disconnected) is
//! dropped from the registry during the broadcast that discovers it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::payload::ChatPayload;

/// Outbound handle for one local connection.
pub type OutboundSender = mpsc::UnboundedSender<Arc<str>>;

/// Process-wide set of live local connections, partitioned by channel.
///
/// Channel keys are lowercased at admission; a connection's channel never
/// changes while it is registered.
#[derive(Default)]
pub struct ConnectionRegistry {
    channels: RwLock<HashMap<String, HashMap<Uuid, OutboundSender>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection under `channel` and return its id.
    pub async fn register(&self, channel: &str, sender: OutboundSender) -> Uuid {
        let id = Uuid::new_v4();
        let mut channels = self.channels.write().await;
        channels.entry(channel.to_string()).or_default().insert(id, sender);
        debug!(channel = %channel, connection = %id, "client connection registered");
        id
    }

    /// Remove a connection. Safe to call for an already-removed id.
    pub async fn unregister(&self, channel: &str, id: Uuid) {
        let mut channels = self.channels.write().await;
        if let Some(subscribers) = channels.get_mut(channel) {
            subscribers.remove(&id);
            if subscribers.is_empty() {
                channels.remove(channel);
            }
        }
        debug!(channel = %channel, connection = %id, "client connection removed");
    }

    /// Number of live connections tagged with `channel`.
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .await
            .get(channel)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// Deliver `payload` to every live connection tagged with `channel`.
    ///
    /// The payload is serialized once and the same buffer is queued to each
    /// subscriber. A subscriber whose queue has closed is dropped from the
    /// registry; delivery to the remaining subscribers is unaffected.
    pub async fn broadcast(&self, channel: &str, payload: &ChatPayload) {
        let json: Arc<str> = match serde_json::to_string(payload) {
            Ok(j) => j.into(),
            Err(e) => {
                warn!(channel = %channel, error = %e, "failed to serialize broadcast payload");
                return;
            }
        };

        let mut dead = Vec::new();
        {
            let channels = self.channels.read().await;
            let Some(subscribers) = channels.get(channel) else {
                return;
            };
            for (id, sender) in subscribers {
                if sender.send(Arc::clone(&json)).is_err() {
                    dead.push(*id);
                }
            }
            debug!(
                channel = %channel,
                recipients = subscribers.len() - dead.len(),
                "broadcast delivered"
            );
        }

        for id in dead {
            self.unregister(channel, id).await;
        }
    }
}
