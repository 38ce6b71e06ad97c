//! Channel bridge registry.
//!
//! Process-wide mapping from channel to its shared upstream session. The
//! registry is the sole authority on that mapping: sessions are created
//! lazily on first admission, cached for the life of the process, and never
//! evicted. Creation is single-flight per channel — concurrent admissions
//! for a never-bridged channel store at most one session, and a failed
//! attempt leaves the slot empty so the next admission retries.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::UpstreamError;
use crate::gateway::ConnectionRegistry;
use crate::payload::ChatPayload;
use crate::upstream::message::ChatEvent;
use crate::upstream::session::{SessionIdentity, UpstreamSession};

type BridgeSlot = Arc<OnceCell<Arc<UpstreamSession>>>;

/// Owns the channel → shared upstream session mapping.
pub struct BridgeRegistry {
    config: Arc<Config>,
    connections: Arc<ConnectionRegistry>,
    slots: Mutex<HashMap<String, BridgeSlot>>,
}

impl BridgeRegistry {
    pub fn new(config: Arc<Config>, connections: Arc<ConnectionRegistry>) -> Self {
        Self {
            config,
            connections,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the shared session for `channel`, establishing it first if
    /// this is the channel's first admission.
    ///
    /// An existing session is returned as-is, with no health check; its
    /// internal reconnect loop owns liveness. On establishment failure
    /// nothing is stored and the error propagates to the caller.
    pub async fn ensure_bridge(&self, channel: &str) -> Result<Arc<UpstreamSession>, UpstreamError> {
        let channel = channel.to_lowercase();
        let config = Arc::clone(&self.config);
        let connections = Arc::clone(&self.connections);
        let slot_key = channel.clone();

        self.ensure_with(&slot_key, || async move {
            let identity =
                SessionIdentity::new(config.bot_username.clone(), config.bot_token.clone());
            let (session, events) =
                UpstreamSession::establish(&config.upstream_url, &channel, &identity, true).await?;
            info!(channel = %channel, "channel bridge established");
            tokio::spawn(relay_events(events, connections));
            Ok(Arc::new(session))
        })
        .await
    }

    /// Whether a shared session is currently stored for `channel`.
    pub async fn is_bridged(&self, channel: &str) -> bool {
        let slots = self.slots.lock().await;
        slots
            .get(&channel.to_lowercase())
            .is_some_and(|slot| slot.initialized())
    }

    async fn ensure_with<F, Fut>(
        &self,
        channel: &str,
        establish: F,
    ) -> Result<Arc<UpstreamSession>, UpstreamError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<UpstreamSession>, UpstreamError>>,
    {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots.entry(channel.to_string()).or_default().clone()
        };
        slot.get_or_try_init(establish).await.cloned()
    }
}

/// Consume one session's event stream and fan each message out to the local
/// connections on its channel. One task per bridged channel; a busy channel
/// never blocks another channel's relay.
async fn relay_events(
    events: tokio::sync::mpsc::UnboundedReceiver<ChatEvent>,
    connections: Arc<ConnectionRegistry>,
) {
    let mut events = UnboundedReceiverStream::new(events);
    while let Some(event) = events.next().await {
        let payload = ChatPayload::from_upstream(event);
        debug!(channel = %payload.channel, user = %payload.user, "relaying upstream message");
        connections.broadcast(&payload.channel, &payload).await;
    }
}
