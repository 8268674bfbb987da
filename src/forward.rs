//! Forwarding orchestration: canonical updates → durable rule-matching jobs.
//!
//! Subscribes to the dispatch channel, derives a routing key from the chat
//! reference, and hands a self-contained unit of work to the external job
//! queue.  Direct user-to-user conversations are not eligible.  Every
//! update is an isolated failure domain: enqueue failures are logged and
//! swallowed so one bad update never halts ingestion of the rest.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dispatch::UpdateHandler;
use crate::event::{Media, TextEntity};
use crate::peer::{PeerId, PeerRef};
use crate::update::{MessageEvent, Update};

// ─── MatchKey ────────────────────────────────────────────────────────────────

/// Routing key derived from a source reference, used externally to look up
/// the forwarding rules that apply to a message.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchKey(String);

impl MatchKey {
    /// Derive the key for a source peer. Direct user-to-user conversations
    /// have no key — they are never forwarded.
    pub fn from_peer(peer: PeerId) -> Option<Self> {
        match peer {
            PeerId::User(_)     => None,
            PeerId::Chat(id)    => Some(Self(format!("chat:{id}"))),
            PeerId::Channel(id) => Some(Self(format!("channel:{id}"))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── ForwardJob ──────────────────────────────────────────────────────────────

/// A durable unit of work for the external rule-matching service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForwardJob {
    pub match_key:  MatchKey,
    pub message_id: i32,
    /// Raw numeric id of the source conversation.
    pub peer_id:    i64,
    pub text:       String,
    pub entities:   Vec<TextEntity>,
    pub sender:     Option<PeerRef>,
    pub media:      Option<Media>,
}

/// Fire-and-forget durable queue consumed by the rule-matching service.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: ForwardJob) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

// ─── ForwardingOrchestrator ──────────────────────────────────────────────────

/// [`UpdateHandler`] that turns eligible messages into forwarding jobs.
pub struct ForwardingOrchestrator {
    queue: Arc<dyn JobQueue>,
}

impl ForwardingOrchestrator {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }

    fn job_for(msg: &MessageEvent) -> Option<ForwardJob> {
        let match_key = MatchKey::from_peer(msg.chat.id())?;
        Some(ForwardJob {
            match_key,
            message_id: msg.id,
            peer_id:    msg.chat.id().raw(),
            text:       msg.text.clone(),
            entities:   msg.entities.clone(),
            sender:     msg.sender,
            media:      msg.media.clone(),
        })
    }
}

#[async_trait]
impl UpdateHandler for ForwardingOrchestrator {
    async fn handle(&self, update: Update) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let msg = match &update {
            Update::NewMessage(m) => m,
            _ => return Ok(()),
        };
        let Some(job) = Self::job_for(msg) else {
            debug!(message_id = msg.id, "direct conversation; not eligible for forwarding");
            return Ok(());
        };

        // No idempotency key: re-processing the same update enqueues again.
        // Deduplication, if any, is the queue's concern.
        let key = job.match_key.clone();
        if let Err(e) = self.queue.enqueue(job).await {
            warn!(key = %key, message_id = msg.id, error = %e, "forward enqueue failed");
        }
        Ok(())
    }
}
