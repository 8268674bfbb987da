//! Canonical updates and the shape normalizer.
//!
//! Every event the server pushes is classified into one of the variants of
//! [`Update`].  Abbreviated wire shapes are reconstructed through the
//! entity cache; when an identity cannot be resolved the reference degrades
//! to id-only with a warning rather than the event being dropped —
//! delivery always proceeds.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::cache::EntityCache;
use crate::event::{Media, Message, RawEvent, ShortChatMessage, ShortMessage, TextEntity};
use crate::peer::{PeerId, PeerRef};

// ─── MessageEvent ────────────────────────────────────────────────────────────

/// A normalized message, independent of which wire shape carried it.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageEvent {
    /// Message id, unique within the chat.
    pub id:       i32,
    /// The sender. `None` for anonymous channel posts.
    pub sender:   Option<PeerRef>,
    /// The conversation the message belongs to.
    pub chat:     PeerRef,
    pub text:     String,
    pub entities: Vec<TextEntity>,
    pub media:    Option<Media>,
    pub date:     DateTime<Utc>,
    /// `true` if sent by the logged-in account.
    pub outgoing: bool,
}

// ─── Update ──────────────────────────────────────────────────────────────────

/// A canonical event, ready for dispatch to subscribers.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq)]
pub enum Update {
    /// A new message (direct chat, group, or channel).
    NewMessage(MessageEvent),
    /// An existing message was edited.
    MessageEdited(MessageEvent),
    /// An event shape with no dedicated variant.
    Other { constructor_id: u32 },
}

// ─── Normalizer ──────────────────────────────────────────────────────────────

/// Converts raw wire shapes into canonical [`Update`]s.
///
/// Infallible by design: malformed or unknown shapes become
/// [`Update::Other`], unresolved identities become bare references.
pub struct Normalizer {
    cache: Arc<EntityCache>,
}

impl Normalizer {
    pub fn new(cache: Arc<EntityCache>) -> Self {
        Self { cache }
    }

    /// Normalize one raw event into zero or more canonical updates.
    ///
    /// Batch containers are unwrapped in arrival order; their attached
    /// entity snapshots are absorbed into the cache first, so abbreviated
    /// constituents resolve against the metadata that shipped with them.
    pub fn normalize(&self, event: RawEvent) -> Vec<Update> {
        match event {
            RawEvent::NewMessage(m)       => vec![Update::NewMessage(self.from_full(m))],
            RawEvent::EditedMessage(m)    => vec![Update::MessageEdited(self.from_full(m))],
            RawEvent::ShortMessage(m)     => vec![Update::NewMessage(self.from_short_dm(m))],
            RawEvent::ShortChatMessage(m) => vec![Update::NewMessage(self.from_short_chat(m))],
            RawEvent::Batch(batch) => {
                self.cache.extend(batch.entities);
                batch
                    .events
                    .into_iter()
                    .flat_map(|e| self.normalize(e))
                    .collect()
            }
            RawEvent::Other { constructor_id } => vec![Update::Other { constructor_id }],
        }
    }

    /// Cache-backed credential attachment. On a miss the reference degrades
    /// to id-only; the event is still delivered.
    fn resolve(&self, peer: PeerId) -> PeerRef {
        match self.cache.get(peer.raw()) {
            Some(entity) => entity.peer_ref(),
            None => {
                warn!(peer = ?peer, "entity not cached; degrading to id-only reference");
                PeerRef::bare(peer)
            }
        }
    }

    fn from_full(&self, msg: Message) -> MessageEvent {
        MessageEvent {
            id:       msg.id,
            sender:   msg.from.map(|p| self.resolve(p)),
            chat:     self.resolve(msg.peer),
            text:     msg.text,
            entities: msg.entities,
            media:    msg.media,
            date:     timestamp(msg.date),
            outgoing: msg.out,
        }
    }

    fn from_short_dm(&self, msg: ShortMessage) -> MessageEvent {
        // The other party is both the sender and the conversation.
        let peer = self.resolve(PeerId::User(msg.user_id));
        MessageEvent {
            id:       msg.id,
            sender:   Some(peer),
            chat:     peer,
            text:     msg.text,
            entities: msg.entities,
            media:    None,
            date:     timestamp(msg.date),
            outgoing: msg.out,
        }
    }

    fn from_short_chat(&self, msg: ShortChatMessage) -> MessageEvent {
        MessageEvent {
            id:       msg.id,
            sender:   Some(self.resolve(PeerId::User(msg.from_id))),
            chat:     self.resolve(PeerId::Chat(msg.chat_id)),
            text:     msg.text,
            entities: msg.entities,
            media:    None,
            date:     timestamp(msg.date),
            outgoing: msg.out,
        }
    }
}

fn timestamp(unix: i32) -> DateTime<Utc> {
    DateTime::from_timestamp(unix as i64, 0).unwrap_or(DateTime::UNIX_EPOCH)
}
