//! Raw event shapes as delivered by the protocol client.
//!
//! The transport pushes several shapes for what is conceptually the same
//! thing: full messages, abbreviated messages that omit addressing the
//! server assumes we can reconstruct, and batch containers that wrap many
//! events together with the entity metadata needed to decode them.  The
//! normalizer in [`crate::update`] collapses all of these into one
//! canonical form.

use serde::{Deserialize, Serialize};

use crate::peer::{Entity, PeerId};

// ─── Text formatting ─────────────────────────────────────────────────────────

/// A formatting span over a message's text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextEntity {
    pub kind:   TextEntityKind,
    /// Offset into the text, in UTF-16 code units.
    pub offset: i32,
    pub length: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TextEntityKind {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Code,
    Pre,
    Url,
    TextUrl { url: String },
    Mention,
}

// ─── Media ───────────────────────────────────────────────────────────────────

/// Reference to an already-uploaded media object, sufficient to re-send it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Media {
    Photo    { photo_id: i64, access_hash: i64 },
    Document { document_id: i64, access_hash: i64, mime_type: String },
}

// ─── Message ─────────────────────────────────────────────────────────────────

/// A fully-addressed wire message.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// Message id, unique within the chat.
    pub id:       i32,
    /// The conversation the message belongs to.
    pub peer:     PeerId,
    /// The sender. Absent for anonymous channel posts.
    pub from:     Option<PeerId>,
    pub text:     String,
    pub entities: Vec<TextEntity>,
    pub media:    Option<Media>,
    /// Unix timestamp assigned by the server.
    pub date:     i32,
    /// `true` if sent by the logged-in account.
    pub out:      bool,
}

// ─── Abbreviated shapes ──────────────────────────────────────────────────────

/// A direct message with the peer addressing stripped: `user_id` is the
/// other party, and doubles as the conversation id.
#[derive(Clone, Debug, PartialEq)]
pub struct ShortMessage {
    pub id:       i32,
    pub user_id:  i64,
    pub text:     String,
    pub entities: Vec<TextEntity>,
    pub date:     i32,
    pub out:      bool,
}

/// A group message with the addressing stripped down to raw ids.
#[derive(Clone, Debug, PartialEq)]
pub struct ShortChatMessage {
    pub id:       i32,
    pub from_id:  i64,
    pub chat_id:  i64,
    pub text:     String,
    pub entities: Vec<TextEntity>,
    pub date:     i32,
    pub out:      bool,
}

// ─── RawEvent ────────────────────────────────────────────────────────────────

/// One event as received from the transport, before normalization.
#[derive(Clone, Debug, PartialEq)]
pub enum RawEvent {
    /// A new fully-addressed message.
    NewMessage(Message),
    /// An existing message was edited.
    EditedMessage(Message),
    /// Abbreviated direct message.
    ShortMessage(ShortMessage),
    /// Abbreviated group message.
    ShortChatMessage(ShortChatMessage),
    /// A container wrapping several events plus the entities they mention.
    Batch(EventBatch),
    /// An event shape this layer does not interpret.
    Other { constructor_id: u32 },
}

/// A batch container: constituent events in arrival order, plus every
/// entity snapshot the server attached so abbreviated constituents can be
/// reconstructed.
#[derive(Clone, Debug, PartialEq)]
pub struct EventBatch {
    pub events:   Vec<RawEvent>,
    pub entities: Vec<Entity>,
}
