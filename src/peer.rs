//! Peers and entity snapshots.
//!
//! A [`PeerId`] is the bare addressing form that appears in wire events; a
//! [`PeerRef`] additionally carries the access credential required by most
//! remote calls.  A credential of `0` means "unknown" — remote calls made
//! with it may be rejected, but the reference is still routable, which is
//! what lets normalization degrade gracefully instead of dropping events.

use serde::{Deserialize, Serialize};

// ─── PeerId ───────────────────────────────────────────────────────────────────

/// Bare identity of an addressable protocol object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerId {
    User(i64),
    Chat(i64),
    Channel(i64),
}

impl PeerId {
    /// The raw numeric id, without the kind tag.
    pub fn raw(&self) -> i64 {
        match *self {
            Self::User(id) | Self::Chat(id) | Self::Channel(id) => id,
        }
    }

    /// `true` for a direct user-to-user conversation.
    pub fn is_user(&self) -> bool {
        matches!(self, Self::User(_))
    }
}

// ─── PeerRef ──────────────────────────────────────────────────────────────────

/// A peer plus the access credential needed to act on it.
///
/// `access_hash == 0` is the null credential: the reference is id-only,
/// produced when resolution fails or the entity has never been seen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerRef {
    User    { user_id: i64, access_hash: i64 },
    Chat    { chat_id: i64, access_hash: i64 },
    Channel { channel_id: i64, access_hash: i64 },
}

impl PeerRef {
    /// The logged-in account itself.
    pub const SELF: PeerRef = PeerRef::User { user_id: 0, access_hash: 0 };

    /// An id-only reference with the null credential.
    pub fn bare(peer: PeerId) -> Self {
        match peer {
            PeerId::User(id)    => Self::User { user_id: id, access_hash: 0 },
            PeerId::Chat(id)    => Self::Chat { chat_id: id, access_hash: 0 },
            PeerId::Channel(id) => Self::Channel { channel_id: id, access_hash: 0 },
        }
    }

    pub fn id(&self) -> PeerId {
        match *self {
            Self::User { user_id, .. }       => PeerId::User(user_id),
            Self::Chat { chat_id, .. }       => PeerId::Chat(chat_id),
            Self::Channel { channel_id, .. } => PeerId::Channel(channel_id),
        }
    }

    pub fn access_hash(&self) -> i64 {
        match *self {
            Self::User { access_hash, .. }
            | Self::Chat { access_hash, .. }
            | Self::Channel { access_hash, .. } => access_hash,
        }
    }

    /// `true` if this reference carries a real credential.
    pub fn is_resolved(&self) -> bool {
        self.access_hash() != 0
    }
}

// ─── Entity snapshots ─────────────────────────────────────────────────────────

/// Last-known snapshot of a user account.
#[derive(Clone, Debug, PartialEq)]
pub struct User {
    pub id:          i64,
    pub access_hash: i64,
    pub first_name:  Option<String>,
    pub last_name:   Option<String>,
    pub username:    Option<String>,
    pub bot:         bool,
}

/// Last-known snapshot of a small group chat.
#[derive(Clone, Debug, PartialEq)]
pub struct Chat {
    pub id:          i64,
    pub access_hash: i64,
    pub title:       String,
}

/// Last-known snapshot of a channel or supergroup.
#[derive(Clone, Debug, PartialEq)]
pub struct Channel {
    pub id:          i64,
    pub access_hash: i64,
    pub title:       String,
    pub username:    Option<String>,
    /// Broadcast channel (one-to-many) as opposed to a supergroup.
    pub broadcast:   bool,
}

/// Any addressable protocol object revealed by an update or lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum Entity {
    User(User),
    Chat(Chat),
    Channel(Channel),
}

impl Entity {
    pub fn id(&self) -> i64 {
        match self {
            Self::User(u)    => u.id,
            Self::Chat(c)    => c.id,
            Self::Channel(c) => c.id,
        }
    }

    pub fn access_hash(&self) -> i64 {
        match self {
            Self::User(u)    => u.access_hash,
            Self::Chat(c)    => c.access_hash,
            Self::Channel(c) => c.access_hash,
        }
    }

    pub fn peer_id(&self) -> PeerId {
        match self {
            Self::User(u)    => PeerId::User(u.id),
            Self::Chat(c)    => PeerId::Chat(c.id),
            Self::Channel(c) => PeerId::Channel(c.id),
        }
    }

    /// A credentialled reference built from this snapshot.
    pub fn peer_ref(&self) -> PeerRef {
        match self {
            Self::User(u)    => PeerRef::User { user_id: u.id, access_hash: u.access_hash },
            Self::Chat(c)    => PeerRef::Chat { chat_id: c.id, access_hash: c.access_hash },
            Self::Channel(c) => PeerRef::Channel { channel_id: c.id, access_hash: c.access_hash },
        }
    }

    /// Display name for log messages.
    pub fn name(&self) -> String {
        match self {
            Self::User(u) => {
                let first = u.first_name.as_deref().unwrap_or("");
                let last  = u.last_name.as_deref().unwrap_or("");
                let name  = format!("{first} {last}").trim().to_string();
                if name.is_empty() { "(unknown)".into() } else { name }
            }
            Self::Chat(c)    => c.title.clone(),
            Self::Channel(c) => c.title.clone(),
        }
    }
}
