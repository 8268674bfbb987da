//! The consumed interface of the external protocol client.
//!
//! This layer does not implement the wire protocol — framing, encryption and
//! transport live in a separate client library.  [`RemoteClient`] is the
//! seam: the composition root injects a real implementation at startup, and
//! tests substitute an instrumented fake.  Every method maps to one remote
//! operation and is assumed reliable at the framing layer; failures surface
//! as [`RemoteError`] and are classified by the resilience executor.

use std::path::Path;

use async_trait::async_trait;

use crate::OutgoingMessage;
use crate::errors::RemoteError;
use crate::event::{Media, Message, RawEvent};
use crate::peer::{Entity, PeerId, PeerRef, User};

/// Outcome of a code sign-in attempt.
#[derive(Clone, Debug)]
pub enum SignIn {
    /// Fully authorized.
    Authorized(User),
    /// The account has a second factor; complete with
    /// [`RemoteClient::check_password`].
    PasswordRequired { hint: Option<String> },
    /// The phone number is not registered.
    SignUpRequired,
}

/// Result of a resolve-by-identifier call: the resolved peer plus every
/// entity snapshot the server attached to the answer.
#[derive(Clone, Debug)]
pub struct ResolvedPeer {
    pub peer:     PeerId,
    pub entities: Vec<Entity>,
}

/// One item of a media album send.
#[derive(Clone, Debug)]
pub struct AlbumItem {
    pub media:   Media,
    pub caption: String,
}

/// Remote protocol client operations consumed by this layer.
///
/// Implementations must be cheap to share (`Arc`) and safe to call from
/// many tasks at once; serialization of conflicting operations is this
/// layer's responsibility, not the client's.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    // ── Connection lifecycle ───────────────────────────────────────────────

    /// Establish (or re-establish) the transport, loading any persisted
    /// session state from `session_path`.
    async fn connect(&self, session_path: &Path) -> Result<(), RemoteError>;

    /// Tear the transport down. Idempotent.
    async fn disconnect(&self);

    // ── Authentication ─────────────────────────────────────────────────────

    async fn is_authorized(&self) -> Result<bool, RemoteError>;

    async fn bot_sign_in(&self, token: &str) -> Result<User, RemoteError>;

    async fn request_login_code(&self, phone: &str) -> Result<(), RemoteError>;

    async fn sign_in(&self, code: &str) -> Result<SignIn, RemoteError>;

    async fn check_password(&self, password: &str) -> Result<User, RemoteError>;

    // ── Directory ──────────────────────────────────────────────────────────

    /// Fetch the complete dialog list, returning every entity it reveals.
    async fn get_dialogs(&self) -> Result<Vec<Entity>, RemoteError>;

    async fn resolve_username(&self, username: &str) -> Result<ResolvedPeer, RemoteError>;

    async fn get_channel(&self, channel_id: i64) -> Result<Entity, RemoteError>;

    async fn get_chat(&self, chat_id: i64) -> Result<Entity, RemoteError>;

    async fn get_user(&self, user_id: i64) -> Result<Entity, RemoteError>;

    // ── Messaging ──────────────────────────────────────────────────────────

    async fn send_message(&self, peer: &PeerRef, msg: &OutgoingMessage) -> Result<(), RemoteError>;

    async fn send_media(
        &self,
        peer:  &PeerRef,
        media: &Media,
        msg:   &OutgoingMessage,
    ) -> Result<(), RemoteError>;

    /// Send several media items as one album. `random_ids` must carry one
    /// fresh id per item.
    async fn send_album(
        &self,
        peer:       &PeerRef,
        items:      &[AlbumItem],
        random_ids: &[i64],
    ) -> Result<(), RemoteError>;

    /// Forward `message_ids` from `source` to `destination`. `random_ids`
    /// must carry one fresh id per message.
    async fn forward_messages(
        &self,
        destination: &PeerRef,
        source:      &PeerRef,
        message_ids: &[i32],
        random_ids:  &[i64],
    ) -> Result<(), RemoteError>;

    /// Fetch messages by id from a peer.
    async fn fetch_messages(&self, peer: &PeerRef, ids: &[i32]) -> Result<Vec<Message>, RemoteError>;

    // ── Updates ────────────────────────────────────────────────────────────

    /// Wait for the next raw event pushed by the server.
    async fn next_event(&self) -> Result<RawEvent, RemoteError>;
}
