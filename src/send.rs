//! Outbound sends with per-destination serialization.
//!
//! Two sends racing toward the same destination must not interleave: each
//! takes the destination's named lock, generates its random ids inside the
//! critical section, and releases the lock when the remote call completes.
//! Sends to distinct destinations share nothing and run fully in parallel.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use crate::cache::EntityCache;
use crate::client::{AlbumItem, RemoteClient};
use crate::errors::RemoteError;
use crate::event::{Media, Message};
use crate::peer::{PeerId, PeerRef};
use crate::resolve::PeerResolver;
use crate::retry::{RetrySchedule, invoke_with_retry};
use crate::{OutgoingMessage, random_i64};

// ─── SendLocks ───────────────────────────────────────────────────────────────

/// Named mutual-exclusion locks, one per destination identity.
struct SendLocks {
    locks: DashMap<PeerId, Arc<Mutex<()>>>,
}

impl SendLocks {
    fn new() -> Self {
        Self { locks: DashMap::new() }
    }

    async fn acquire(&self, destination: PeerId) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(&self.locks.entry(destination).or_default());
        lock.lock_owned().await
    }
}

// ─── Sender ──────────────────────────────────────────────────────────────────

/// Outbound operations: send, album, forward — retry-wrapped and serialized
/// per destination.
pub struct Sender<C: RemoteClient> {
    client:   Arc<C>,
    resolver: PeerResolver<C>,
    locks:    SendLocks,
    schedule: RetrySchedule,
}

impl<C: RemoteClient> Sender<C> {
    pub fn new(client: Arc<C>, cache: Arc<EntityCache>, schedule: RetrySchedule) -> Self {
        let resolver = PeerResolver::new(Arc::clone(&client), cache, schedule.clone());
        Self { client, resolver, locks: SendLocks::new(), schedule }
    }

    /// The resolver backing this sender, for callers that want a
    /// [`PeerRef`] without sending anything.
    pub fn resolver(&self) -> &PeerResolver<C> {
        &self.resolver
    }

    /// Send a text message to an identifier (`"me"`, `@username`, raw id).
    pub async fn send_message(
        &self,
        destination: &str,
        msg:         OutgoingMessage,
        cancel:      &CancellationToken,
    ) -> Result<(), RemoteError> {
        let peer = self.resolver.resolve_identifier(destination, cancel).await?;
        self.send_to_peer(&peer, msg, cancel).await
    }

    /// Send a text message to an already-resolved peer.
    pub async fn send_to_peer(
        &self,
        peer:   &PeerRef,
        msg:    OutgoingMessage,
        cancel: &CancellationToken,
    ) -> Result<(), RemoteError> {
        let _guard = self.locks.acquire(peer.id()).await;
        let prepared = msg.random_id(random_i64());
        invoke_with_retry(&self.schedule, cancel, "send_message", || {
            self.client.send_message(peer, &prepared)
        })
        .await
    }

    /// Send a single media item with a caption.
    pub async fn send_media(
        &self,
        peer:   &PeerRef,
        media:  Media,
        msg:    OutgoingMessage,
        cancel: &CancellationToken,
    ) -> Result<(), RemoteError> {
        let _guard = self.locks.acquire(peer.id()).await;
        let prepared = msg.random_id(random_i64());
        invoke_with_retry(&self.schedule, cancel, "send_media", || {
            self.client.send_media(peer, &media, &prepared)
        })
        .await
    }

    /// Send several media items as one album.
    pub async fn send_album(
        &self,
        peer:   &PeerRef,
        items:  Vec<AlbumItem>,
        cancel: &CancellationToken,
    ) -> Result<(), RemoteError> {
        if items.is_empty() {
            return Ok(());
        }
        let _guard = self.locks.acquire(peer.id()).await;
        let random_ids: Vec<i64> = items.iter().map(|_| random_i64()).collect();
        invoke_with_retry(&self.schedule, cancel, "send_album", || {
            self.client.send_album(peer, &items, &random_ids)
        })
        .await
    }

    /// Forward messages from `source` to `destination`.
    pub async fn forward_messages(
        &self,
        destination: &PeerRef,
        source:      &PeerRef,
        message_ids: &[i32],
        cancel:      &CancellationToken,
    ) -> Result<(), RemoteError> {
        if message_ids.is_empty() {
            return Ok(());
        }
        let _guard = self.locks.acquire(destination.id()).await;
        let random_ids: Vec<i64> = message_ids.iter().map(|_| random_i64()).collect();
        invoke_with_retry(&self.schedule, cancel, "forward_messages", || {
            self.client.forward_messages(destination, source, message_ids, &random_ids)
        })
        .await
    }

    /// Fetch messages by id from a peer.
    pub async fn fetch_messages(
        &self,
        peer:   &PeerRef,
        ids:    &[i32],
        cancel: &CancellationToken,
    ) -> Result<Vec<Message>, RemoteError> {
        invoke_with_retry(&self.schedule, cancel, "fetch_messages", || {
            self.client.fetch_messages(peer, ids)
        })
        .await
    }
}
