//! Peer resolution: cache first, then an ordered remote fallback chain.
//!
//! Resolution produces a [`PeerRef`] carrying the access credential needed
//! for remote calls.  The cache is always consulted first; misses fall
//! through remote lookups (each retry-wrapped), and every successful lookup
//! refreshes the cache.  When nothing works the reference degrades to
//! id-only rather than failing the caller.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::EntityCache;
use crate::client::RemoteClient;
use crate::errors::RemoteError;
use crate::peer::{Entity, PeerId, PeerRef};
use crate::retry::{RetrySchedule, invoke_with_retry};

pub struct PeerResolver<C: RemoteClient> {
    client:   Arc<C>,
    cache:    Arc<EntityCache>,
    schedule: RetrySchedule,
}

impl<C: RemoteClient> PeerResolver<C> {
    pub fn new(client: Arc<C>, cache: Arc<EntityCache>, schedule: RetrySchedule) -> Self {
        Self { client, cache, schedule }
    }

    /// Resolve a peer whose kind is already known.
    ///
    /// Cache hit → credentialled reference. Miss → kind-directed remote
    /// lookup, cached on success. Failure → id-only reference with a
    /// warning; the caller proceeds with the null credential.
    pub async fn resolve(&self, peer: PeerId, cancel: &CancellationToken) -> PeerRef {
        if let Some(entity) = self.cache.get(peer.raw()) {
            return entity.peer_ref();
        }

        let fetched = match peer {
            PeerId::Channel(id) => self.lookup_channel(id, cancel).await,
            PeerId::Chat(id)    => self.lookup_chat(id, cancel).await,
            PeerId::User(id)    => self.lookup_user(id, cancel).await,
        };
        match fetched {
            Ok(entity) => self.remember(entity),
            Err(e) => {
                warn!(peer = ?peer, error = %e, "peer lookup failed; using id-only reference");
                PeerRef::bare(peer)
            }
        }
    }

    /// Resolve an externally-supplied identifier: `"me"`, `@username`, or a
    /// raw numeric id of unknown kind.
    ///
    /// Numeric ids fall through the ordered chain channel → chat → user,
    /// ending in a last-resort channel reference with the null credential.
    pub async fn resolve_identifier(
        &self,
        identifier: &str,
        cancel:     &CancellationToken,
    ) -> Result<PeerRef, RemoteError> {
        match identifier.trim() {
            "me" | "self" => Ok(PeerRef::SELF),
            s if s.starts_with('@') => self.resolve_username(&s[1..], cancel).await,
            s => match s.parse::<i64>() {
                Ok(id)  => Ok(self.resolve_numeric(id, cancel).await),
                Err(_)  => self.resolve_username(s, cancel).await,
            },
        }
    }

    async fn resolve_username(
        &self,
        username: &str,
        cancel:   &CancellationToken,
    ) -> Result<PeerRef, RemoteError> {
        let resolved = invoke_with_retry(&self.schedule, cancel, "resolve_username", || {
            self.client.resolve_username(username)
        })
        .await?;

        self.cache.extend(resolved.entities);
        Ok(match self.cache.get(resolved.peer.raw()) {
            Some(entity) => entity.peer_ref(),
            None         => PeerRef::bare(resolved.peer),
        })
    }

    async fn resolve_numeric(&self, id: i64, cancel: &CancellationToken) -> PeerRef {
        if let Some(entity) = self.cache.get(id) {
            return entity.peer_ref();
        }

        match self.lookup_channel(id, cancel).await {
            Ok(entity) => return self.remember(entity),
            Err(e)     => debug!(id, error = %e, "channel lookup missed"),
        }
        match self.lookup_chat(id, cancel).await {
            Ok(entity) => return self.remember(entity),
            Err(e)     => debug!(id, error = %e, "chat lookup missed"),
        }
        match self.lookup_user(id, cancel).await {
            Ok(entity) => return self.remember(entity),
            Err(e)     => debug!(id, error = %e, "user lookup missed"),
        }

        warn!(id, "identifier resolution exhausted; constructing bare channel reference");
        PeerRef::bare(PeerId::Channel(id))
    }

    fn remember(&self, entity: Entity) -> PeerRef {
        let peer_ref = entity.peer_ref();
        self.cache.upsert(entity);
        peer_ref
    }

    async fn lookup_channel(&self, id: i64, cancel: &CancellationToken) -> Result<Entity, RemoteError> {
        invoke_with_retry(&self.schedule, cancel, "get_channel", || self.client.get_channel(id)).await
    }

    async fn lookup_chat(&self, id: i64, cancel: &CancellationToken) -> Result<Entity, RemoteError> {
        invoke_with_retry(&self.schedule, cancel, "get_chat", || self.client.get_chat(id)).await
    }

    async fn lookup_user(&self, id: i64, cancel: &CancellationToken) -> Result<Entity, RemoteError> {
        invoke_with_retry(&self.schedule, cancel, "get_user", || self.client.get_user(id)).await
    }
}
