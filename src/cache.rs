//! Time-expiring entity cache.
//!
//! Maps numeric entity id to the last-known snapshot.  Every upsert
//! refreshes the entry's expiry to `now + TTL`; reads never return an entry
//! past its TTL even if the sweeper has not run yet.  The periodic sweep
//! iterates a snapshot of keys so concurrent readers and writers are never
//! blocked or invalidated mid-iteration.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::peer::Entity;

struct CacheEntry {
    entity:     Entity,
    expires_at: Instant,
}

/// Concurrent `id → (snapshot, expiry)` map.
pub struct EntityCache {
    entries: DashMap<i64, CacheEntry>,
    ttl:     Duration,
}

impl EntityCache {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: DashMap::new(), ttl }
    }

    /// Insert or refresh a snapshot, resetting its expiry to `now + TTL`.
    pub fn upsert(&self, entity: Entity) {
        let expires_at = Instant::now() + self.ttl;
        self.entries.insert(entity.id(), CacheEntry { entity, expires_at });
    }

    /// Upsert every snapshot in `entities`.
    pub fn extend<I: IntoIterator<Item = Entity>>(&self, entities: I) {
        for e in entities {
            self.upsert(e);
        }
    }

    /// Fetch a live snapshot. Expired entries are treated as misses.
    pub fn get(&self, id: i64) -> Option<Entity> {
        let entry = self.entries.get(&id)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.entity.clone())
    }

    /// The access credential for `id`, if a live snapshot is cached.
    pub fn access_hash(&self, id: i64) -> Option<i64> {
        self.get(id).map(|e| e.access_hash())
    }

    /// Remove every expired entry. Returns how many were removed.
    ///
    /// Runs over a snapshot of the expired keys so writers racing with the
    /// sweep are safe: the removal re-checks expiry, so an entry refreshed
    /// after the snapshot was taken survives.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<i64> = self
            .entries
            .iter()
            .filter(|e| e.value().expires_at <= now)
            .map(|e| *e.key())
            .collect();

        let mut removed = 0;
        for id in expired {
            if self.entries.remove_if(&id, |_, e| e.expires_at <= now).is_some() {
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry. Called on shutdown.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Spawn the periodic sweeper. `interval` should be shorter than the
    /// TTL so expired entries do not linger a full extra period.
    pub fn spawn_sweeper(
        self:     &Arc<Self>,
        interval: Duration,
        cancel:   CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {
                        let removed = cache.sweep();
                        if removed > 0 {
                            debug!(removed, remaining = cache.len(), "entity cache sweep");
                        }
                    }
                }
            }
            debug!("entity cache sweeper stopped");
        })
    }
}
