//! # courier
//!
//! Real-time event ingestion and resilient dispatch on top of a remote
//! protocol client for a Telegram-style chat platform.
//!
//! ## What it does
//! - Owns the single authenticated session: login (code + 2FA), datacenter
//!   migration, teardown-and-rebuild reconnects, supervised startup
//! - Wraps every remote call in classification-driven retry with bounded
//!   backoff and flood-wait handling
//! - Keeps a TTL-bounded cache of entity snapshots so abbreviated update
//!   payloads can be reconstructed without re-querying the network
//! - Normalizes heterogeneous wire shapes into one canonical [`Update`]
//! - Fans updates out through a queue + consumer task so subscriber logic
//!   never blocks ingestion
//! - Forwards eligible messages as durable jobs for an external
//!   rule-matching service
//!
//! The wire protocol itself (framing, encryption, transport) is not
//! implemented here: a [`RemoteClient`] implementation is injected at the
//! composition root, which also makes the whole core testable against an
//! instrumented fake.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use courier::{Config, Courier, CredentialKind, CredentialProvider, LoginCredentials};
//! use courier::forward::{ForwardingOrchestrator, JobQueue};
//!
//! struct StdinProvider;
//! impl CredentialProvider for StdinProvider {
//!     fn credential(&self, kind: CredentialKind) -> Option<String> {
//!         let mut line = String::new();
//!         eprintln!("enter {kind}: ");
//!         std::io::stdin().read_line(&mut line).ok()?;
//!         Some(line.trim().to_string())
//!     }
//! }
//!
//! async fn run<C: courier::RemoteClient + 'static>(
//!     client: Arc<C>,
//!     queue:  Arc<dyn JobQueue>,
//! ) -> Result<(), courier::SessionError> {
//!     let config = Config {
//!         credentials: LoginCredentials::User { phone: "+10000000000".into() },
//!         ..Default::default()
//!     };
//!     let orchestrator = Arc::new(ForwardingOrchestrator::new(queue));
//!     let courier = Courier::start(config, client, Arc::new(StdinProvider), orchestrator).await?;
//!     // ... runs until shutdown
//!     courier.shutdown().await;
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]

mod errors;
pub mod cache;
pub mod client;
pub mod dispatch;
pub mod event;
pub mod forward;
pub mod peer;
pub mod resolve;
pub mod retry;
pub mod send;
pub mod session;
pub mod update;

pub use client::{AlbumItem, RemoteClient, ResolvedPeer, SignIn};
pub use dispatch::{DispatchMode, Dispatcher, UpdateHandler};
pub use errors::{ErrorClass, RemoteError, RpcError, SessionError};
pub use peer::{Entity, PeerId, PeerRef};
pub use retry::{RetryContext, RetrySchedule, invoke_with_retry};
pub use session::{
    CredentialKind, CredentialProvider, LoginCredentials, SessionManager, SessionState,
    SupervisorConfig,
};
pub use update::{MessageEvent, Update};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::EntityCache;
use crate::event::TextEntity;
use crate::send::Sender;
use crate::update::Normalizer;

// ─── Config ──────────────────────────────────────────────────────────────────

/// Configuration for [`Courier::start`].
#[derive(Clone, Debug)]
pub struct Config {
    /// Where the protocol client persists its session.
    pub session_path:   PathBuf,
    pub credentials:    LoginCredentials,
    /// How long a cached entity snapshot stays valid after its last refresh.
    pub cache_ttl:      Duration,
    /// Sweep period for expired cache entries. Keep it shorter than the TTL.
    pub sweep_interval: Duration,
    pub retry_schedule: RetrySchedule,
    pub dispatch:       DispatchMode,
    pub supervisor:     SupervisorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_path:   PathBuf::from("courier.session"),
            credentials:    LoginCredentials::Bot { token: String::new() },
            cache_ttl:      Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(60),
            retry_schedule: RetrySchedule::default(),
            dispatch:       DispatchMode::Queued,
            supervisor:     SupervisorConfig::default(),
        }
    }
}

// ─── OutgoingMessage ─────────────────────────────────────────────────────────

/// Builder for composing outgoing messages.
///
/// ```rust
/// use courier::OutgoingMessage;
///
/// let msg = OutgoingMessage::text("Hello, world!")
///     .silent(true)
///     .reply_to(Some(42));
/// ```
#[derive(Clone, Debug, Default)]
pub struct OutgoingMessage {
    pub text:       String,
    pub entities:   Vec<TextEntity>,
    pub reply_to:   Option<i32>,
    pub silent:     bool,
    pub no_preview: bool,
    /// Deduplication id; assigned by the sender inside the per-destination
    /// critical section.
    pub random_id:  i64,
}

impl OutgoingMessage {
    /// Create a message with the given text.
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Default::default() }
    }

    /// Attach formatting entities.
    pub fn entities(mut self, entities: Vec<TextEntity>) -> Self {
        self.entities = entities; self
    }

    /// Reply to a specific message id.
    pub fn reply_to(mut self, id: Option<i32>) -> Self {
        self.reply_to = id; self
    }

    /// Send silently (no notification sound).
    pub fn silent(mut self, v: bool) -> Self {
        self.silent = v; self
    }

    /// Disable link preview.
    pub fn no_preview(mut self, v: bool) -> Self {
        self.no_preview = v; self
    }

    /// Set the deduplication id.
    pub fn random_id(mut self, id: i64) -> Self {
        self.random_id = id; self
    }
}

impl From<&str> for OutgoingMessage {
    fn from(s: &str) -> Self { Self::text(s) }
}

impl From<String> for OutgoingMessage {
    fn from(s: String) -> Self { Self::text(s) }
}

// ─── Courier ─────────────────────────────────────────────────────────────────

/// The composition root: wires the session manager, entity cache, update
/// normalizer, dispatch channel and sender together, and owns their
/// lifecycles from startup to shutdown.
pub struct Courier<C: RemoteClient> {
    session:    Arc<SessionManager<C>>,
    cache:      Arc<EntityCache>,
    sender:     Arc<Sender<C>>,
    dispatcher: Arc<Dispatcher>,
    pump:       Option<JoinHandle<()>>,
    sweeper:    Option<JoinHandle<()>>,
    cancel:     CancellationToken,
}

impl<C: RemoteClient + 'static> Courier<C> {
    /// Connect, authenticate, and start ingesting.
    ///
    /// Startup fails fast if the supervised connect exhausts its retry
    /// budget — a core that cannot hold a session is not worth starting.
    pub async fn start(
        config:   Config,
        client:   Arc<C>,
        provider: Arc<dyn CredentialProvider>,
        handler:  Arc<dyn UpdateHandler>,
    ) -> Result<Self, SessionError> {
        let cancel = CancellationToken::new();
        let cache  = Arc::new(EntityCache::new(config.cache_ttl));

        let session = Arc::new(SessionManager::new(
            Arc::clone(&client),
            Arc::clone(&cache),
            provider,
            config.credentials.clone(),
            config.session_path.clone(),
            config.retry_schedule.clone(),
            config.supervisor.clone(),
        ));
        session.run_supervised(&cancel).await?;

        let sweeper    = cache.spawn_sweeper(config.sweep_interval, cancel.child_token());
        let dispatcher = Arc::new(Dispatcher::new(handler, config.dispatch));
        let sender     = Arc::new(Sender::new(
            Arc::clone(&client),
            Arc::clone(&cache),
            config.retry_schedule.clone(),
        ));

        let pump = spawn_pump(
            Arc::clone(&client),
            Arc::clone(&session),
            Arc::clone(&cache),
            Arc::clone(&dispatcher),
            cancel.child_token(),
        );
        info!("courier started");

        Ok(Self {
            session,
            cache,
            sender,
            dispatcher,
            pump: Some(pump),
            sweeper: Some(sweeper),
            cancel,
        })
    }

    /// Outbound operations (send, album, forward).
    pub fn sender(&self) -> &Arc<Sender<C>> {
        &self.sender
    }

    /// The shared entity cache.
    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    /// Current session state.
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Stop ingesting, drain the dispatch queue, and tear the session down.
    ///
    /// The dispatch drain waits for every queued update to be handled, with
    /// no timeout.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(pump) = self.pump.take() {
            let _ = pump.await;
        }
        self.dispatcher.shutdown().await;
        if let Some(sweeper) = self.sweeper.take() {
            let _ = sweeper.await;
        }
        self.session.disconnect().await;
        self.cache.clear();
        info!("courier stopped");
    }
}

/// The ingestion pump: receive raw events, normalize, dispatch.
///
/// A receive failure triggers a supervised reconnect; per-update problems
/// never reach this loop (normalization is infallible and dispatch isolates
/// the subscriber), so one bad update cannot halt ingestion.
fn spawn_pump<C: RemoteClient + 'static>(
    client:     Arc<C>,
    session:    Arc<SessionManager<C>>,
    cache:      Arc<EntityCache>,
    dispatcher: Arc<Dispatcher>,
    cancel:     CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let normalizer = Normalizer::new(cache);
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = client.next_event() => event,
            };
            match event {
                Ok(event) => {
                    for update in normalizer.normalize(event) {
                        dispatcher.publish(update);
                    }
                }
                Err(RemoteError::Cancelled) => break,
                Err(e) => {
                    warn!(error = %e, "event stream failed; reconnecting");
                    match session.run_supervised(&cancel).await {
                        Ok(())                       => continue,
                        Err(SessionError::Cancelled) => break,
                        Err(e) => {
                            error!(error = %e, "reconnect exhausted; event ingestion stopped");
                            break;
                        }
                    }
                }
            }
        }
        debug!("ingestion pump stopped");
    })
}

// ─── Random helpers ──────────────────────────────────────────────────────────

pub(crate) fn random_i64() -> i64 {
    let mut b = [0u8; 8];
    getrandom::getrandom(&mut b).expect("getrandom");
    i64::from_le_bytes(b)
}

/// Uniform value in `[0, 1)` for backoff jitter.
pub(crate) fn random_unit() -> f64 {
    let mut b = [0u8; 8];
    getrandom::getrandom(&mut b).expect("getrandom");
    (u64::from_le_bytes(b) >> 11) as f64 / (1u64 << 53) as f64
}
