//! Session lifecycle: connect, login, migration, reconciliation, supervision.
//!
//! One authenticated connection is shared by every component.  The manager
//! owns it: `connect` is single-flight under an exclusive lock, and an
//! already-connected session is torn down and rebuilt rather than patched
//! incrementally.  Failures propagate to [`SessionManager::run_supervised`],
//! whose bounded exponential backoff is the last line of defense — when it
//! gives up, the process should fail fast, because a disconnected session
//! makes the whole core non-functional.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cache::EntityCache;
use crate::client::{RemoteClient, SignIn};
use crate::errors::{RemoteError, SessionError};
use crate::retry::{RetrySchedule, invoke_with_retry};

// ─── Credentials ─────────────────────────────────────────────────────────────

/// Which secret the credential provider is being asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialKind {
    Code,
    Password,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code     => f.write_str("code"),
            Self::Password => f.write_str("password"),
        }
    }
}

/// Pluggable source of interactive login secrets.
///
/// Invoked off the async runtime (`spawn_blocking`), so implementations may
/// block on stdin, a prompt, or an external store. Returning `None` fails
/// the login with [`SessionError::CredentialMissing`].
pub trait CredentialProvider: Send + Sync {
    fn credential(&self, kind: CredentialKind) -> Option<String>;
}

/// How the session authenticates.
#[derive(Clone, Debug)]
pub enum LoginCredentials {
    Bot { token: String },
    User { phone: String },
}

// ─── State ───────────────────────────────────────────────────────────────────

/// Observable connection state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    AwaitingCredential(CredentialKind),
    Authenticated,
    Migrating,
}

// ─── SupervisorConfig ────────────────────────────────────────────────────────

/// Backoff settings for the outer supervisory retry loop.
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    pub max_attempts: u32,
    pub base_delay:   Duration,
    pub max_delay:    Duration,
    /// Jitter factor 0.0–1.0; a delay varies by ±this fraction.
    pub jitter:       f64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay:   Duration::from_secs(1),
            max_delay:    Duration::from_secs(60),
            jitter:       0.2,
        }
    }
}

impl SupervisorConfig {
    /// Exponential backoff with symmetric jitter for the given retry index.
    fn delay(&self, attempt: u32) -> Duration {
        let exp    = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        let capped = exp.min(self.max_delay);
        let jitter = 1.0 + (crate::random_unit() * 2.0 - 1.0) * self.jitter;
        Duration::from_secs_f64((capped.as_secs_f64() * jitter).max(0.0))
    }
}

// ─── SessionManager ──────────────────────────────────────────────────────────

/// Owns the single authenticated connection.
pub struct SessionManager<C: RemoteClient> {
    client:       Arc<C>,
    cache:        Arc<EntityCache>,
    provider:     Arc<dyn CredentialProvider>,
    credentials:  LoginCredentials,
    session_path: PathBuf,
    schedule:     RetrySchedule,
    supervisor:   SupervisorConfig,
    state:        parking_lot::Mutex<SessionState>,
    /// Single-flight guard for connect/reconnect.
    connect_lock: tokio::sync::Mutex<()>,
}

impl<C: RemoteClient> SessionManager<C> {
    pub fn new(
        client:       Arc<C>,
        cache:        Arc<EntityCache>,
        provider:     Arc<dyn CredentialProvider>,
        credentials:  LoginCredentials,
        session_path: PathBuf,
        schedule:     RetrySchedule,
        supervisor:   SupervisorConfig,
    ) -> Self {
        Self {
            client,
            cache,
            provider,
            credentials,
            session_path,
            schedule,
            supervisor,
            state:        parking_lot::Mutex::new(SessionState::Disconnected),
            connect_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    /// Establish the authenticated session. Single-flight: concurrent
    /// callers queue behind the exclusive lock. If a session is already
    /// live it is deliberately torn down and rebuilt.
    pub async fn connect(&self, cancel: &CancellationToken) -> Result<(), SessionError> {
        let _flight = self.connect_lock.lock().await;

        if self.state() == SessionState::Authenticated {
            info!("session already live; tearing down for a clean reconnect");
            self.client.disconnect().await;
            self.set_state(SessionState::Disconnected);
        }

        self.set_state(SessionState::Connecting);
        let result = self.connect_inner(cancel).await;
        if result.is_err() {
            self.set_state(SessionState::Disconnected);
        }
        result
    }

    async fn connect_inner(&self, cancel: &CancellationToken) -> Result<(), SessionError> {
        invoke_with_retry(&self.schedule, cancel, "connect", || {
            self.client.connect(&self.session_path)
        })
        .await?;

        let authorized =
            invoke_with_retry(&self.schedule, cancel, "is_authorized", || {
                self.client.is_authorized()
            })
            .await?;
        if !authorized {
            self.login(cancel).await?;
        }
        self.set_state(SessionState::Authenticated);

        // Full entity reconciliation: the dialog list reveals every peer we
        // talk to, seeding the cache before the first abbreviated update.
        let entities =
            invoke_with_retry(&self.schedule, cancel, "get_dialogs", || self.client.get_dialogs())
                .await?;
        info!(entities = entities.len(), "entity reconciliation complete");
        self.cache.extend(entities);
        Ok(())
    }

    async fn login(&self, cancel: &CancellationToken) -> Result<(), SessionError> {
        match self.credentials.clone() {
            LoginCredentials::Bot { token } => {
                let user = self
                    .with_migration(cancel, || {
                        invoke_with_retry(&self.schedule, cancel, "bot_sign_in", || {
                            self.client.bot_sign_in(&token)
                        })
                    })
                    .await?;
                info!(user_id = user.id, "bot signed in");
                Ok(())
            }
            LoginCredentials::User { phone } => self.user_login(&phone, cancel).await,
        }
    }

    async fn user_login(&self, phone: &str, cancel: &CancellationToken) -> Result<(), SessionError> {
        self.with_migration(cancel, || {
            invoke_with_retry(&self.schedule, cancel, "request_login_code", || {
                self.client.request_login_code(phone)
            })
        })
        .await?;

        self.set_state(SessionState::AwaitingCredential(CredentialKind::Code));
        let code = self.ask(CredentialKind::Code).await?;
        self.set_state(SessionState::Connecting);

        let outcome = self
            .with_migration(cancel, || {
                invoke_with_retry(&self.schedule, cancel, "sign_in", || self.client.sign_in(&code))
            })
            .await?;

        match outcome {
            SignIn::Authorized(user) => {
                info!(user_id = user.id, "signed in");
                Ok(())
            }
            SignIn::PasswordRequired { hint } => {
                info!(hint = hint.as_deref().unwrap_or("(none)"), "second factor required");
                self.set_state(SessionState::AwaitingCredential(CredentialKind::Password));
                let password = self.ask(CredentialKind::Password).await?;
                self.set_state(SessionState::Connecting);
                let user = invoke_with_retry(&self.schedule, cancel, "check_password", || {
                    self.client.check_password(&password)
                })
                .await?;
                info!(user_id = user.id, "second factor accepted");
                Ok(())
            }
            SignIn::SignUpRequired => Err(SessionError::SignUpRequired),
        }
    }

    /// Run `call`, and on a datacenter-migration signal dispose the
    /// transport, recreate it, and retry the call once.
    async fn with_migration<T, F, Fut>(
        &self,
        cancel:   &CancellationToken,
        mut call: F,
    ) -> Result<T, SessionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        match call().await {
            Err(RemoteError::Migrate(dc)) => {
                info!(dc, "datacenter migration requested; recreating transport");
                self.set_state(SessionState::Migrating);
                self.client.disconnect().await;
                invoke_with_retry(&self.schedule, cancel, "connect", || {
                    self.client.connect(&self.session_path)
                })
                .await?;
                self.set_state(SessionState::Connecting);
                Ok(call().await?)
            }
            other => Ok(other?),
        }
    }

    /// Ask the blocking credential provider, off the async runtime.
    async fn ask(&self, kind: CredentialKind) -> Result<String, SessionError> {
        let provider = Arc::clone(&self.provider);
        let secret = tokio::task::spawn_blocking(move || provider.credential(kind))
            .await
            .ok()
            .flatten();
        secret.ok_or(SessionError::CredentialMissing(kind))
    }

    /// Outer supervisory loop: retry `connect` with bounded exponential
    /// backoff and jitter; on exhaustion surface [`SessionError::Exhausted`]
    /// so the caller fails fast.
    pub async fn run_supervised(&self, cancel: &CancellationToken) -> Result<(), SessionError> {
        let attempts = self.supervisor.max_attempts.max(1);
        let mut last: Option<SessionError> = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.supervisor.delay(attempt - 1);
                warn!(attempt, delay_ms = delay.as_millis() as u64,
                      "session connect failed; backing off before retry");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            match self.connect(cancel).await {
                Ok(())                        => return Ok(()),
                Err(SessionError::Cancelled)  => return Err(SessionError::Cancelled),
                Err(e) => {
                    error!(error = %e, "session connect attempt failed");
                    last = Some(e);
                }
            }
        }

        error!(attempts, "session supervisor exhausted; failing fast");
        Err(SessionError::Exhausted {
            attempts,
            last: Box::new(last.unwrap_or(SessionError::Cancelled)),
        })
    }

    /// Tear down the session.
    pub async fn disconnect(&self) {
        let _flight = self.connect_lock.lock().await;
        self.client.disconnect().await;
        self.set_state(SessionState::Disconnected);
    }
}
