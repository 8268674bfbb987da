//! Error types for the ingestion core.
//!
//! Two layers: [`RemoteError`] covers everything the protocol client can
//! fail with, [`SessionError`] covers the connect/login state machine on
//! top of it.  Classification into retry behavior lives in
//! [`RemoteError::classify`] and is consumed by the resilience executor.

use std::time::Duration;
use std::{fmt, io};

use crate::session::CredentialKind;

// ─── RpcError ─────────────────────────────────────────────────────────────────

/// An error returned by the platform's servers in response to a remote call.
///
/// Numeric values are stripped from the name and placed in [`RpcError::value`].
///
/// # Example
/// `FLOOD_WAIT_30` → `RpcError { code: 420, name: "FLOOD_WAIT", value: Some(30) }`
#[derive(Clone, Debug, PartialEq)]
pub struct RpcError {
    /// HTTP-like status code.
    pub code: i32,
    /// Error name in SCREAMING_SNAKE_CASE with digits removed.
    pub name: String,
    /// Numeric suffix extracted from the name, if any.
    pub value: Option<u32>,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RPC {}: {}", self.code, self.name)?;
        if let Some(v) = self.value {
            write!(f, " (value: {v})")?;
        }
        Ok(())
    }
}

impl std::error::Error for RpcError {}

impl RpcError {
    /// Parse a raw server error message like `"FLOOD_WAIT_30"` into an `RpcError`.
    pub fn from_wire(code: i32, message: &str) -> Self {
        // Try to find a numeric suffix after the last underscore.
        // e.g. "FLOOD_WAIT_30" → name = "FLOOD_WAIT", value = Some(30)
        if let Some(idx) = message.rfind('_') {
            let suffix = &message[idx + 1..];
            if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(v) = suffix.parse::<u32>() {
                    let name = message[..idx].to_string();
                    return Self { code, name, value: Some(v) };
                }
            }
        }
        Self { code, name: message.to_string(), value: None }
    }

    /// Match on the error name, with optional wildcard prefix/suffix `'*'`.
    ///
    /// # Examples
    /// - `err.is("FLOOD_WAIT")` — exact match
    /// - `err.is("PHONE_CODE_*")` — starts-with match
    /// - `err.is("*_INVALID")` — ends-with match
    pub fn is(&self, pattern: &str) -> bool {
        if let Some(prefix) = pattern.strip_suffix('*') {
            self.name.starts_with(prefix)
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            self.name.ends_with(suffix)
        } else {
            self.name == pattern
        }
    }

    /// Returns the flood-wait duration in seconds, if this is a FLOOD_WAIT error.
    pub fn flood_wait_seconds(&self) -> Option<u64> {
        if self.code == 420 && self.name == "FLOOD_WAIT" {
            self.value.map(|v| v as u64)
        } else {
            None
        }
    }
}

// ─── RemoteError ──────────────────────────────────────────────────────────────

/// The error type returned from any operation that talks to the platform.
#[derive(Debug)]
pub enum RemoteError {
    /// The server rejected the request.
    Rpc(RpcError),
    /// Network / I/O failure.
    Io(io::Error),
    /// The response could not be interpreted.
    Malformed(String),
    /// The request was dropped (e.g. sender task shut down).
    Dropped,
    /// Datacenter migration required — handled by the session manager.
    Migrate(i32),
    /// The caller's cancellation signal fired. Distinct from failure.
    Cancelled,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc(e)        => write!(f, "{e}"),
            Self::Io(e)         => write!(f, "I/O error: {e}"),
            Self::Malformed(s)  => write!(f, "malformed response: {s}"),
            Self::Dropped       => write!(f, "request dropped"),
            Self::Migrate(dc)   => write!(f, "DC migration to {dc}"),
            Self::Cancelled     => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for RemoteError {}

impl From<io::Error> for RemoteError {
    fn from(e: io::Error) -> Self { Self::Io(e) }
}

/// How a [`RemoteError`] should be treated by the resilience executor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient transport/server hiccup — retry on the backoff schedule.
    Transient,
    /// The server asked us to wait this long before retrying.
    RateLimited(Duration),
    /// Will not succeed on retry — surface immediately.
    Permanent,
    /// Caller cancellation — never retried, not a failure.
    Cancelled,
    /// Unknown shape; likely a defect in this layer. Logged loudly, propagated.
    Unclassified,
}

impl RemoteError {
    /// Returns `true` if this is the named RPC error (supports `'*'` wildcards).
    pub fn is(&self, pattern: &str) -> bool {
        match self {
            Self::Rpc(e) => e.is(pattern),
            _            => false,
        }
    }

    /// If this is a FLOOD_WAIT error, returns how many seconds to wait.
    pub fn flood_wait_seconds(&self) -> Option<u64> {
        match self {
            Self::Rpc(e) => e.flood_wait_seconds(),
            _            => None,
        }
    }

    /// Classify for retry purposes.
    ///
    /// - I/O and 5xx server errors are transient.
    /// - Any 420 carrying a numeric wait (FLOOD_WAIT, SLOWMODE_WAIT, …) is a
    ///   rate limit with a server-specified duration.
    /// - Auth / bad-request / not-found / forbidden codes and migration
    ///   signals are permanent.
    /// - Everything else is unclassified.
    pub fn classify(&self) -> ErrorClass {
        match self {
            Self::Io(_)        => ErrorClass::Transient,
            Self::Cancelled    => ErrorClass::Cancelled,
            Self::Migrate(_)   => ErrorClass::Permanent,
            Self::Rpc(e) => {
                if e.code == 420 {
                    return match e.value {
                        Some(secs) => ErrorClass::RateLimited(Duration::from_secs(secs as u64)),
                        None       => ErrorClass::Unclassified,
                    };
                }
                match e.code {
                    500..=599                 => ErrorClass::Transient,
                    400 | 401 | 403 | 404 | 406 => ErrorClass::Permanent,
                    _                         => ErrorClass::Unclassified,
                }
            }
            Self::Malformed(_) | Self::Dropped => ErrorClass::Unclassified,
        }
    }
}

// ─── SessionError ─────────────────────────────────────────────────────────────

/// Errors surfaced by the session manager's connect/login machinery.
#[derive(Debug)]
pub enum SessionError {
    /// A remote call failed after the resilience executor gave up.
    Remote(RemoteError),
    /// The credential provider returned nothing for the requested kind.
    CredentialMissing(CredentialKind),
    /// The account does not exist — sign up via an official app first.
    SignUpRequired,
    /// The caller's cancellation signal fired.
    Cancelled,
    /// The supervisory retry loop ran out of attempts.
    Exhausted {
        attempts: u32,
        last:     Box<SessionError>,
    },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(e)            => write!(f, "{e}"),
            Self::CredentialMissing(k) => write!(f, "no {k} supplied by the credential provider"),
            Self::SignUpRequired       => write!(f, "sign up required — account does not exist"),
            Self::Cancelled            => write!(f, "session operation cancelled"),
            Self::Exhausted { attempts, last } =>
                write!(f, "session connect failed after {attempts} attempts: {last}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<RemoteError> for SessionError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Cancelled => Self::Cancelled,
            other                  => Self::Remote(other),
        }
    }
}
