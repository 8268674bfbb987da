//! Shared test doubles: an instrumented fake protocol client that records
//! call timing and plays back scripted outcomes.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::Path;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use courier::client::{AlbumItem, RemoteClient, ResolvedPeer, SignIn};
use courier::event::{Media, Message, RawEvent};
use courier::peer::{Channel, Chat, Entity, PeerRef, User};
use courier::session::{CredentialKind, CredentialProvider};
use courier::{OutgoingMessage, RemoteError, RpcError};

// ─── Builders ────────────────────────────────────────────────────────────────

pub fn sample_user(id: i64, hash: i64) -> User {
    User {
        id,
        access_hash: hash,
        first_name:  Some(format!("user{id}")),
        last_name:   None,
        username:    None,
        bot:         false,
    }
}

pub fn user_entity(id: i64, hash: i64) -> Entity {
    Entity::User(sample_user(id, hash))
}

pub fn chat_entity(id: i64, hash: i64) -> Entity {
    Entity::Chat(Chat { id, access_hash: hash, title: format!("chat{id}") })
}

pub fn channel_entity(id: i64, hash: i64) -> Entity {
    Entity::Channel(Channel {
        id,
        access_hash: hash,
        title:       format!("channel{id}"),
        username:    None,
        broadcast:   true,
    })
}

pub fn rpc_err(code: i32, name: &str) -> RemoteError {
    RemoteError::Rpc(RpcError::from_wire(code, name))
}

pub fn io_err() -> RemoteError {
    RemoteError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"))
}

// ─── Credential provider ─────────────────────────────────────────────────────

pub struct MapProvider {
    pub code:     Option<String>,
    pub password: Option<String>,
}

impl CredentialProvider for MapProvider {
    fn credential(&self, kind: CredentialKind) -> Option<String> {
        match kind {
            CredentialKind::Code     => self.code.clone(),
            CredentialKind::Password => self.password.clone(),
        }
    }
}

// ─── FakeClient ──────────────────────────────────────────────────────────────

/// One recorded remote call with its wall-clock span.
#[derive(Clone, Debug)]
pub struct Call {
    pub op:         &'static str,
    pub peer:       Option<i64>,
    pub random_ids: Vec<i64>,
    pub started:    Instant,
    pub ended:      Instant,
}

impl Call {
    /// `true` if the two call spans overlap in time.
    pub fn overlaps(&self, other: &Call) -> bool {
        self.started < other.ended && other.started < self.ended
    }
}

/// Scripted in-memory protocol client.
///
/// Outcome queues pop one result per call and fall back to success when
/// empty. Send-path calls optionally take `latency` so tests can observe
/// overlap (or the absence of it) under the paused clock.
pub struct FakeClient {
    pub latency:             Duration,
    pub calls:               StdMutex<Vec<Call>>,
    pub connects:            AtomicUsize,
    pub disconnects:         AtomicUsize,
    pub connect_results:     StdMutex<VecDeque<Result<(), RemoteError>>>,
    pub authorized:          AtomicBool,
    pub bot_sign_in_results: StdMutex<VecDeque<Result<User, RemoteError>>>,
    pub sign_in_results:     StdMutex<VecDeque<Result<SignIn, RemoteError>>>,
    pub password_results:    StdMutex<VecDeque<Result<User, RemoteError>>>,
    pub dialogs:             StdMutex<Vec<Entity>>,
    pub channels:            StdMutex<HashMap<i64, Entity>>,
    pub chats:               StdMutex<HashMap<i64, Entity>>,
    pub users:               StdMutex<HashMap<i64, Entity>>,
    pub usernames:           StdMutex<HashMap<String, ResolvedPeer>>,
    pub send_results:        StdMutex<VecDeque<Result<(), RemoteError>>>,
    events:                  tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<RawEvent, RemoteError>>>,
}

pub type EventFeed = mpsc::UnboundedSender<Result<RawEvent, RemoteError>>;

impl FakeClient {
    pub fn new() -> (Arc<Self>, EventFeed) {
        Self::with_latency(Duration::ZERO)
    }

    pub fn with_latency(latency: Duration) -> (Arc<Self>, EventFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Arc::new(Self {
            latency,
            calls:               StdMutex::new(Vec::new()),
            connects:            AtomicUsize::new(0),
            disconnects:         AtomicUsize::new(0),
            connect_results:     StdMutex::new(VecDeque::new()),
            authorized:          AtomicBool::new(false),
            bot_sign_in_results: StdMutex::new(VecDeque::new()),
            sign_in_results:     StdMutex::new(VecDeque::new()),
            password_results:    StdMutex::new(VecDeque::new()),
            dialogs:             StdMutex::new(Vec::new()),
            channels:            StdMutex::new(HashMap::new()),
            chats:               StdMutex::new(HashMap::new()),
            users:               StdMutex::new(HashMap::new()),
            usernames:           StdMutex::new(HashMap::new()),
            send_results:        StdMutex::new(VecDeque::new()),
            events:              tokio::sync::Mutex::new(rx),
        });
        (client, tx)
    }

    pub fn calls_named(&self, op: &str) -> Vec<Call> {
        self.calls.lock().unwrap().iter().filter(|c| c.op == op).cloned().collect()
    }

    async fn timed_send(
        &self,
        op:         &'static str,
        peer:       &PeerRef,
        random_ids: Vec<i64>,
    ) -> Result<(), RemoteError> {
        let started = Instant::now();
        if self.latency > Duration::ZERO {
            tokio::time::sleep(self.latency).await;
        }
        self.calls.lock().unwrap().push(Call {
            op,
            peer: Some(peer.id().raw()),
            random_ids,
            started,
            ended: Instant::now(),
        });
        self.send_results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

#[async_trait]
impl RemoteClient for FakeClient {
    async fn connect(&self, _session_path: &Path) -> Result<(), RemoteError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.connect_results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    async fn is_authorized(&self) -> Result<bool, RemoteError> {
        Ok(self.authorized.load(Ordering::SeqCst))
    }

    async fn bot_sign_in(&self, _token: &str) -> Result<User, RemoteError> {
        let result = self
            .bot_sign_in_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(sample_user(1, 1)));
        if result.is_ok() {
            self.authorized.store(true, Ordering::SeqCst);
        }
        result
    }

    async fn request_login_code(&self, _phone: &str) -> Result<(), RemoteError> {
        Ok(())
    }

    async fn sign_in(&self, _code: &str) -> Result<SignIn, RemoteError> {
        let result = self
            .sign_in_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(SignIn::Authorized(sample_user(1, 1))));
        if matches!(result, Ok(SignIn::Authorized(_))) {
            self.authorized.store(true, Ordering::SeqCst);
        }
        result
    }

    async fn check_password(&self, _password: &str) -> Result<User, RemoteError> {
        let result = self
            .password_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(sample_user(1, 1)));
        if result.is_ok() {
            self.authorized.store(true, Ordering::SeqCst);
        }
        result
    }

    async fn get_dialogs(&self) -> Result<Vec<Entity>, RemoteError> {
        Ok(self.dialogs.lock().unwrap().clone())
    }

    async fn resolve_username(&self, username: &str) -> Result<ResolvedPeer, RemoteError> {
        self.usernames
            .lock()
            .unwrap()
            .get(username)
            .cloned()
            .ok_or_else(|| rpc_err(400, "USERNAME_NOT_OCCUPIED"))
    }

    async fn get_channel(&self, channel_id: i64) -> Result<Entity, RemoteError> {
        self.channels
            .lock()
            .unwrap()
            .get(&channel_id)
            .cloned()
            .ok_or_else(|| rpc_err(400, "CHANNEL_INVALID"))
    }

    async fn get_chat(&self, chat_id: i64) -> Result<Entity, RemoteError> {
        self.chats
            .lock()
            .unwrap()
            .get(&chat_id)
            .cloned()
            .ok_or_else(|| rpc_err(400, "CHAT_ID_INVALID"))
    }

    async fn get_user(&self, user_id: i64) -> Result<Entity, RemoteError> {
        self.users
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .ok_or_else(|| rpc_err(400, "USER_ID_INVALID"))
    }

    async fn send_message(&self, peer: &PeerRef, msg: &OutgoingMessage) -> Result<(), RemoteError> {
        self.timed_send("send_message", peer, vec![msg.random_id]).await
    }

    async fn send_media(
        &self,
        peer:   &PeerRef,
        _media: &Media,
        msg:    &OutgoingMessage,
    ) -> Result<(), RemoteError> {
        self.timed_send("send_media", peer, vec![msg.random_id]).await
    }

    async fn send_album(
        &self,
        peer:       &PeerRef,
        _items:     &[AlbumItem],
        random_ids: &[i64],
    ) -> Result<(), RemoteError> {
        self.timed_send("send_album", peer, random_ids.to_vec()).await
    }

    async fn forward_messages(
        &self,
        destination: &PeerRef,
        _source:     &PeerRef,
        _message_ids: &[i32],
        random_ids:  &[i64],
    ) -> Result<(), RemoteError> {
        self.timed_send("forward_messages", destination, random_ids.to_vec()).await
    }

    async fn fetch_messages(&self, _peer: &PeerRef, _ids: &[i32]) -> Result<Vec<Message>, RemoteError> {
        Ok(Vec::new())
    }

    async fn next_event(&self) -> Result<RawEvent, RemoteError> {
        match self.events.lock().await.recv().await {
            Some(event) => event,
            // Feed dropped: park until the pump is cancelled.
            None => futures::future::pending().await,
        }
    }
}
