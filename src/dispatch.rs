//! Dispatch channel: decouples event reception from subscriber processing.
//!
//! In the default queued mode an unbounded channel feeds a single consumer
//! task; a failing or panicking subscriber is logged and the loop moves on.
//! Direct mode skips the queue and offloads each update onto the runtime so
//! ingestion is still never blocked by slow subscriber logic.  Shutdown
//! closes the queue and waits for the consumer to drain it completely —
//! deliberately without a timeout.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::update::Update;

/// Subscriber logic invoked for every canonical update.
#[async_trait]
pub trait UpdateHandler: Send + Sync + 'static {
    async fn handle(&self, update: Update) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// How updates reach the subscriber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DispatchMode {
    /// Queue + dedicated consumer task (preserves per-producer order).
    #[default]
    Queued,
    /// No queue; each update is offloaded onto the runtime directly.
    Direct,
}

/// Fans canonical updates out to the subscriber without blocking ingestion.
pub struct Dispatcher {
    handler:  Arc<dyn UpdateHandler>,
    mode:     DispatchMode,
    tx:       parking_lot::Mutex<Option<mpsc::UnboundedSender<Update>>>,
    consumer: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new(handler: Arc<dyn UpdateHandler>, mode: DispatchMode) -> Self {
        let (tx, consumer) = match mode {
            DispatchMode::Queued => {
                let (tx, mut rx) = mpsc::unbounded_channel::<Update>();
                let consumer_handler = Arc::clone(&handler);
                let task = tokio::spawn(async move {
                    while let Some(update) = rx.recv().await {
                        deliver(&consumer_handler, update).await;
                    }
                    debug!("dispatch queue drained");
                });
                (Some(tx), Some(task))
            }
            DispatchMode::Direct => (None, None),
        };
        Self {
            handler,
            mode,
            tx:       parking_lot::Mutex::new(tx),
            consumer: parking_lot::Mutex::new(consumer),
        }
    }

    /// Hand one update to the subscriber path. Never blocks on subscriber
    /// logic; never fails the caller.
    pub fn publish(&self, update: Update) {
        match self.mode {
            DispatchMode::Queued => {
                if let Some(tx) = self.tx.lock().as_ref() {
                    // Receiver outlives the sender until shutdown; a send
                    // after shutdown means the update is deliberately dropped.
                    let _ = tx.send(update);
                }
            }
            DispatchMode::Direct => {
                let handler = Arc::clone(&self.handler);
                tokio::spawn(async move {
                    deliver(&handler, update).await;
                });
            }
        }
    }

    /// Close the queue and wait for the consumer to finish every remaining
    /// item. No timeout: waits as long as the subscriber takes.
    pub async fn shutdown(&self) {
        drop(self.tx.lock().take());
        let consumer = self.consumer.lock().take();
        if let Some(task) = consumer {
            let _ = task.await;
        }
    }
}

/// Invoke the subscriber for one update, isolating errors and panics.
async fn deliver(handler: &Arc<dyn UpdateHandler>, update: Update) {
    match AssertUnwindSafe(handler.handle(update)).catch_unwind().await {
        Ok(Ok(()))  => {}
        Ok(Err(e))  => warn!(error = %e, "update handler failed"),
        Err(_panic) => error!("update handler panicked"),
    }
}
