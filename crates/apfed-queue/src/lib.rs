//! The at-least-once message queue contract the outbox delivery pipeline
//! depends on, plus an in-memory reference implementation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use apfed_error::Result;

#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub delay: Option<Duration>,
}

impl EnqueueOptions {
    pub fn after(delay: Duration) -> Self {
        Self { delay: Some(delay) }
    }
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
pub type Handler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// The contract: enqueue a JSON-serializable message, optionally delayed,
/// and register a single handler that MAY be invoked concurrently.
/// At-least-once delivery is required; ordering is not.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn enqueue(&self, message: Value, opts: EnqueueOptions) -> Result<()>;
    fn listen(&self, handler: Handler);
}

/// An in-memory `MessageQueue`. Delayed messages are held by a background
/// task per message (fine at the scale this reference implementation
/// targets); a real backend would use a proper delay structure.
pub struct InMemoryQueue {
    sender: mpsc::UnboundedSender<Value>,
    receiver: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: tokio::sync::Mutex::new(Some(receiver)),
        }
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn enqueue(&self, message: Value, opts: EnqueueOptions) -> Result<()> {
        let sender = self.sender.clone();
        match opts.delay {
            Some(delay) if !delay.is_zero() => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = sender.send(message);
                });
            }
            _ => {
                let _ = sender.send(message);
            }
        }
        Ok(())
    }

    fn listen(&self, handler: Handler) {
        let receiver = self
            .receiver
            .try_lock()
            .ok()
            .and_then(|mut guard| guard.take());
        let Some(mut receiver) = receiver else {
            tracing::warn!(target: "apfed.queue", "listen() called more than once; ignoring");
            return;
        };
        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                let handler = handler.clone();
                let id = Uuid::new_v4();
                tokio::spawn(async move {
                    if let Err(e) = handler(message).await {
                        tracing::warn!(target: "apfed.queue", message_id = %id, error = %e, "handler failed");
                    }
                });
            }
        });
    }
}
