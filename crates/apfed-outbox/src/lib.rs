//! The outbox delivery pipeline: transform outgoing activities, expand and
//! coalesce their recipients, and drive queue-backed signed delivery with
//! exponential backoff.

mod delivery;
mod recipients;
mod retry;
mod transform;

pub use delivery::{classify_status, deliver, Outcome};
pub use recipients::{coalesce, expand_recipients, FollowersResolver, RecipientTarget};
pub use retry::{compute_delay, decide, RetryDecision};
pub use transform::{apply_chain, default_chain, ActorDehydrator, AutoId, Transformer};

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use apfed_core::{Node, SenderKeyPair};
use apfed_error::{ApfedError, Result};
use apfed_queue::{EnqueueOptions, MessageQueue};
use apfed_telemetry::OutboxMetrics;
use apfed_vocab::DocumentLoader;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Invoked when a delivery permanently fails, or exhausts its retry budget,
/// so the application can record or surface the failure.
pub type FailureHandler = Arc<dyn Fn(ApfedError, &DeliveryMessage) + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryMessage {
    pub inbox: String,
    pub payload: Value,
    pub sender_private_key_pem: String,
    pub sender_public_key_id: String,
    pub attempt: u32,
    pub first_attempt_millis: u64,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Whether a delivery bypasses the queue and is attempted inline. Transient
/// failures still fall back to the normal queue-backed retry path.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeliveryOptions {
    pub immediate: bool,
}

/// Construction-time extras beyond the defaulted chain and retry schedule:
/// application-supplied transformers (run after the default chain, in
/// registration order) and the followers-collection expansion hook.
#[derive(Default)]
pub struct OutboxConfig {
    pub extra_transformers: Vec<Box<dyn Transformer>>,
    pub followers: Option<Arc<dyn FollowersResolver>>,
}

/// Ties together the transformer chain, recipient expansion, and a
/// queue-backed retry loop. One `Outbox` serves an entire federation handle;
/// `listen` is called once at construction time.
pub struct Outbox {
    queue: Arc<dyn MessageQueue>,
    client: reqwest::Client,
    settings: apfed_config::FederationSettings,
    metrics: Arc<OutboxMetrics>,
    chain: Vec<Box<dyn Transformer>>,
    followers: Option<Arc<dyn FollowersResolver>>,
    on_failure: Option<FailureHandler>,
}

impl Outbox {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        settings: apfed_config::FederationSettings,
        metrics: Arc<OutboxMetrics>,
        config: OutboxConfig,
        on_failure: Option<FailureHandler>,
    ) -> Arc<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let mut chain = default_chain();
        chain.extend(config.extra_transformers);
        let outbox = Arc::new(Self {
            queue,
            client,
            settings,
            metrics,
            chain,
            followers: config.followers,
            on_failure,
        });
        outbox.clone().listen();
        outbox
    }

    fn listen(self: Arc<Self>) {
        let outbox = self.clone();
        self.queue.listen(Arc::new(move |value: Value| {
            let outbox = outbox.clone();
            Box::pin(async move { outbox.handle_message(value).await })
        }));
    }

    /// Transforms `activity`, expands and coalesces `targets` into
    /// recipients, and delivers to each: queued by default, or attempted
    /// inline (still falling back to the queue on a transient failure) when
    /// `options.immediate` is set.
    pub async fn send_activity(
        &self,
        mut activity: Node,
        sender_actor_id: &str,
        targets: Vec<RecipientTarget>,
        sender_key: SenderKeyPair,
        loader: &dyn DocumentLoader,
        options: DeliveryOptions,
    ) -> Result<()> {
        apply_chain(&mut activity, &self.chain)?;
        let payload = apfed_vocab::to_json_ld(&activity);

        let expanded = expand_recipients(targets, sender_actor_id, loader, self.followers.as_deref()).await?;
        let recipients = coalesce(expanded, self.settings.prefer_shared_inbox);

        for recipient in &recipients {
            let message = DeliveryMessage {
                inbox: recipient
                    .delivery_inbox(self.settings.prefer_shared_inbox)
                    .to_string(),
                payload: payload.clone(),
                sender_private_key_pem: sender_key.private_key_pem.clone(),
                sender_public_key_id: sender_key.public_key_id.clone(),
                attempt: 1,
                first_attempt_millis: now_millis(),
            };
            if options.immediate {
                self.attempt_delivery(message).await?;
            } else {
                let value = serde_json::to_value(&message)
                    .map_err(|e| ApfedError::internal("failed to serialize delivery message").with_source(e))?;
                self.queue.enqueue(value, EnqueueOptions::default()).await?;
                self.metrics.enqueued.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    async fn handle_message(&self, value: Value) -> Result<()> {
        let message: DeliveryMessage = serde_json::from_value(value)
            .map_err(|e| ApfedError::internal("malformed delivery message").with_source(e))?;
        self.attempt_delivery(message).await
    }

    /// Delivers `message` once and routes the outcome: success, a permanent
    /// failure report, or a transient re-enqueue through [`Self::retry_or_fail`].
    async fn attempt_delivery(&self, message: DeliveryMessage) -> Result<()> {
        let sender_key = SenderKeyPair {
            private_key_pem: message.sender_private_key_pem.clone(),
            public_key_id: message.sender_public_key_id.clone(),
        };
        let body = bytes::Bytes::from(serde_json::to_vec(&message.payload).unwrap_or_default());

        let outcome = deliver(
            &self.client,
            &message.inbox,
            body,
            &sender_key,
            &self.settings.user_agent,
        )
        .await?;

        match outcome {
            Outcome::Delivered => {
                self.metrics.delivered.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Outcome::Permanent => {
                self.metrics.permanently_failed.fetch_add(1, Ordering::Relaxed);
                self.fail(
                    ApfedError::permanent("receiving server rejected the activity")
                        .with_context("inbox", message.inbox.clone()),
                    &message,
                );
                Ok(())
            }
            Outcome::Transient => self.retry_or_fail(message).await,
        }
    }

    async fn retry_or_fail(&self, message: DeliveryMessage) -> Result<()> {
        let elapsed = Duration::from_millis(now_millis().saturating_sub(message.first_attempt_millis));
        match retry::decide(&self.settings.retry, message.attempt, elapsed) {
            RetryDecision::Retry(delay) => {
                self.metrics.retried.fetch_add(1, Ordering::Relaxed);
                let next = DeliveryMessage {
                    attempt: message.attempt + 1,
                    ..message
                };
                let value = serde_json::to_value(&next)
                    .map_err(|e| ApfedError::internal("failed to serialize delivery message").with_source(e))?;
                self.queue.enqueue(value, EnqueueOptions::after(delay)).await?;
                Ok(())
            }
            RetryDecision::Exhausted => {
                self.metrics.permanently_failed.fetch_add(1, Ordering::Relaxed);
                self.fail(
                    ApfedError::transient("delivery retry budget exhausted")
                        .with_context("inbox", message.inbox.clone())
                        .with_context("attempts", message.attempt),
                    &message,
                );
                Ok(())
            }
        }
    }

    fn fail(&self, error: ApfedError, message: &DeliveryMessage) {
        tracing::error!(target: "apfed.outbox", inbox = %message.inbox, error = %error, "delivery failed");
        if let Some(handler) = &self.on_failure {
            handler(error, message);
        }
    }
}
