//! Outbound message dispatch.
//!
//! Maps each delivery channel to an adapter. Delivery is best-effort with
//! one retry; a failed delivery is logged and never blocks diary persistence
//! or follow-on event processing.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use triage_diary::Channel;

use crate::agent::AgentResponse;

/// Error types for message delivery.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No adapter is registered for the channel.
    #[error("no dispatcher registered for channel {0:?}")]
    NoChannel(Channel),

    /// The adapter failed to deliver.
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Outcome of a delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    /// Delivered on the first or second attempt
    Delivered,
    /// Both attempts failed
    Failed(String),
}

/// A channel adapter.
#[async_trait]
pub trait ChannelDispatcher: Send + Sync {
    /// The channel this adapter serves.
    fn channel(&self) -> Channel;

    /// Deliver one message.
    async fn deliver(&self, response: &AgentResponse) -> Result<(), DispatchError>;
}

/// Dispatcher that logs messages instead of sending them.
///
/// Stands in for real SMS/email/chat providers in tests and local runs;
/// sent messages are retained for assertions.
pub struct LoggingDispatcher {
    channel: Channel,
    sent: RwLock<Vec<AgentResponse>>,
    fail_next: RwLock<usize>,
}

impl LoggingDispatcher {
    /// Create a logging dispatcher for a channel.
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            sent: RwLock::new(Vec::new()),
            fail_next: RwLock::new(0),
        }
    }

    /// Make the next `count` deliveries fail.
    pub async fn fail_next(&self, count: usize) {
        *self.fail_next.write().await = count;
    }

    /// Messages delivered so far.
    pub async fn sent(&self) -> Vec<AgentResponse> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl ChannelDispatcher for LoggingDispatcher {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn deliver(&self, response: &AgentResponse) -> Result<(), DispatchError> {
        {
            let mut fail = self.fail_next.write().await;
            if *fail > 0 {
                *fail -= 1;
                return Err(DispatchError::DeliveryFailed(
                    "simulated provider failure".to_string(),
                ));
            }
        }

        info!(
            channel = ?self.channel,
            recipient = %response.recipient,
            "Delivering message: {}",
            response.message
        );
        self.sent.write().await.push(response.clone());
        Ok(())
    }
}

/// Registry of channel adapters.
pub struct DispatchRegistry {
    dispatchers: DashMap<Channel, Arc<dyn ChannelDispatcher>>,
    retry_delay: Duration,
}

impl DispatchRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            dispatchers: DashMap::new(),
            retry_delay: Duration::from_millis(200),
        }
    }

    /// Create a registry with a logging adapter on every channel.
    pub fn with_logging_defaults() -> Self {
        let registry = Self::new();
        for channel in [Channel::WebSocket, Channel::Sms, Channel::Email, Channel::Chat] {
            registry.register(Arc::new(LoggingDispatcher::new(channel)));
        }
        registry
    }

    /// Register an adapter, replacing any existing one for its channel.
    pub fn register(&self, dispatcher: Arc<dyn ChannelDispatcher>) {
        self.dispatchers.insert(dispatcher.channel(), dispatcher);
    }

    /// Deliver a response, retrying once on failure.
    pub async fn dispatch(&self, response: &AgentResponse) -> DeliveryResult {
        let Some(dispatcher) = self
            .dispatchers
            .get(&response.channel)
            .map(|d| Arc::clone(d.value()))
        else {
            error!(channel = ?response.channel, "No dispatcher for channel");
            return DeliveryResult::Failed(format!(
                "no dispatcher for channel {:?}",
                response.channel
            ));
        };

        match dispatcher.deliver(response).await {
            Ok(()) => DeliveryResult::Delivered,
            Err(first) => {
                warn!(
                    channel = ?response.channel,
                    recipient = %response.recipient,
                    error = %first,
                    "Delivery failed, retrying once"
                );
                tokio::time::sleep(self.retry_delay).await;

                match dispatcher.deliver(response).await {
                    Ok(()) => DeliveryResult::Delivered,
                    Err(second) => {
                        error!(
                            channel = ?response.channel,
                            recipient = %response.recipient,
                            error = %second,
                            "Delivery failed after retry"
                        );
                        DeliveryResult::Failed(second.to_string())
                    }
                }
            }
        }
    }

    /// Deliver a batch, returning one result per response.
    pub async fn dispatch_all(&self, responses: &[AgentResponse]) -> Vec<DeliveryResult> {
        let mut results = Vec::with_capacity(responses.len());
        for response in responses {
            results.push(self.dispatch(response).await);
        }
        results
    }
}

impl Default for DispatchRegistry {
    fn default() -> Self {
        Self::with_logging_defaults()
    }
}
