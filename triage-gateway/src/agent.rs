//! The agent contract.
//!
//! Agents are pure event handlers: they receive an event plus the current
//! diary and return the mutated diary, patient-facing responses and
//! follow-on events. They never touch the store or the dispatch layer;
//! the gateway owns persistence, idempotency and the crash boundary.

use async_trait::async_trait;
use std::collections::HashMap;

use triage_diary::{Channel, EventEnvelope, EventType, PatientDiary};

/// Error types for agent processing.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The agent has no handler for this event type.
    #[error("{agent} agent cannot handle {event_type:?}")]
    UnexpectedEvent {
        agent: &'static str,
        event_type: EventType,
    },

    /// Processing failed.
    #[error("agent processing failed: {0}")]
    Processing(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// A message for a patient, GP or staff member.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    /// Who the message is for (patient ID, "gp", "clinic-staff", ...)
    pub recipient: String,
    /// Channel to deliver on
    pub channel: Channel,
    /// Message body
    pub message: String,
    /// File references to attach
    pub attachments: Vec<String>,
    /// Channel-specific metadata
    pub metadata: HashMap<String, String>,
}

impl AgentResponse {
    /// Create a response to a recipient.
    pub fn to(recipient: impl Into<String>, channel: Channel, message: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            channel,
            message: message.into(),
            attachments: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Attach a file reference.
    pub fn with_attachment(mut self, file_ref: impl Into<String>) -> Self {
        self.attachments.push(file_ref.into());
        self
    }

    /// Add metadata for the channel adapter.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// The outcome of one agent invocation.
#[derive(Debug)]
pub struct AgentResult {
    /// The diary after the agent's mutations
    pub diary: PatientDiary,
    /// Messages to deliver
    pub responses: Vec<AgentResponse>,
    /// Follow-on events for the gateway to process next
    pub emitted: Vec<EventEnvelope>,
}

impl AgentResult {
    /// A result that only carries the (possibly mutated) diary.
    pub fn diary_only(diary: PatientDiary) -> Self {
        Self {
            diary,
            responses: Vec::new(),
            emitted: Vec::new(),
        }
    }

    /// Add a response.
    pub fn with_response(mut self, response: AgentResponse) -> Self {
        self.responses.push(response);
        self
    }

    /// Add a follow-on event.
    pub fn with_event(mut self, event: EventEnvelope) -> Self {
        self.emitted.push(event);
        self
    }
}

/// A phase-owning event handler.
///
/// Exactly one agent owns each workflow phase. `process` takes the diary by
/// value: on error the gateway discards the returned state entirely, so a
/// half-finished mutation can never leak into the store.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Short agent name for logs and error messages.
    fn name(&self) -> &'static str;

    /// Handle one event against the current diary.
    async fn process(&self, event: &EventEnvelope, diary: PatientDiary) -> Result<AgentResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_builder() {
        let response = AgentResponse::to("patient-1", Channel::Sms, "hello")
            .with_attachment("ref-123")
            .with_metadata("priority", "high");

        assert_eq!(response.recipient, "patient-1");
        assert_eq!(response.attachments, vec!["ref-123".to_string()]);
        assert_eq!(
            response.metadata.get("priority").map(String::as_str),
            Some("high")
        );
    }
}
