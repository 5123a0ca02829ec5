//! Event model for the gateway.
//!
//! Everything that happens in the intake-to-booking workflow travels as an
//! immutable [`EventEnvelope`]. The payload is a tagged union with one
//! variant per event type so that agent dispatch is checked exhaustively at
//! compile time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::diary::{ClinicalDocument, DeteriorationSeverity, RiskLevel, SlotOption};

/// Delivery channel for patient-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Live websocket session
    WebSocket,
    /// SMS provider
    Sms,
    /// Email provider
    Email,
    /// Chat-bot platform
    Chat,
}

impl Default for Channel {
    fn default() -> Self {
        Self::WebSocket
    }
}

/// Who sent an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    /// The patient themselves
    Patient,
    /// Someone answering on the patient's behalf
    Helper,
    /// The patient's GP practice
    Gp,
    /// Internal system component
    System,
    /// Post-booking monitoring
    Monitoring,
}

/// Discriminant of an event, derivable from its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    UserMessage,
    IntakeComplete,
    IntakeDataProvided,
    NeedsIntakeData,
    GpQuery,
    GpResponse,
    DocumentUploaded,
    ClinicalComplete,
    DeteriorationAlert,
    BookingComplete,
    RescheduleRequest,
    Heartbeat,
}

/// Typed event payload, one variant per [`EventType`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Free text from the patient or a helper.
    UserMessage { text: String, channel: Channel },
    /// Intake has collected all required demographics.
    IntakeComplete,
    /// Structured demographic fields, e.g. from a form submission.
    IntakeDataProvided { fields: HashMap<String, String> },
    /// Clinical phase needs demographics that are still missing (backward loop).
    NeedsIntakeData { missing: Vec<String> },
    /// Outbound query to the patient's GP.
    GpQuery { question: String },
    /// Reply from the GP, possibly carrying lab values.
    GpResponse {
        message: String,
        lab_values: HashMap<String, String>,
    },
    /// A clinical document was uploaded and pre-processed.
    DocumentUploaded { document: ClinicalDocument },
    /// Clinical interview finished and a risk score was produced.
    ClinicalComplete {
        risk_level: RiskLevel,
        method: String,
        reasoning: String,
        condition_context: Option<String>,
    },
    /// Post-booking monitoring detected deterioration.
    DeteriorationAlert {
        severity: DeteriorationSeverity,
        symptoms: Vec<String>,
        reported_values: HashMap<String, String>,
        bring_forward: bool,
    },
    /// An appointment was confirmed.
    BookingComplete {
        appointment_id: String,
        slot: SlotOption,
    },
    /// The patient wants a different appointment.
    RescheduleRequest { reason: Option<String> },
    /// Scheduled monitoring check, `day` days since the appointment was booked.
    Heartbeat { day: u32 },
}

impl EventPayload {
    /// The event type this payload corresponds to.
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::UserMessage { .. } => EventType::UserMessage,
            EventPayload::IntakeComplete => EventType::IntakeComplete,
            EventPayload::IntakeDataProvided { .. } => EventType::IntakeDataProvided,
            EventPayload::NeedsIntakeData { .. } => EventType::NeedsIntakeData,
            EventPayload::GpQuery { .. } => EventType::GpQuery,
            EventPayload::GpResponse { .. } => EventType::GpResponse,
            EventPayload::DocumentUploaded { .. } => EventType::DocumentUploaded,
            EventPayload::ClinicalComplete { .. } => EventType::ClinicalComplete,
            EventPayload::DeteriorationAlert { .. } => EventType::DeteriorationAlert,
            EventPayload::BookingComplete { .. } => EventType::BookingComplete,
            EventPayload::RescheduleRequest { .. } => EventType::RescheduleRequest,
            EventPayload::Heartbeat { .. } => EventType::Heartbeat,
        }
    }
}

/// An immutable event envelope.
///
/// `event_id` doubles as the idempotency key: the gateway processes each id
/// at most once. `correlation_id` links a causal chain of events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID (dedup key)
    pub event_id: String,
    /// Patient this event concerns
    pub patient_id: String,
    /// Typed payload
    pub payload: EventPayload,
    /// Origin of the event (channel name, subsystem, ...)
    pub source: String,
    /// Sender identifier
    pub sender_id: String,
    /// Role of the sender
    pub sender_role: SenderRole,
    /// Links a causal chain of events
    pub correlation_id: Option<String>,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    /// Create a new envelope with a fresh event ID.
    pub fn new(
        patient_id: impl Into<String>,
        payload: EventPayload,
        sender_role: SenderRole,
    ) -> Self {
        let patient_id = patient_id.into();
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            sender_id: patient_id.clone(),
            patient_id,
            payload,
            source: "gateway".to_string(),
            sender_role,
            correlation_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Set the source.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Set the sender ID.
    pub fn with_sender(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = sender_id.into();
        self
    }

    /// Set the correlation ID.
    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Create a follow-on event inheriting the causal chain of `cause`.
    pub fn caused_by(
        cause: &EventEnvelope,
        payload: EventPayload,
        sender_role: SenderRole,
    ) -> Self {
        let correlation = cause
            .correlation_id
            .clone()
            .unwrap_or_else(|| cause.event_id.clone());
        Self::new(&cause.patient_id, payload, sender_role)
            .with_source("gateway")
            .with_correlation(correlation)
    }

    /// The event type of this envelope.
    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    /// Channel the sender used, if the payload carries one.
    pub fn channel(&self) -> Option<Channel> {
        match &self.payload {
            EventPayload::UserMessage { channel, .. } => Some(*channel),
            _ => None,
        }
    }
}
