//! Per-patient processing log.
//!
//! Records the outcome of every event the gateway handles, including
//! duplicates and agent failures, so operators can reconstruct exactly
//! what happened for a patient.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use triage_diary::EventType;

/// How an event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStatus {
    /// Processed and the diary saved
    Ok,
    /// Skipped: the event ID had already been processed
    Duplicate,
    /// The owning agent returned an error; the diary was not saved
    AgentError,
    /// The diary could not be saved after retries
    SaveFailed,
}

/// One entry in a patient's processing log.
#[derive(Debug, Clone)]
pub struct EventLogEntry {
    /// Event ID
    pub event_id: String,
    /// Event type
    pub event_type: EventType,
    /// Outcome
    pub status: ProcessingStatus,
    /// Agent that handled the event, if routing got that far
    pub agent: Option<&'static str>,
    /// Error detail for failed entries
    pub detail: Option<String>,
    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,
}

/// Append-only per-patient event log.
pub struct EventLog {
    entries: DashMap<String, Vec<EventLogEntry>>,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Record an outcome for a patient.
    pub fn record(
        &self,
        patient_id: &str,
        event_id: &str,
        event_type: EventType,
        status: ProcessingStatus,
        agent: Option<&'static str>,
        detail: Option<String>,
    ) {
        let entry = EventLogEntry {
            event_id: event_id.to_string(),
            event_type,
            status,
            agent,
            detail,
            timestamp: Utc::now(),
        };
        self.entries
            .entry(patient_id.to_string())
            .or_default()
            .push(entry);
    }

    /// All entries for a patient, oldest first.
    pub fn for_patient(&self, patient_id: &str) -> Vec<EventLogEntry> {
        self.entries
            .get(patient_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    /// Total entries across all patients.
    pub fn len(&self) -> usize {
        self.entries.iter().map(|e| e.value().len()).sum()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
