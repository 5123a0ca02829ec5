//! Intake agent: collects demographics before the clinical interview.
//!
//! Owns the INTAKE phase. Extracts required fields from free text or
//! structured submissions, asks for whatever is still missing one field at
//! a time, and hands the patient to the clinical phase once everything
//! required is present. Also services the backward loop: when a later phase
//! discovers missing demographics it sends the patient back here.

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{debug, info};

use triage_diary::diary::ResponderType;
use triage_diary::{Channel, EventEnvelope, EventPayload, PatientDiary, Phase, SenderRole};

use crate::agent::{Agent, AgentError, AgentResponse, AgentResult, Result};

/// Demographics required before intake completes, in prompting order.
pub const REQUIRED_FIELDS: &[&str] = &["full_name", "date_of_birth", "nhs_number", "phone"];

/// The intake agent.
pub struct IntakeAgent;

impl IntakeAgent {
    pub fn new() -> Self {
        Self
    }

    /// Fields still missing from the diary.
    fn missing_fields(diary: &PatientDiary) -> Vec<&'static str> {
        REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|f| !diary.intake.collected.contains_key(*f))
            .collect()
    }

    /// Prompt for one missing field.
    fn prompt_for(field: &str) -> String {
        match field {
            "full_name" => "Thanks for getting in touch. To get started, what is your full name?".to_string(),
            "date_of_birth" => "What is your date of birth? (for example 14/03/1962)".to_string(),
            "nhs_number" => "What is your NHS number? It is the 10-digit number on any NHS letter.".to_string(),
            "phone" => "What is the best phone number to reach you on?".to_string(),
            other => format!("Could you tell us your {}?", other.replace('_', " ")),
        }
    }

    /// Merge extracted fields into the diary, then either complete intake
    /// or prompt for the next missing field.
    fn advance(
        &self,
        event: &EventEnvelope,
        mut diary: PatientDiary,
        channel: Channel,
    ) -> AgentResult {
        if let Some(phone) = diary.intake.collected.get("phone") {
            diary.intake.contact_phone = Some(phone.clone());
        }
        if let Some(email) = diary.intake.collected.get("email") {
            diary.intake.contact_email = Some(email.clone());
        }

        let missing = Self::missing_fields(&diary);
        if missing.is_empty() {
            diary.intake.intake_complete = true;
            diary.header.current_phase = Phase::Clinical;
            info!(patient_id = %diary.patient_id, "Intake complete");

            let name = diary
                .intake
                .collected
                .get("full_name")
                .cloned()
                .unwrap_or_else(|| "there".to_string());
            let complete =
                EventEnvelope::caused_by(event, EventPayload::IntakeComplete, SenderRole::System);

            return AgentResult::diary_only(diary)
                .with_response(AgentResponse::to(
                    &event.patient_id,
                    channel,
                    format!(
                        "Thank you {name}, we have everything we need. \
                         A clinician's assistant will now ask a few questions about your health."
                    ),
                ))
                .with_event(complete);
        }

        let next = missing[0];
        debug!(patient_id = %diary.patient_id, field = next, "Prompting for missing field");
        AgentResult::diary_only(diary).with_response(AgentResponse::to(
            &event.patient_id,
            channel,
            Self::prompt_for(next),
        ))
    }
}

impl Default for IntakeAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for IntakeAgent {
    fn name(&self) -> &'static str {
        "intake"
    }

    async fn process(&self, event: &EventEnvelope, mut diary: PatientDiary) -> Result<AgentResult> {
        if event.sender_role == SenderRole::Helper {
            diary.intake.responder_type = ResponderType::Helper;
        }

        match &event.payload {
            EventPayload::UserMessage { text, channel } => {
                diary.intake.preferred_channel = *channel;
                let extracted = extract_fields(text, &Self::missing_fields(&diary));
                for (field, value) in extracted {
                    diary.intake.collected.insert(field, value);
                }
                Ok(self.advance(event, diary, *channel))
            }
            EventPayload::IntakeDataProvided { fields } => {
                let channel = diary.intake.preferred_channel;
                for (field, value) in fields {
                    diary.intake.collected.insert(field.clone(), value.clone());
                }
                Ok(self.advance(event, diary, channel))
            }
            EventPayload::NeedsIntakeData { missing } => {
                // Backward loop from a later phase.
                diary.header.current_phase = Phase::Intake;
                diary.intake.intake_complete = false;
                let channel = diary.intake.preferred_channel;

                let field = missing
                    .first()
                    .map(String::as_str)
                    .or_else(|| Self::missing_fields(&diary).first().copied())
                    .unwrap_or("full_name");

                Ok(AgentResult::diary_only(diary).with_response(AgentResponse::to(
                    &event.patient_id,
                    channel,
                    format!(
                        "Before we continue we need one more detail. {}",
                        Self::prompt_for(field)
                    ),
                )))
            }
            _ => Err(AgentError::UnexpectedEvent {
                agent: self.name(),
                event_type: event.event_type(),
            }),
        }
    }
}

fn nhs_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{3})[ -]?(\d{3})[ -]?(\d{4})\b").expect("nhs regex"))
}

fn date_of_birth_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(\d{1,2})[/\-.](\d{1,2})[/\-.](\d{2,4})\b").expect("dob regex")
    })
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:\+44\s?7\d{3}|\(?07\d{3}\)?)[\s-]?\d{3}[\s-]?\d{3}").expect("phone regex")
    })
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:my name is|i am|i'm|this is|name:?)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)+)")
            .expect("name regex")
    })
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email regex")
    })
}

/// Extract whichever of the wanted fields appear in free text.
///
/// The NHS number is matched before the phone number and its digits blanked
/// out, so a 10-digit NHS number is never mistaken for a phone number.
pub fn extract_fields(text: &str, wanted: &[&str]) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    let mut remaining = text.to_string();

    if wanted.contains(&"nhs_number") {
        let found = nhs_number_re().find(&remaining).and_then(|m| {
            let digits: String = m.as_str().chars().filter(|c| c.is_ascii_digit()).collect();
            (digits.len() == 10 && !digits.starts_with("07")).then(|| (digits, m.range()))
        });
        if let Some((digits, span)) = found {
            fields.insert("nhs_number".to_string(), digits);
            let blank = " ".repeat(span.len());
            remaining.replace_range(span, &blank);
        }
    }

    if wanted.contains(&"phone") {
        let found = phone_re()
            .find(&remaining)
            .map(|m| (m.as_str().trim().to_string(), m.range()));
        if let Some((value, span)) = found {
            fields.insert("phone".to_string(), value);
            let blank = " ".repeat(span.len());
            remaining.replace_range(span, &blank);
        }
    }

    if wanted.contains(&"date_of_birth") {
        if let Some(m) = date_of_birth_re().find(&remaining) {
            fields.insert("date_of_birth".to_string(), m.as_str().to_string());
        }
    }

    if wanted.contains(&"full_name") {
        if let Some(m) = name_re().captures(&remaining) {
            fields.insert("full_name".to_string(), m[1].trim().to_string());
        }
    }

    if let Some(m) = email_re().find(&remaining) {
        fields.insert("email".to_string(), m.as_str().to_string());
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_diary::EventType;

    fn user_message(text: &str) -> EventEnvelope {
        EventEnvelope::new(
            "patient-1",
            EventPayload::UserMessage {
                text: text.to_string(),
                channel: Channel::Sms,
            },
            SenderRole::Patient,
        )
    }

    #[test]
    fn test_extract_all_fields() {
        let fields = extract_fields(
            "My name is Jane Smith, born 14/03/1962, NHS number 943 476 5919, call me on 07700 900123",
            REQUIRED_FIELDS,
        );

        assert_eq!(fields.get("full_name").map(String::as_str), Some("Jane Smith"));
        assert_eq!(fields.get("date_of_birth").map(String::as_str), Some("14/03/1962"));
        assert_eq!(fields.get("nhs_number").map(String::as_str), Some("9434765919"));
        assert!(fields.contains_key("phone"));
    }

    #[test]
    fn test_nhs_number_not_mistaken_for_phone() {
        let fields = extract_fields("NHS number is 943 476 5919", REQUIRED_FIELDS);
        assert_eq!(fields.get("nhs_number").map(String::as_str), Some("9434765919"));
        assert!(!fields.contains_key("phone"));
    }

    #[tokio::test]
    async fn test_prompts_for_missing_fields_in_order() {
        let agent = IntakeAgent::new();
        let diary = PatientDiary::new("patient-1");

        let result = agent
            .process(&user_message("hello, I'd like an appointment"), diary)
            .await
            .unwrap();

        assert_eq!(result.responses.len(), 1);
        assert!(result.responses[0].message.contains("full name"));
        assert!(result.emitted.is_empty());
        assert_eq!(result.diary.header.current_phase, Phase::Intake);
    }

    #[tokio::test]
    async fn test_completion_advances_to_clinical() {
        let agent = IntakeAgent::new();
        let diary = PatientDiary::new("patient-1");

        let result = agent
            .process(
                &user_message(
                    "My name is Jane Smith, DOB 14/03/1962, NHS 943 476 5919, phone 07700 900123",
                ),
                diary,
            )
            .await
            .unwrap();

        assert!(result.diary.intake.intake_complete);
        assert_eq!(result.diary.header.current_phase, Phase::Clinical);
        assert_eq!(result.emitted.len(), 1);
        assert_eq!(result.emitted[0].event_type(), EventType::IntakeComplete);
    }

    #[tokio::test]
    async fn test_structured_submission() {
        let agent = IntakeAgent::new();
        let diary = PatientDiary::new("patient-1");

        let mut fields = HashMap::new();
        for (k, v) in [
            ("full_name", "Jane Smith"),
            ("date_of_birth", "14/03/1962"),
            ("nhs_number", "9434765919"),
            ("phone", "07700900123"),
        ] {
            fields.insert(k.to_string(), v.to_string());
        }

        let event = EventEnvelope::new(
            "patient-1",
            EventPayload::IntakeDataProvided { fields },
            SenderRole::Patient,
        );
        let result = agent.process(&event, diary).await.unwrap();

        assert!(result.diary.intake.intake_complete);
        assert_eq!(
            result.diary.intake.contact_phone.as_deref(),
            Some("07700900123")
        );
    }

    #[tokio::test]
    async fn test_helper_sets_responder_type() {
        let agent = IntakeAgent::new();
        let diary = PatientDiary::new("patient-1");

        let mut event = user_message("I'm calling for my mother");
        event.sender_role = SenderRole::Helper;

        let result = agent.process(&event, diary).await.unwrap();
        assert_eq!(result.diary.intake.responder_type, ResponderType::Helper);
    }

    #[tokio::test]
    async fn test_backward_loop_reopens_intake() {
        let agent = IntakeAgent::new();
        let mut diary = PatientDiary::new("patient-1");
        diary.header.current_phase = Phase::Clinical;
        diary.intake.intake_complete = true;

        let event = EventEnvelope::new(
            "patient-1",
            EventPayload::NeedsIntakeData {
                missing: vec!["phone".to_string()],
            },
            SenderRole::System,
        );
        let result = agent.process(&event, diary).await.unwrap();

        assert_eq!(result.diary.header.current_phase, Phase::Intake);
        assert!(!result.diary.intake.intake_complete);
        assert!(result.responses[0].message.contains("phone"));
    }

    #[tokio::test]
    async fn test_unexpected_event_rejected() {
        let agent = IntakeAgent::new();
        let diary = PatientDiary::new("patient-1");
        let event = EventEnvelope::new(
            "patient-1",
            EventPayload::Heartbeat { day: 1 },
            SenderRole::Monitoring,
        );

        let err = agent.process(&event, diary).await.unwrap_err();
        assert!(matches!(err, AgentError::UnexpectedEvent { .. }));
    }
}
