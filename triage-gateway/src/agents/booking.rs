//! Booking agent: risk-prioritized appointment scheduling.
//!
//! Owns the BOOKING phase. Offers slots inside a window sized by the
//! scored risk level, confirms the patient's pick against the slot
//! registry, and handles reschedules. A hold that lapsed or a slot that
//! was taken by another patient is handled by transparently offering a
//! fresh set; the patient is never shown an error.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use triage_diary::{
    EventEnvelope, EventPayload, PatientDiary, Phase, RiskLevel, SenderRole, SlotOption,
};

use crate::agent::{Agent, AgentError, AgentResponse, AgentResult, Result};
use crate::config::BookingConfig;
use crate::registry::{SlotError, SlotRegistry};

/// Clinic session times offered each day.
const SESSION_TIMES: &[(u32, u32)] = &[(9, 0), (11, 30), (14, 0), (16, 30)];

/// Providers slots rotate across.
const PROVIDERS: &[&str] = &["Dr Patel", "Dr Okafor", "Nurse Lee"];

/// The booking agent.
pub struct BookingAgent {
    registry: Arc<SlotRegistry>,
    config: BookingConfig,
}

impl BookingAgent {
    /// Create a booking agent over a shared slot registry.
    pub fn new(registry: Arc<SlotRegistry>, config: BookingConfig) -> Self {
        Self { registry, config }
    }

    /// Appointment window in days for a risk level.
    fn window_days(&self, risk: RiskLevel) -> u32 {
        match risk {
            RiskLevel::Critical | RiskLevel::High => self.config.urgent_window_days,
            RiskLevel::Medium => self.config.soon_window_days,
            RiskLevel::Low | RiskLevel::None => self.config.routine_window_days,
        }
    }

    /// Deterministic candidate slots inside the window, earliest first.
    fn candidate_slots(&self, risk: RiskLevel) -> Vec<SlotOption> {
        let start = Utc::now().date_naive() + ChronoDuration::days(1);
        let window = self.window_days(risk);

        let mut candidates = Vec::new();
        for day in 0..window {
            let date = start + ChronoDuration::days(day as i64);
            for (index, (hour, minute)) in SESSION_TIMES.iter().enumerate() {
                let Some(time) = NaiveTime::from_hms_opt(*hour, *minute, 0) else {
                    continue;
                };
                let provider = PROVIDERS[(day as usize + index) % PROVIDERS.len()];
                candidates.push(SlotOption::new(date, time, provider));
            }
        }
        candidates
    }

    /// Offer a fresh set of slots to the patient.
    fn offer(&self, event: &EventEnvelope, mut diary: PatientDiary, preamble: &str) -> AgentResult {
        let risk = diary.header.risk_level;
        let candidates = self.candidate_slots(risk);
        let held =
            self.registry
                .offer_slots(&diary.patient_id, &candidates, self.config.slots_per_offer);

        let channel = diary.intake.preferred_channel;
        if held.is_empty() {
            warn!(patient_id = %diary.patient_id, "No slots available to offer");
            diary.booking.offered_slots.clear();
            return AgentResult::diary_only(diary).with_response(AgentResponse::to(
                &event.patient_id,
                channel,
                "We are very sorry, there are no appointments available right now. \
                 The clinic team has been notified and will contact you directly.",
            ));
        }

        let mut lines = vec![preamble.to_string()];
        for (index, slot) in held.iter().enumerate() {
            lines.push(format!("{}. {}", index + 1, slot));
        }
        lines.push("Please reply with the number of the appointment you would like.".to_string());

        info!(
            patient_id = %diary.patient_id,
            risk = risk.as_str(),
            offered = held.len(),
            "Slots offered"
        );
        diary.booking.offered_slots = held;

        AgentResult::diary_only(diary).with_response(AgentResponse::to(
            &event.patient_id,
            channel,
            lines.join("\n"),
        ))
    }

    /// Start booking after the clinical phase hands over.
    fn handle_clinical_complete(
        &self,
        event: &EventEnvelope,
        risk_level: RiskLevel,
        diary: PatientDiary,
    ) -> AgentResult {
        // A deterioration reschedule cleared the diary booking; the registry
        // may still hold the old confirmed slot.
        if !diary.booking.confirmed {
            if let Some(old_slot) = self.registry.get_patient_booking(&diary.patient_id) {
                if let Err(err) = self.registry.cancel_booking(&diary.patient_id, &old_slot) {
                    warn!(patient_id = %diary.patient_id, error = %err, "Stale booking cleanup failed");
                }
            }
        }

        let preamble = match risk_level {
            RiskLevel::Critical | RiskLevel::High => {
                "The clinical team would like to see you urgently. \
                 Here are the earliest available appointments:"
            }
            RiskLevel::Medium => {
                "The clinical team would like to see you soon. \
                 Here are the available appointments:"
            }
            _ => "Here are the available appointments for your visit:",
        };

        self.offer(event, diary, preamble)
    }

    /// Handle the patient's slot pick.
    fn handle_selection(
        &self,
        event: &EventEnvelope,
        text: &str,
        mut diary: PatientDiary,
    ) -> AgentResult {
        let channel = diary.intake.preferred_channel;

        if diary.booking.offered_slots.is_empty() {
            return AgentResult::diary_only(diary).with_response(AgentResponse::to(
                &event.patient_id,
                channel,
                "We will send you appointment options shortly.",
            ));
        }

        let Some(choice) = parse_choice(text, diary.booking.offered_slots.len()) else {
            let count = diary.booking.offered_slots.len();
            return AgentResult::diary_only(diary).with_response(AgentResponse::to(
                &event.patient_id,
                channel,
                format!("Sorry, we didn't catch that. Please reply with a number from 1 to {count}."),
            ));
        };

        let slot = diary.booking.offered_slots[choice - 1].clone();
        match self.registry.confirm(&diary.patient_id, &slot) {
            Ok(()) => self.confirm_booking(event, slot, diary),
            Err(SlotError::HoldExpired(_)) | Err(SlotError::SlotTaken) | Err(SlotError::NoHold(_)) => {
                // The claim lapsed or lost a race; re-offer without fuss.
                info!(patient_id = %diary.patient_id, "Selected slot no longer claimable, re-offering");
                diary.booking.offered_slots.clear();
                self.offer(
                    event,
                    diary,
                    "That appointment is no longer available, sorry. \
                     Here are the latest options:",
                )
            }
            Err(err) => {
                warn!(patient_id = %diary.patient_id, error = %err, "Slot confirmation failed");
                diary.booking.offered_slots.clear();
                self.offer(event, diary, "Here are the latest available appointments:")
            }
        }
    }

    /// Finalize a confirmed booking.
    fn confirm_booking(
        &self,
        event: &EventEnvelope,
        slot: SlotOption,
        mut diary: PatientDiary,
    ) -> AgentResult {
        let appointment_id = uuid::Uuid::new_v4().to_string();
        let channel = diary.intake.preferred_channel;

        diary.booking.selected_slot = Some(slot.clone());
        diary.booking.confirmed = true;
        diary.booking.booked_by = Some(event.sender_id.clone());
        diary.booking.appointment_id = Some(appointment_id.clone());
        diary.booking.offered_slots.clear();
        diary.booking.pre_appointment_instructions = build_instructions(&diary);

        // Baseline for post-booking monitoring comparisons.
        diary.monitoring.baseline = diary.clinical.merged_lab_values();
        diary.monitoring.monitoring_active = true;
        diary.monitoring.next_check_day = Some(3);
        diary.header.current_phase = Phase::Monitoring;

        info!(
            patient_id = %diary.patient_id,
            appointment_id = %appointment_id,
            slot = %slot,
            "Booking confirmed"
        );

        let mut message = format!("Your appointment is confirmed: {slot}.");
        if !diary.booking.pre_appointment_instructions.is_empty() {
            message.push_str("\n\nBefore your appointment:");
            for instruction in &diary.booking.pre_appointment_instructions {
                message.push_str(&format!("\n- {instruction}"));
            }
        }

        let complete = EventEnvelope::caused_by(
            event,
            EventPayload::BookingComplete {
                appointment_id,
                slot,
            },
            SenderRole::System,
        );

        AgentResult::diary_only(diary)
            .with_response(AgentResponse::to(&event.patient_id, channel, message))
            .with_event(complete)
    }

    /// Handle a reschedule request for an existing booking.
    fn handle_reschedule(
        &self,
        event: &EventEnvelope,
        mut diary: PatientDiary,
    ) -> AgentResult {
        let channel = diary.intake.preferred_channel;

        if !diary.booking.confirmed {
            return self.offer(event, diary, "Here are the available appointments:");
        }

        let Some(old_slot) = diary.booking.selected_slot.take() else {
            diary.booking.confirmed = false;
            return self.offer(event, diary, "Here are the available appointments:");
        };

        if let Err(err) = self.registry.cancel_booking(&diary.patient_id, &old_slot) {
            // Registry disagrees with the diary; keep the diary authoritative
            // but surface the inconsistency in the logs.
            warn!(patient_id = %diary.patient_id, error = %err, "Registry cancel failed during reschedule");
        }

        diary.booking.rescheduled_from.push(old_slot);
        diary.booking.confirmed = false;
        diary.booking.appointment_id = None;
        diary.monitoring.monitoring_active = false;
        diary.header.current_phase = Phase::Booking;

        info!(patient_id = %diary.patient_id, channel = ?channel, "Reschedule requested");
        self.offer(
            event,
            diary,
            "Of course, we have cancelled that appointment. Here are the alternatives:",
        )
    }
}

/// Parse a slot pick out of a reply.
fn parse_choice(text: &str, offered: usize) -> Option<usize> {
    let trimmed = text.trim();

    // A bare number, or the first number token in the reply.
    for token in trimmed.split_whitespace() {
        let cleaned: String = token.chars().filter(|c| c.is_ascii_digit()).collect();
        if let Ok(n) = cleaned.parse::<usize>() {
            if (1..=offered).contains(&n) {
                return Some(n);
            }
        }
    }

    let lowered = trimmed.to_lowercase();
    for (word, n) in [("one", 1), ("first", 1), ("two", 2), ("second", 2), ("three", 3), ("third", 3)] {
        if lowered.contains(word) && n <= offered {
            return Some(n);
        }
    }
    None
}

/// Personalized pre-appointment instructions from the clinical record.
fn build_instructions(diary: &PatientDiary) -> Vec<String> {
    let mut instructions = Vec::new();
    let clinical = &diary.clinical;

    let takes = |name: &str| {
        clinical
            .medications
            .iter()
            .any(|m| m.to_lowercase().contains(name))
    };

    if takes("warfarin") || takes("apixaban") || takes("rivaroxaban") {
        instructions.push(
            "You take a blood thinner. Please bring your latest INR record or \
             anticoagulant booklet with you."
                .to_string(),
        );
    }
    if takes("insulin") || takes("metformin") {
        instructions.push(
            "Do not skip meals before your appointment; bring your diabetes \
             medication with you."
                .to_string(),
        );
    }
    if takes("statin") || takes("atorvastatin") || takes("simvastatin") {
        instructions.push(
            "Take your usual medications as normal, including your statin.".to_string(),
        );
    }

    match clinical.condition_context.as_deref() {
        Some("cirrhosis") => instructions.push(
            "Please avoid alcohol completely before your appointment.".to_string(),
        ),
        Some("mash") => instructions.push(
            "Please bring a note of your weight and any recent blood sugar readings.".to_string(),
        ),
        _ => {}
    }

    if clinical
        .allergies
        .iter()
        .any(|a| a != crate::agents::clinical::extract::NO_KNOWN_ALLERGIES)
    {
        instructions.push(
            "Please remind the clinic team of your allergies when you arrive.".to_string(),
        );
    }

    if !clinical.red_flags.is_empty() {
        instructions.push(
            "If your symptoms get worse before your appointment, call NHS 111. \
             If you vomit blood or become confused, go to A&E or call 999."
                .to_string(),
        );
    }

    instructions
}

#[async_trait]
impl Agent for BookingAgent {
    fn name(&self) -> &'static str {
        "booking"
    }

    async fn process(&self, event: &EventEnvelope, diary: PatientDiary) -> Result<AgentResult> {
        match &event.payload {
            EventPayload::ClinicalComplete { risk_level, .. } => {
                Ok(self.handle_clinical_complete(event, *risk_level, diary))
            }
            EventPayload::UserMessage { text, .. } => Ok(self.handle_selection(event, text, diary)),
            EventPayload::RescheduleRequest { .. } => Ok(self.handle_reschedule(event, diary)),
            _ => Err(AgentError::UnexpectedEvent {
                agent: self.name(),
                event_type: event.event_type(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use triage_diary::{Channel, EventType};

    fn booking_setup() -> (BookingAgent, Arc<SlotRegistry>) {
        let registry = Arc::new(SlotRegistry::new(Duration::from_secs(900)));
        let agent = BookingAgent::new(Arc::clone(&registry), BookingConfig::default());
        (agent, registry)
    }

    fn diary_in_booking(risk: RiskLevel) -> PatientDiary {
        let mut diary = PatientDiary::new("patient-1");
        diary.header.current_phase = Phase::Booking;
        diary.header.risk_level = risk;
        diary.clinical.risk_level = Some(risk);
        diary
    }

    fn clinical_complete(risk: RiskLevel) -> EventEnvelope {
        EventEnvelope::new(
            "patient-1",
            EventPayload::ClinicalComplete {
                risk_level: risk,
                method: "deterministic:lab:bilirubin".to_string(),
                reasoning: "test".to_string(),
                condition_context: None,
            },
            SenderRole::System,
        )
    }

    fn user_message(text: &str) -> EventEnvelope {
        EventEnvelope::new(
            "patient-1",
            EventPayload::UserMessage {
                text: text.to_string(),
                channel: Channel::WebSocket,
            },
            SenderRole::Patient,
        )
    }

    #[tokio::test]
    async fn test_offer_respects_risk_window() {
        let (agent, _) = booking_setup();

        let result = agent
            .process(&clinical_complete(RiskLevel::High), diary_in_booking(RiskLevel::High))
            .await
            .unwrap();

        let offered = &result.diary.booking.offered_slots;
        assert_eq!(offered.len(), 3);

        let latest_allowed =
            Utc::now().date_naive() + ChronoDuration::days(1 + BookingConfig::default().urgent_window_days as i64);
        for slot in offered {
            assert!(slot.date < latest_allowed);
        }
        assert!(result.responses[0].message.contains("urgently"));
    }

    #[tokio::test]
    async fn test_numeric_selection_confirms() {
        let (agent, registry) = booking_setup();

        let offered = agent
            .process(&clinical_complete(RiskLevel::Medium), diary_in_booking(RiskLevel::Medium))
            .await
            .unwrap();

        let result = agent
            .process(&user_message("2 please"), offered.diary)
            .await
            .unwrap();

        let booking = &result.diary.booking;
        assert!(booking.confirmed);
        assert!(booking.appointment_id.is_some());
        assert!(booking.offered_slots.is_empty());
        assert_eq!(result.diary.header.current_phase, Phase::Monitoring);
        assert!(result.diary.monitoring.monitoring_active);
        assert!(result
            .emitted
            .iter()
            .any(|e| e.event_type() == EventType::BookingComplete));
        assert!(registry.get_patient_booking("patient-1").is_some());
    }

    #[tokio::test]
    async fn test_unparseable_reply_re_prompts() {
        let (agent, _) = booking_setup();

        let offered = agent
            .process(&clinical_complete(RiskLevel::Low), diary_in_booking(RiskLevel::Low))
            .await
            .unwrap();

        let result = agent
            .process(&user_message("whichever is best"), offered.diary)
            .await
            .unwrap();

        assert!(!result.diary.booking.confirmed);
        assert_eq!(result.diary.booking.offered_slots.len(), 3);
        assert!(result.responses[0].message.contains("1 to 3"));
    }

    #[tokio::test]
    async fn test_expired_hold_transparently_reoffers() {
        let registry = Arc::new(SlotRegistry::new(Duration::from_secs(0)));
        let agent = BookingAgent::new(Arc::clone(&registry), BookingConfig::default());

        let offered = agent
            .process(&clinical_complete(RiskLevel::Low), diary_in_booking(RiskLevel::Low))
            .await
            .unwrap();

        // Zero TTL: the hold is gone by the time the patient replies.
        let result = agent
            .process(&user_message("1"), offered.diary)
            .await
            .unwrap();

        assert!(!result.diary.booking.confirmed);
        assert_eq!(result.diary.booking.offered_slots.len(), 3);
        assert!(result.responses[0].message.contains("no longer available"));
    }

    #[tokio::test]
    async fn test_reschedule_frees_slot_and_reoffers() {
        let (agent, registry) = booking_setup();

        let offered = agent
            .process(&clinical_complete(RiskLevel::Medium), diary_in_booking(RiskLevel::Medium))
            .await
            .unwrap();
        let confirmed = agent
            .process(&user_message("1"), offered.diary)
            .await
            .unwrap();
        let old_slot = confirmed.diary.booking.selected_slot.clone().unwrap();

        let event = EventEnvelope::new(
            "patient-1",
            EventPayload::RescheduleRequest {
                reason: Some("away that week".to_string()),
            },
            SenderRole::Patient,
        );
        let result = agent.process(&event, confirmed.diary).await.unwrap();

        assert!(!result.diary.booking.confirmed);
        assert_eq!(result.diary.booking.rescheduled_from, vec![old_slot.clone()]);
        assert!(!result.diary.monitoring.monitoring_active);
        assert_eq!(registry.get_patient_booking("patient-1"), None);

        // The freed slot can go to someone else.
        let held = registry.offer_slots("patient-2", &[old_slot], 1);
        assert_eq!(held.len(), 1);
    }

    #[tokio::test]
    async fn test_instructions_reflect_medications_and_flags() {
        let (agent, _) = booking_setup();

        let mut diary = diary_in_booking(RiskLevel::Medium);
        diary.clinical.medications.push("warfarin".to_string());
        diary.clinical.allergies.push("penicillin".to_string());
        diary.clinical.red_flags.push("jaundice".to_string());
        diary.clinical.condition_context = Some("cirrhosis".to_string());

        let offered = agent
            .process(&clinical_complete(RiskLevel::Medium), diary)
            .await
            .unwrap();
        let result = agent
            .process(&user_message("1"), offered.diary)
            .await
            .unwrap();

        let instructions = &result.diary.booking.pre_appointment_instructions;
        assert!(instructions.iter().any(|i| i.contains("INR")));
        assert!(instructions.iter().any(|i| i.contains("alcohol")));
        assert!(instructions.iter().any(|i| i.contains("allergies")));
        assert!(instructions.iter().any(|i| i.contains("111")));
    }

    #[tokio::test]
    async fn test_baseline_captured_at_booking() {
        let (agent, _) = booking_setup();

        let mut diary = diary_in_booking(RiskLevel::Low);
        let mut values = std::collections::HashMap::new();
        values.insert("ALT".to_string(), "95".to_string());
        diary.clinical.documents.push(
            triage_diary::ClinicalDocument::new(
                triage_diary::DocumentType::LabReport,
                "upload",
                b"panel",
            )
            .with_values(values),
        );

        let offered = agent
            .process(&clinical_complete(RiskLevel::Low), diary)
            .await
            .unwrap();
        let result = agent
            .process(&user_message("1"), offered.diary)
            .await
            .unwrap();

        assert_eq!(
            result.diary.monitoring.baseline.get("alt").map(String::as_str),
            Some("95")
        );
    }
}
