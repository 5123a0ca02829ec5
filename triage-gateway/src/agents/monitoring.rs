//! Monitoring agent: post-booking deterioration watch.
//!
//! Owns the MONITORING phase between booking confirmation and the
//! appointment. Scheduled heartbeats prompt a check-in; patient messages
//! are scanned for concerning symptoms. A concerning mention opens a short
//! interactive assessment; its outcome becomes a deterioration alert for
//! the clinical agent to reassess. Emergency combinations bypass the
//! assessment entirely.

use async_trait::async_trait;
use tracing::{info, warn};

use triage_diary::diary::DeteriorationAssessment;
use triage_diary::{
    DeteriorationSeverity, EventEnvelope, EventPayload, PatientDiary, SenderRole,
};

use crate::agent::{Agent, AgentError, AgentResponse, AgentResult, Result};
use crate::text::contains_symptom;

/// Days between scheduled check-ins.
const CHECK_INTERVAL_DAYS: u32 = 3;

/// Symptoms that open an interactive assessment.
const CONCERNING_SYMPTOMS: &[&str] = &[
    "jaundice",
    "yellowing",
    "confusion",
    "confused",
    "drowsy",
    "swelling",
    "black stools",
    "fever",
    "worse",
];

/// Fixed assessment questions, asked in order.
const ASSESSMENT_QUESTIONS: &[&str] = &[
    "How long have you had these symptoms?",
    "On a scale of 0 to 10, how bad does it feel right now?",
    "Have you noticed anything else unusual, such as fever, vomiting or changes in your stools?",
];

/// Phrases that signal the patient wants to move their appointment.
const RESCHEDULE_PHRASES: &[&str] = &[
    "reschedule",
    "rearrange",
    "change my appointment",
    "move my appointment",
    "can't make",
    "cannot make",
    "different day",
];

const EMERGENCY_MESSAGE: &str =
    "Your symptoms need urgent attention. Please go to A&E now or call 999. \
     The clinic has been notified.";

/// The monitoring agent.
pub struct MonitoringAgent;

impl MonitoringAgent {
    pub fn new() -> Self {
        Self
    }

    /// Welcome the patient into monitoring after booking.
    fn handle_booking_complete(&self, event: &EventEnvelope, mut diary: PatientDiary) -> AgentResult {
        let channel = diary.intake.preferred_channel;
        let plan = format!(
            "We will check in with you every {CHECK_INTERVAL_DAYS} days until your \
             appointment. You can message us any time if you feel worse."
        );
        diary.monitoring.communication_plan = Some(plan.clone());
        if diary.monitoring.next_check_day.is_none() {
            diary.monitoring.next_check_day = Some(CHECK_INTERVAL_DAYS);
        }

        AgentResult::diary_only(diary).with_response(AgentResponse::to(
            &event.patient_id,
            channel,
            plan,
        ))
    }

    /// Scheduled check-in.
    fn handle_heartbeat(&self, event: &EventEnvelope, day: u32, mut diary: PatientDiary) -> AgentResult {
        let channel = diary.intake.preferred_channel;

        if !diary.monitoring.monitoring_active || diary.monitoring.escalated {
            return AgentResult::diary_only(diary);
        }

        diary.monitoring.next_check_day = Some(day + CHECK_INTERVAL_DAYS);

        // An assessment already in flight takes priority over the routine
        // check-in prompt.
        if diary.monitoring.assessment.is_some() {
            return AgentResult::diary_only(diary);
        }

        AgentResult::diary_only(diary).with_response(AgentResponse::to(
            &event.patient_id,
            channel,
            "Just checking in ahead of your appointment. How are you feeling? \
             Any new symptoms, or anything getting worse?",
        ))
    }

    /// A message from the patient while under monitoring.
    fn handle_message(&self, event: &EventEnvelope, text: &str, mut diary: PatientDiary) -> AgentResult {
        let channel = diary.intake.preferred_channel;

        // After an emergency escalation nothing else is negotiated.
        if diary.monitoring.escalated {
            return AgentResult::diary_only(diary).with_response(AgentResponse::to(
                &event.patient_id,
                channel,
                EMERGENCY_MESSAGE,
            ));
        }

        let lowered = text.to_lowercase();
        if RESCHEDULE_PHRASES.iter().any(|p| lowered.contains(p)) {
            info!(patient_id = %diary.patient_id, "Reschedule intent detected");
            let request = EventEnvelope::caused_by(
                event,
                EventPayload::RescheduleRequest {
                    reason: Some(text.to_string()),
                },
                SenderRole::Monitoring,
            );
            return AgentResult::diary_only(diary).with_event(request);
        }

        if is_emergency(text) {
            return self.escalate_emergency(event, text, diary);
        }

        // An assessment in flight collects answers until it has enough.
        if let Some(assessment) = diary.monitoring.assessment.clone() {
            return self.continue_assessment(event, text, assessment, diary);
        }

        let symptoms: Vec<String> = CONCERNING_SYMPTOMS
            .iter()
            .filter(|s| contains_symptom(text, s))
            .map(|s| s.to_string())
            .collect();

        if symptoms.is_empty() {
            return AgentResult::diary_only(diary).with_response(AgentResponse::to(
                &event.patient_id,
                channel,
                "Thanks for the update, that sounds reassuring. We will check in \
                 again before your appointment.",
            ));
        }

        info!(patient_id = %diary.patient_id, ?symptoms, "Opening deterioration assessment");
        diary.monitoring.assessment = Some(DeteriorationAssessment {
            symptoms,
            answers: Vec::new(),
        });

        AgentResult::diary_only(diary).with_response(AgentResponse::to(
            &event.patient_id,
            channel,
            format!(
                "Thank you for telling us. A couple of quick questions. {}",
                ASSESSMENT_QUESTIONS[0]
            ),
        ))
    }

    /// Record an assessment answer, ask the next question or conclude.
    fn continue_assessment(
        &self,
        event: &EventEnvelope,
        text: &str,
        mut assessment: DeteriorationAssessment,
        mut diary: PatientDiary,
    ) -> AgentResult {
        let channel = diary.intake.preferred_channel;
        assessment.answers.push(text.to_string());

        if assessment.answers.len() < ASSESSMENT_QUESTIONS.len() {
            let next = ASSESSMENT_QUESTIONS[assessment.answers.len()];
            diary.monitoring.assessment = Some(assessment);
            return AgentResult::diary_only(diary).with_response(AgentResponse::to(
                &event.patient_id,
                channel,
                next,
            ));
        }

        let severity = classify_severity(&assessment);

        if severity == DeteriorationSeverity::Emergency {
            diary.monitoring.assessment = Some(assessment.clone());
            return self.escalate_emergency(event, &assessment.answers.join("; "), diary);
        }
        diary.monitoring.assessment = None;

        let bring_forward = severity >= DeteriorationSeverity::Moderate;
        info!(
            patient_id = %diary.patient_id,
            severity = severity.as_str(),
            bring_forward,
            "Assessment concluded"
        );

        let alert = EventEnvelope::caused_by(
            event,
            EventPayload::DeteriorationAlert {
                severity,
                symptoms: assessment.symptoms.clone(),
                reported_values: Default::default(),
                bring_forward,
            },
            SenderRole::Monitoring,
        );

        let message = if bring_forward {
            "Thank you. We are passing this to the clinical team to review \
             whether your appointment should be brought forward."
        } else {
            "Thank you. This does not sound urgent, but keep an eye on it and \
             message us again if anything changes."
        };

        AgentResult::diary_only(diary)
            .with_response(AgentResponse::to(&event.patient_id, channel, message))
            .with_event(alert)
    }

    /// Immediate escalation: emergency advice, stop routine monitoring.
    fn escalate_emergency(
        &self,
        event: &EventEnvelope,
        detail: &str,
        mut diary: PatientDiary,
    ) -> AgentResult {
        let channel = diary.intake.preferred_channel;
        warn!(patient_id = %diary.patient_id, detail = %detail, "Emergency escalation");

        let symptoms = diary
            .monitoring
            .assessment
            .take()
            .map(|a| a.symptoms)
            .unwrap_or_else(|| vec![detail.to_string()]);

        diary.monitoring.escalated = true;
        diary.monitoring.monitoring_active = false;

        let alert = EventEnvelope::caused_by(
            event,
            EventPayload::DeteriorationAlert {
                severity: DeteriorationSeverity::Emergency,
                symptoms,
                reported_values: Default::default(),
                bring_forward: false,
            },
            SenderRole::Monitoring,
        );

        AgentResult::diary_only(diary)
            .with_response(AgentResponse::to(&event.patient_id, channel, EMERGENCY_MESSAGE))
            .with_event(alert)
    }
}

impl Default for MonitoringAgent {
    fn default() -> Self {
        Self::new()
    }
}

/// Emergency symptom combinations that bypass the assessment.
fn is_emergency(text: &str) -> bool {
    if contains_symptom(text, "vomiting blood") || contains_symptom(text, "vomited blood") {
        return true;
    }
    let jaundiced = contains_symptom(text, "jaundice") || contains_symptom(text, "yellowing");
    let confused = contains_symptom(text, "confusion")
        || contains_symptom(text, "confused")
        || contains_symptom(text, "drowsy");
    jaundiced && confused
}

/// Grade a completed assessment.
fn classify_severity(assessment: &DeteriorationAssessment) -> DeteriorationSeverity {
    let mut score = assessment.symptoms.len() as u32;

    let answers = assessment.answers.join(" ").to_lowercase();
    if let Some(pain) = extract_severity_rating(&answers) {
        if pain >= 8 {
            score += 2;
        } else if pain >= 5 {
            score += 1;
        }
    }
    if answers.contains("worse") || answers.contains("getting bad") {
        score += 1;
    }
    if contains_symptom(&answers, "vomiting blood") || contains_symptom(&answers, "vomited blood") {
        return DeteriorationSeverity::Emergency;
    }

    if score >= 4 {
        DeteriorationSeverity::Severe
    } else if score >= 2 {
        DeteriorationSeverity::Moderate
    } else {
        DeteriorationSeverity::Mild
    }
}

/// First 0-10 rating mentioned in the answers.
fn extract_severity_rating(text: &str) -> Option<u32> {
    for token in text.split_whitespace() {
        let cleaned: String = token
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if let Ok(n) = cleaned.parse::<u32>() {
            if n <= 10 {
                return Some(n);
            }
        }
    }
    None
}

#[async_trait]
impl Agent for MonitoringAgent {
    fn name(&self) -> &'static str {
        "monitoring"
    }

    async fn process(&self, event: &EventEnvelope, diary: PatientDiary) -> Result<AgentResult> {
        match &event.payload {
            EventPayload::BookingComplete { .. } => Ok(self.handle_booking_complete(event, diary)),
            EventPayload::Heartbeat { day } => Ok(self.handle_heartbeat(event, *day, diary)),
            EventPayload::UserMessage { text, .. } => Ok(self.handle_message(event, text, diary)),
            _ => Err(AgentError::UnexpectedEvent {
                agent: self.name(),
                event_type: event.event_type(),
            }),
        }
    }
}
