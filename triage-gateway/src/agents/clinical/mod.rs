//! Clinical agent: the adaptive interview and risk scoring.
//!
//! Owns the CLINICAL phase. Analyzes the referral, plans a ranked question
//! set, interviews the patient one question at a time, collects documents
//! and GP responses, and finally runs the deterministic risk scorer. The
//! interview is bounded: a hard question cap and a backward-loop cap
//! guarantee it terminates.

pub mod extract;
pub mod questions;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use triage_diary::diary::{ClinicalSubPhase, DeteriorationSeverity};
use triage_diary::{
    Channel, ClinicalDocument, DocumentType, EventEnvelope, EventPayload, PatientDiary, Phase,
    QuestionRecord, RiskLevel, RiskScorer, SenderRole,
};
use triage_llm::LlmClient;

use crate::agent::{Agent, AgentError, AgentResponse, AgentResult, Result};
use crate::agents::intake::REQUIRED_FIELDS;
use crate::config::ClinicalConfig;

/// The clinical agent.
pub struct ClinicalAgent {
    llm: Option<Arc<LlmClient>>,
    scorer: RiskScorer,
    config: ClinicalConfig,
}

impl ClinicalAgent {
    /// Create a clinical agent without LLM assistance.
    pub fn new(config: ClinicalConfig, scorer: RiskScorer) -> Self {
        Self {
            llm: None,
            scorer,
            config,
        }
    }

    /// Attach an LLM client for referral analysis, question planning and
    /// fact extraction.
    pub fn with_llm(mut self, llm: Arc<LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    fn llm(&self) -> Option<&LlmClient> {
        self.llm.as_deref()
    }

    /// Begin the interview once intake hands the patient over.
    async fn start_interview(
        &self,
        event: &EventEnvelope,
        mut diary: PatientDiary,
    ) -> AgentResult {
        diary.clinical.sub_phase = ClinicalSubPhase::AnalyzingReferral;

        let referral_text = referral_text(&diary);
        if let Some(text) = &referral_text {
            let analysis = questions::analyze_referral(self.llm(), text).await;
            if analysis.urgent_language {
                diary.escalate_risk(RiskLevel::Medium);
            }
            diary.clinical.condition_context = analysis.condition_context.clone();
            diary.clinical.referral_analysis = Some(analysis);
        }

        let condition = diary.clinical.condition_context.clone();
        let summary = diary
            .clinical
            .referral_analysis
            .as_ref()
            .map(|a| a.summary.clone());
        diary.clinical.generated_questions =
            questions::plan_questions(self.llm(), condition.as_deref(), summary.as_deref()).await;

        diary.clinical.sub_phase = ClinicalSubPhase::AskingQuestions;
        info!(
            patient_id = %diary.patient_id,
            condition = condition.as_deref().unwrap_or("unknown"),
            questions = diary.clinical.generated_questions.len(),
            "Interview planned"
        );

        let channel = diary.intake.preferred_channel;
        match self.next_question(&mut diary) {
            Some(question) => AgentResult::diary_only(diary)
                .with_response(AgentResponse::to(&event.patient_id, channel, question)),
            None => self.step(event, diary).await,
        }
    }

    /// Pull the next planned question and record it as asked.
    fn next_question(&self, diary: &mut PatientDiary) -> Option<String> {
        if diary.clinical.questions_asked.len() >= self.config.max_questions {
            return None;
        }
        let asked: Vec<String> = diary
            .clinical
            .questions_asked
            .iter()
            .map(|q| q.question.clone())
            .collect();
        let next = diary
            .clinical
            .generated_questions
            .iter()
            .find(|q| !asked.contains(&q.text))?
            .text
            .clone();
        diary
            .clinical
            .questions_asked
            .push(QuestionRecord::asked(next.clone()));
        Some(next)
    }

    /// Handle a free-text answer from the patient.
    async fn handle_answer(
        &self,
        event: &EventEnvelope,
        text: &str,
        channel: Channel,
        mut diary: PatientDiary,
    ) -> AgentResult {
        diary.intake.preferred_channel = channel;

        if diary.clinical.chief_complaint.is_none() {
            diary.clinical.chief_complaint = Some(text.to_string());
        }

        let facts = extract::extract_facts(self.llm(), text).await;
        facts.apply(&mut diary.clinical);

        if let Some(record) = diary.clinical.oldest_unanswered_mut() {
            record.answer = Some(text.to_string());
            record.answered_by = Some(event.sender_id.clone());
        }

        self.step(event, diary).await
    }

    /// Decide what the interview does next.
    async fn step(&self, event: &EventEnvelope, mut diary: PatientDiary) -> AgentResult {
        let channel = diary.intake.preferred_channel;

        // Backward loop: later-phase work discovered missing demographics.
        let missing: Vec<String> = REQUIRED_FIELDS
            .iter()
            .filter(|f| !diary.intake.collected.contains_key(**f))
            .map(|f| f.to_string())
            .collect();
        if !missing.is_empty() {
            if diary.clinical.backward_loop_count < self.config.max_backward_loops {
                diary.clinical.backward_loop_count += 1;
                info!(
                    patient_id = %diary.patient_id,
                    loops = diary.clinical.backward_loop_count,
                    "Returning patient to intake for missing demographics"
                );
                let needs = EventEnvelope::caused_by(
                    event,
                    EventPayload::NeedsIntakeData { missing },
                    SenderRole::System,
                );
                return AgentResult::diary_only(diary).with_event(needs);
            }
            warn!(
                patient_id = %diary.patient_id,
                "Backward loop cap reached, continuing with incomplete demographics"
            );
        }

        if diary.clinical.sub_phase == ClinicalSubPhase::Complete {
            return AgentResult::diary_only(diary);
        }

        // Document window: results arriving or an explicit "I have none"
        // moves to scoring; an unrelated message keeps the window open.
        if diary.clinical.sub_phase == ClinicalSubPhase::CollectingDocuments {
            if let EventPayload::UserMessage { text, .. } = &event.payload {
                if !diary.clinical.has_processed_lab_document() && !declines_documents(text) {
                    return AgentResult::diary_only(diary).with_response(AgentResponse::to(
                        &event.patient_id,
                        channel,
                        "If you have recent blood test results or letters, please upload \
                         them now. If you have none, just say so and we will carry on.",
                    ));
                }
            }
            return self.score(event, diary);
        }

        // Enough on record to score: a chief complaint with the minimum
        // answered questions, or lab results already in hand.
        let enough_answers = diary.clinical.chief_complaint.is_some()
            && diary.clinical.answered_count() >= self.config.min_answered_for_scoring;
        if !enough_answers && !diary.clinical.has_processed_lab_document() {
            if diary.clinical.oldest_unanswered_mut().is_some() {
                // Waiting on an answer already in flight.
                return AgentResult::diary_only(diary);
            }

            if let Some(question) = self.next_question(&mut diary) {
                return AgentResult::diary_only(diary).with_response(AgentResponse::to(
                    &event.patient_id,
                    channel,
                    question,
                ));
            }
        }

        // Interview done: enough answered, exhausted or capped. One document
        // prompt before scoring, unless labs are already in hand.
        if !diary.clinical.document_prompted && !diary.clinical.has_processed_lab_document() {
            diary.clinical.document_prompted = true;
            diary.clinical.sub_phase = ClinicalSubPhase::CollectingDocuments;

            let gp_query = EventEnvelope::caused_by(
                event,
                EventPayload::GpQuery {
                    question: format!(
                        "Please send the most recent liver function tests for patient {}.",
                        diary.patient_id
                    ),
                },
                SenderRole::System,
            );

            return AgentResult::diary_only(diary)
                .with_response(AgentResponse::to(
                    &event.patient_id,
                    channel,
                    "If you have any recent blood test results or letters, please upload \
                     them now. If you have none, just say so and we will carry on.",
                ))
                .with_event(gp_query);
        }

        self.score(event, diary)
    }

    /// Run the risk scorer and hand over to booking.
    fn score(&self, event: &EventEnvelope, mut diary: PatientDiary) -> AgentResult {
        diary.clinical.sub_phase = ClinicalSubPhase::ScoringRisk;
        let result = self.scorer.score(&diary.clinical);

        info!(
            patient_id = %diary.patient_id,
            level = result.level.as_str(),
            method = %result.method,
            "Risk scored"
        );

        diary.clinical.risk_level = Some(result.level);
        diary.clinical.risk_method = Some(result.method.clone());
        diary.clinical.risk_reasoning = Some(result.reasoning.clone());
        diary.escalate_risk(result.level);
        diary.clinical.sub_phase = ClinicalSubPhase::Complete;
        diary.header.current_phase = Phase::Booking;

        let channel = diary.intake.preferred_channel;
        let complete = EventEnvelope::caused_by(
            event,
            EventPayload::ClinicalComplete {
                risk_level: result.level,
                method: result.method,
                reasoning: result.reasoning,
                condition_context: diary.clinical.condition_context.clone(),
            },
            SenderRole::System,
        );

        AgentResult::diary_only(diary)
            .with_response(AgentResponse::to(
                &event.patient_id,
                channel,
                "Thank you, that is everything the clinical team needs for now. \
                 We will offer you an appointment next.",
            ))
            .with_event(complete)
    }

    /// Handle an uploaded document, deduplicating re-uploads by content hash.
    async fn handle_document(
        &self,
        event: &EventEnvelope,
        document: &ClinicalDocument,
        mut diary: PatientDiary,
    ) -> AgentResult {
        let channel = diary.intake.preferred_channel;

        if diary
            .clinical
            .documents
            .iter()
            .any(|d| d.content_hash == document.content_hash)
        {
            return AgentResult::diary_only(diary).with_response(AgentResponse::to(
                &event.patient_id,
                channel,
                "We already have that document on file, thank you.",
            ));
        }

        let has_values = document.has_lab_values();
        diary.clinical.documents.push(document.clone());

        let ack = if has_values {
            "Thank you, we have received your results and added them to your record."
        } else {
            "Thank you, we have received your document."
        };

        let mut result = self.step(event, diary).await;
        result.responses.insert(
            0,
            AgentResponse::to(&event.patient_id, channel, ack),
        );
        result
    }

    /// Record an outbound GP query and produce the message to the practice.
    fn handle_gp_query(&self, question: &str, mut diary: PatientDiary) -> AgentResult {
        diary.gp_channel.raise(question);
        AgentResult::diary_only(diary).with_response(AgentResponse::to(
            "gp",
            Channel::Email,
            question,
        ))
    }

    /// Fold a GP reply into the record as a document.
    async fn handle_gp_response(
        &self,
        event: &EventEnvelope,
        message: &str,
        lab_values: &std::collections::HashMap<String, String>,
        mut diary: PatientDiary,
    ) -> AgentResult {
        diary.gp_channel.respond_oldest();

        let document = ClinicalDocument::new(DocumentType::GpRecord, "gp", message.as_bytes())
            .with_values(lab_values.clone());
        if !diary
            .clinical
            .documents
            .iter()
            .any(|d| d.content_hash == document.content_hash)
        {
            diary.clinical.documents.push(document);
        }

        self.step(event, diary).await
    }

    /// Reassess after a deterioration alert from monitoring.
    fn handle_deterioration(
        &self,
        event: &EventEnvelope,
        severity: DeteriorationSeverity,
        symptoms: &[String],
        reported_values: &std::collections::HashMap<String, String>,
        bring_forward: bool,
        mut diary: PatientDiary,
    ) -> AgentResult {
        let channel = diary.intake.preferred_channel;

        for symptom in symptoms {
            if !diary.clinical.red_flags.contains(symptom) {
                diary.clinical.red_flags.push(symptom.clone());
            }
        }
        if !reported_values.is_empty() {
            let document = ClinicalDocument::new(
                DocumentType::Other,
                "monitoring",
                format!("{reported_values:?}").as_bytes(),
            )
            .with_values(reported_values.clone());
            diary.clinical.documents.push(document);
        }

        let result = self.scorer.score(&diary.clinical);
        diary.clinical.risk_level = Some(result.level);
        diary.clinical.risk_method = Some(result.method.clone());
        diary.clinical.risk_reasoning = Some(result.reasoning.clone());
        diary.escalate_risk(result.level);

        if severity == DeteriorationSeverity::Emergency {
            diary.escalate_risk(RiskLevel::Critical);
            warn!(patient_id = %diary.patient_id, "Emergency deterioration, advising A&E");
            return AgentResult::diary_only(diary).with_response(AgentResponse::to(
                &event.patient_id,
                channel,
                "Your symptoms need urgent attention. Please go to A&E now or call 999. \
                 The clinic has been notified.",
            ));
        }

        if bring_forward {
            info!(
                patient_id = %diary.patient_id,
                severity = severity.as_str(),
                "Deterioration warrants an earlier appointment"
            );
            if let Some(slot) = diary.booking.selected_slot.take() {
                diary.booking.rescheduled_from.push(slot);
            }
            diary.booking.confirmed = false;
            diary.booking.appointment_id = None;
            diary.booking.offered_slots.clear();
            diary.header.current_phase = Phase::Booking;

            let complete = EventEnvelope::caused_by(
                event,
                EventPayload::ClinicalComplete {
                    risk_level: diary.header.risk_level,
                    method: diary
                        .clinical
                        .risk_method
                        .clone()
                        .unwrap_or_else(|| "deterioration".to_string()),
                    reasoning: format!(
                        "{} deterioration reported: {}",
                        severity.as_str(),
                        symptoms.join(", ")
                    ),
                    condition_context: diary.clinical.condition_context.clone(),
                },
                SenderRole::System,
            );

            return AgentResult::diary_only(diary)
                .with_response(AgentResponse::to(
                    &event.patient_id,
                    channel,
                    "Based on what you have told us we would like to see you sooner. \
                     We will send you new appointment options shortly.",
                ))
                .with_event(complete);
        }

        AgentResult::diary_only(diary).with_response(AgentResponse::to(
            &event.patient_id,
            channel,
            "Thank you for letting us know. Please keep an eye on your symptoms and \
             tell us straight away if anything gets worse.",
        ))
    }
}

/// Phrases meaning the patient has no documents to send.
const DOCUMENT_DECLINE_PHRASES: &[&str] = &[
    "no documents",
    "no results",
    "no recent",
    "don't have",
    "dont have",
    "have none",
    "nothing to upload",
    "nothing to send",
];

fn declines_documents(text: &str) -> bool {
    let lowered = text.to_lowercase();
    DOCUMENT_DECLINE_PHRASES.iter().any(|p| lowered.contains(p))
}

/// Assemble whatever referral text is available for analysis.
fn referral_text(diary: &PatientDiary) -> Option<String> {
    let referral_values: Vec<String> = diary
        .clinical
        .documents
        .iter()
        .filter(|d| d.doc_type == DocumentType::Referral)
        .flat_map(|d| d.extracted_values.iter())
        .map(|(k, v)| format!("{k}: {v}"))
        .collect();

    let mut parts = Vec::new();
    if let Some(complaint) = &diary.clinical.chief_complaint {
        parts.push(complaint.clone());
    }
    parts.extend(referral_values);

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

#[async_trait]
impl Agent for ClinicalAgent {
    fn name(&self) -> &'static str {
        "clinical"
    }

    async fn process(&self, event: &EventEnvelope, diary: PatientDiary) -> Result<AgentResult> {
        match &event.payload {
            EventPayload::IntakeComplete => Ok(self.start_interview(event, diary).await),
            EventPayload::UserMessage { text, channel } => {
                Ok(self.handle_answer(event, text, *channel, diary).await)
            }
            EventPayload::DocumentUploaded { document } => {
                Ok(self.handle_document(event, document, diary).await)
            }
            EventPayload::GpQuery { question } => Ok(self.handle_gp_query(question, diary)),
            EventPayload::GpResponse {
                message,
                lab_values,
            } => Ok(self.handle_gp_response(event, message, lab_values, diary).await),
            EventPayload::DeteriorationAlert {
                severity,
                symptoms,
                reported_values,
                bring_forward,
            } => Ok(self.handle_deterioration(
                event,
                *severity,
                symptoms,
                reported_values,
                *bring_forward,
                diary,
            )),
            _ => Err(AgentError::UnexpectedEvent {
                agent: self.name(),
                event_type: event.event_type(),
            }),
        }
    }
}
