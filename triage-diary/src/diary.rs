//! The patient diary - durable per-patient state for the whole workflow.
//!
//! One diary exists per patient and is never deleted; it is the audit trail
//! of everything that happened. Concurrency is optimistic: the store pairs
//! every diary with a monotonically increasing generation and rejects stale
//! saves.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

use crate::risk::labs::normalize_lab_key;

/// Top-level workflow phase. Each phase is owned by one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Intake,
    Clinical,
    Booking,
    Monitoring,
}

/// Ordered risk level. `Ord` follows clinical severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    None = 0,
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl RiskLevel {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::None => "none",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl Default for RiskLevel {
    fn default() -> Self {
        Self::None
    }
}

/// Sub-phase of the adaptive clinical interview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClinicalSubPhase {
    NotStarted,
    AnalyzingReferral,
    AskingQuestions,
    CollectingDocuments,
    ScoringRisk,
    Complete,
}

impl Default for ClinicalSubPhase {
    fn default() -> Self {
        Self::NotStarted
    }
}

/// Who answers intake questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponderType {
    Patient,
    Helper,
}

impl Default for ResponderType {
    fn default() -> Self {
        Self::Patient
    }
}

/// Diary header: the routing-relevant summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiaryHeader {
    /// Phase currently owning this patient
    pub current_phase: Phase,
    /// Highest risk level assigned so far
    pub risk_level: RiskLevel,
}

impl Default for DiaryHeader {
    fn default() -> Self {
        Self {
            current_phase: Phase::Intake,
            risk_level: RiskLevel::None,
        }
    }
}

/// Demographics collected during intake.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntakeSection {
    /// Collected field map (field name -> value)
    pub collected: HashMap<String, String>,
    /// Whether the patient or a helper is answering
    pub responder_type: ResponderType,
    /// Contact phone number
    pub contact_phone: Option<String>,
    /// Contact email
    pub contact_email: Option<String>,
    /// Channel the patient first reached us on
    pub preferred_channel: crate::event::Channel,
    /// All required fields present
    pub intake_complete: bool,
}

/// One question asked during the clinical interview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRecord {
    /// Question text
    pub question: String,
    /// Answer, if one has been given
    pub answer: Option<String>,
    /// Who answered
    pub answered_by: Option<String>,
}

impl QuestionRecord {
    /// Create an unanswered record.
    pub fn asked(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: None,
            answered_by: None,
        }
    }
}

/// A planned interview question, ranked by importance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    /// Question text
    pub text: String,
    /// Rank within the plan (1 = most important)
    pub rank: u8,
    /// Why this question matters for this patient
    pub rationale: String,
}

/// Structured summary of the referral letter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralAnalysis {
    /// Short summary of the referral
    pub summary: String,
    /// Detected condition context, e.g. "cirrhosis"
    pub condition_context: Option<String>,
    /// Whether the referral carries urgency language
    pub urgent_language: bool,
}

/// Kind of clinical document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Referral,
    LabReport,
    GpRecord,
    Imaging,
    Other,
}

/// A clinical document and the lab values extracted from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalDocument {
    /// Document kind
    pub doc_type: DocumentType,
    /// Where the document came from
    pub source: String,
    /// Opaque reference to the stored file, if any
    pub file_ref: Option<String>,
    /// Whether value extraction has run
    pub processed: bool,
    /// Extracted lab values (lab name -> raw value string)
    pub extracted_values: HashMap<String, String>,
    /// Content hash (dedup key for re-uploads)
    pub content_hash: String,
}

impl ClinicalDocument {
    /// Create a document, hashing `content` for dedup.
    pub fn new(doc_type: DocumentType, source: impl Into<String>, content: &[u8]) -> Self {
        Self {
            doc_type,
            source: source.into(),
            file_ref: None,
            processed: false,
            extracted_values: HashMap::new(),
            content_hash: hash_content(content),
        }
    }

    /// Attach extracted values and mark the document processed.
    pub fn with_values(mut self, values: HashMap<String, String>) -> Self {
        self.processed = !values.is_empty();
        self.extracted_values = values;
        self
    }

    /// Whether this document carries usable lab values.
    pub fn has_lab_values(&self) -> bool {
        self.processed && !self.extracted_values.is_empty()
    }
}

/// SHA-256 content hash, hex encoded.
pub fn hash_content(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Clinical interview state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClinicalSection {
    /// Interview sub-phase
    pub sub_phase: ClinicalSubPhase,
    /// Chief complaint in the patient's words
    pub chief_complaint: Option<String>,
    /// Condition context driving question generation
    pub condition_context: Option<String>,
    /// Relevant history / comorbidities
    pub history: Vec<String>,
    /// Current medications
    pub medications: Vec<String>,
    /// Known allergies (or the "no known allergies" placeholder)
    pub allergies: Vec<String>,
    /// Red-flag symptoms reported so far
    pub red_flags: Vec<String>,
    /// Pain severity 0-10
    pub pain_level: Option<u8>,
    /// Where the pain is
    pub pain_location: Option<String>,
    /// Lifestyle factors (alcohol, smoking, ...)
    pub lifestyle: Vec<String>,
    /// Questions asked, in order
    pub questions_asked: Vec<QuestionRecord>,
    /// Ranked question plan
    pub generated_questions: Vec<GeneratedQuestion>,
    /// Documents received
    pub documents: Vec<ClinicalDocument>,
    /// Referral analysis, if a referral was available
    pub referral_analysis: Option<ReferralAnalysis>,
    /// Scored risk level
    pub risk_level: Option<RiskLevel>,
    /// Which rule/tier decided the score
    pub risk_method: Option<String>,
    /// Human-readable scoring rationale
    pub risk_reasoning: Option<String>,
    /// How many times the backward loop to intake has fired
    pub backward_loop_count: u8,
    /// Whether the one document-collection prompt has been sent
    pub document_prompted: bool,
}

impl ClinicalSection {
    /// Number of answered questions.
    pub fn answered_count(&self) -> usize {
        self.questions_asked
            .iter()
            .filter(|q| q.answer.is_some())
            .count()
    }

    /// Oldest question still waiting for an answer.
    pub fn oldest_unanswered_mut(&mut self) -> Option<&mut QuestionRecord> {
        self.questions_asked.iter_mut().find(|q| q.answer.is_none())
    }

    /// Whether any document with lab values has been processed.
    pub fn has_processed_lab_document(&self) -> bool {
        self.documents.iter().any(|d| d.has_lab_values())
    }

    /// Merge extracted values across all processed documents.
    ///
    /// Keys are normalized; later documents win on conflicts.
    pub fn merged_lab_values(&self) -> HashMap<String, String> {
        let mut merged = HashMap::new();
        for doc in self.documents.iter().filter(|d| d.processed) {
            for (key, value) in &doc.extracted_values {
                merged.insert(normalize_lab_key(key), value.clone());
            }
        }
        merged
    }

    /// All answered-question text, for keyword scanning.
    pub fn answered_text(&self) -> Vec<&str> {
        self.questions_asked
            .iter()
            .filter_map(|q| q.answer.as_deref())
            .collect()
    }
}

/// An appointment slot identity: date, time and provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotOption {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub provider: String,
}

impl SlotOption {
    pub fn new(date: NaiveDate, time: NaiveTime, provider: impl Into<String>) -> Self {
        Self {
            date,
            time,
            provider: provider.into(),
        }
    }
}

impl fmt::Display for SlotOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {} with {}",
            self.date.format("%A %d %B"),
            self.time.format("%H:%M"),
            self.provider
        )
    }
}

/// Booking state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingSection {
    /// Slots currently on offer (numbered in the message sent to the patient)
    pub offered_slots: Vec<SlotOption>,
    /// Slot the patient picked
    pub selected_slot: Option<SlotOption>,
    /// Whether the booking is confirmed
    pub confirmed: bool,
    /// Who confirmed the booking
    pub booked_by: Option<String>,
    /// Appointment identifier once confirmed
    pub appointment_id: Option<String>,
    /// Slots this patient was previously booked into
    pub rescheduled_from: Vec<SlotOption>,
    /// Patient-specific pre-appointment instructions
    pub pre_appointment_instructions: Vec<String>,
}

/// Severity of a deterioration assessment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DeteriorationSeverity {
    Mild = 0,
    Moderate = 1,
    Severe = 2,
    Emergency = 3,
}

impl DeteriorationSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeteriorationSeverity::Mild => "mild",
            DeteriorationSeverity::Moderate => "moderate",
            DeteriorationSeverity::Severe => "severe",
            DeteriorationSeverity::Emergency => "emergency",
        }
    }
}

/// In-flight interactive deterioration assessment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeteriorationAssessment {
    /// Symptoms that triggered the assessment
    pub symptoms: Vec<String>,
    /// Answers collected so far
    pub answers: Vec<String>,
}

/// Post-booking monitoring state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitoringSection {
    /// Whether monitoring is active
    pub monitoring_active: bool,
    /// Agreed communication plan
    pub communication_plan: Option<String>,
    /// Interactive assessment, if one is running
    pub assessment: Option<DeteriorationAssessment>,
    /// Lab baseline captured at booking time (normalized key -> value)
    pub baseline: HashMap<String, String>,
    /// Day index of the next scheduled check
    pub next_check_day: Option<u32>,
    /// Set after an emergency escalation; further messages only repeat
    /// the emergency instruction
    pub escalated: bool,
}

/// Status of a GP query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpQueryStatus {
    Pending,
    Responded,
}

/// One outstanding or answered query to the GP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpQueryRecord {
    /// Question sent to the GP
    pub question: String,
    /// Current status
    pub status: GpQueryStatus,
    /// When the query was raised
    pub asked_at: DateTime<Utc>,
}

/// GP communication state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GpChannelSection {
    /// Queries in the order they were raised
    pub queries: Vec<GpQueryRecord>,
}

impl GpChannelSection {
    /// Raise a new pending query.
    pub fn raise(&mut self, question: impl Into<String>) {
        self.queries.push(GpQueryRecord {
            question: question.into(),
            status: GpQueryStatus::Pending,
            asked_at: Utc::now(),
        });
    }

    /// Mark the oldest pending query responded. Returns whether one existed.
    pub fn respond_oldest(&mut self) -> bool {
        if let Some(query) = self
            .queries
            .iter_mut()
            .find(|q| q.status == GpQueryStatus::Pending)
        {
            query.status = GpQueryStatus::Responded;
            true
        } else {
            false
        }
    }
}

/// The aggregate root: one diary per patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientDiary {
    /// Patient identifier
    pub patient_id: String,
    /// When the diary was created
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
    /// Routing header
    pub header: DiaryHeader,
    /// Intake demographics
    pub intake: IntakeSection,
    /// Clinical interview state
    pub clinical: ClinicalSection,
    /// Booking state
    pub booking: BookingSection,
    /// Monitoring state
    pub monitoring: MonitoringSection,
    /// GP communication
    pub gp_channel: GpChannelSection,
}

impl PatientDiary {
    /// Create a fresh diary in the INTAKE phase.
    pub fn new(patient_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            patient_id: patient_id.into(),
            created_at: now,
            updated_at: now,
            header: DiaryHeader::default(),
            intake: IntakeSection::default(),
            clinical: ClinicalSection::default(),
            booking: BookingSection::default(),
            monitoring: MonitoringSection::default(),
            gp_channel: GpChannelSection::default(),
        }
    }

    /// Raise the header risk level, never lowering it.
    pub fn escalate_risk(&mut self, level: RiskLevel) {
        if level > self.header.risk_level {
            self.header.risk_level = level;
        }
    }

    /// Touch the updated-at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
