//! Patient diary, event model and risk scoring for the triage gateway.
//!
//! This is the domain foundation crate:
//!
//! - **Event model**: immutable [`event::EventEnvelope`]s with typed payloads
//! - **Patient diary**: the durable per-patient aggregate, one per patient,
//!   never deleted
//! - **Diary store**: optimistic-concurrency persistence contract plus an
//!   in-memory reference implementation
//! - **Risk scorer**: pure, deterministic-first three-tier evaluation

pub mod diary;
pub mod event;
pub mod risk;
pub mod store;

pub use diary::{
    ClinicalDocument, ClinicalSection, ClinicalSubPhase, DeteriorationSeverity, DocumentType,
    PatientDiary, Phase, QuestionRecord, RiskLevel, SlotOption,
};
pub use event::{Channel, EventEnvelope, EventPayload, EventType, SenderRole};
pub use risk::{HeuristicThresholds, RiskResult, RiskScorer};
pub use store::{DiaryError, DiaryStore, MemoryDiaryStore};
