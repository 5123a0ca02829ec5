//! The gateway: event intake, routing, persistence and the crash boundary.
//!
//! Every event passes through the same pipeline: deduplicate, load or
//! create the diary, route to the phase-owning agent, persist with
//! optimistic concurrency, dispatch responses, then process whatever the
//! agent emitted. Agent failures are contained per event: the patient gets
//! an apology, the diary is not saved, and the gateway keeps running.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use triage_diary::{
    DiaryError, DiaryStore, EventEnvelope, EventPayload, EventType, MemoryDiaryStore,
    PatientDiary, Phase, RiskScorer,
};
use triage_llm::{LlmBackend, LlmClient};

use crate::agent::{Agent, AgentResponse, AgentResult};
use crate::agents::{BookingAgent, ClinicalAgent, IntakeAgent, MonitoringAgent};
use crate::config::GatewayConfig;
use crate::dispatch::DispatchRegistry;
use crate::eventlog::{EventLog, EventLogEntry, ProcessingStatus};
use crate::registry::SlotRegistry;

/// Error types for gateway processing.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// An event other than the conversation openers arrived for a patient
    /// with no diary. This is a data-integrity signal, not a normal case.
    #[error("no diary for patient {patient_id} on event {event_type:?}")]
    DiaryNotFound {
        patient_id: String,
        event_type: EventType,
    },

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] DiaryError),
}

/// Bounded FIFO window of processed event IDs.
struct DedupWindow {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl DedupWindow {
    fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Record an event ID. Returns false if it was already present.
    fn insert(&mut self, event_id: &str) -> bool {
        if self.seen.contains(event_id) {
            return false;
        }
        self.seen.insert(event_id.to_string());
        self.order.push_back(event_id.to_string());
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
    }
}

/// The orchestration gateway.
pub struct Gateway {
    config: GatewayConfig,
    store: Arc<dyn DiaryStore>,
    dispatch: Arc<DispatchRegistry>,
    event_log: Arc<EventLog>,
    dedup: Mutex<DedupWindow>,
    intake: Arc<dyn Agent>,
    clinical: Arc<dyn Agent>,
    booking: Arc<dyn Agent>,
    monitoring: Arc<dyn Agent>,
}

impl Gateway {
    /// Start building a gateway.
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// Handle one inbound event and everything it causes.
    ///
    /// Follow-on events emitted by agents are processed synchronously in
    /// FIFO order before this returns, so per-patient causal order holds.
    pub async fn handle_event(&self, event: EventEnvelope) -> Result<(), GatewayError> {
        {
            let mut dedup = self.dedup.lock().await;
            if !dedup.insert(&event.event_id) {
                info!(
                    patient_id = %event.patient_id,
                    event_id = %event.event_id,
                    "Duplicate event skipped"
                );
                self.event_log.record(
                    &event.patient_id,
                    &event.event_id,
                    event.event_type(),
                    ProcessingStatus::Duplicate,
                    None,
                    None,
                );
                return Ok(());
            }
        }

        let mut queue = VecDeque::new();
        queue.push_back(event);
        let mut first = true;

        while let Some(next) = queue.pop_front() {
            match self.process_one(&next).await {
                Ok(emitted) => {
                    let mut dedup = self.dedup.lock().await;
                    for follow_on in emitted {
                        if dedup.insert(&follow_on.event_id) {
                            queue.push_back(follow_on);
                        }
                    }
                }
                Err(err) if first => return Err(err),
                Err(err) => {
                    // A follow-on event failing must not mask the result of
                    // the event the caller actually submitted.
                    error!(
                        patient_id = %next.patient_id,
                        event_id = %next.event_id,
                        error = %err,
                        "Follow-on event failed"
                    );
                }
            }
            first = false;
        }

        Ok(())
    }

    /// Process exactly one event; returns the events it emitted.
    async fn process_one(&self, event: &EventEnvelope) -> Result<Vec<EventEnvelope>, GatewayError> {
        debug!(
            patient_id = %event.patient_id,
            event_id = %event.event_id,
            event_type = ?event.event_type(),
            "Processing event"
        );

        let (diary, generation) = self.load_or_create(event).await?;
        let agent = self.route(event, &diary);

        let result = self.invoke(Arc::clone(&agent), event, diary.clone()).await;

        let result = match result {
            Ok(result) => result,
            Err(detail) => {
                error!(
                    patient_id = %event.patient_id,
                    event_id = %event.event_id,
                    agent = agent.name(),
                    error = %detail,
                    "Agent failed, diary not saved"
                );
                self.event_log.record(
                    &event.patient_id,
                    &event.event_id,
                    event.event_type(),
                    ProcessingStatus::AgentError,
                    Some(agent.name()),
                    Some(detail),
                );

                // The apology goes back where the failing event came from.
                let apology = AgentResponse::to(
                    &event.patient_id,
                    event.channel().unwrap_or(diary.intake.preferred_channel),
                    "Sorry, something went wrong on our side. Please send that again \
                     in a moment.",
                );
                self.dispatch.dispatch(&apology).await;
                return Ok(Vec::new());
            }
        };

        let saved = self
            .save_with_retry(&event.patient_id, result.diary, generation)
            .await;

        let status = if saved {
            ProcessingStatus::Ok
        } else {
            ProcessingStatus::SaveFailed
        };
        self.event_log.record(
            &event.patient_id,
            &event.event_id,
            event.event_type(),
            status,
            Some(agent.name()),
            None,
        );

        // Responses go out even when the save failed; the patient should
        // not be left hanging on a storage fault.
        self.dispatch.dispatch_all(&result.responses).await;

        Ok(result.emitted)
    }

    /// Load the diary, creating one only for conversation-opening events.
    async fn load_or_create(
        &self,
        event: &EventEnvelope,
    ) -> Result<(PatientDiary, u64), GatewayError> {
        match self.store.load(&event.patient_id).await {
            Ok(pair) => Ok(pair),
            Err(DiaryError::NotFound(_)) => {
                let opener = matches!(
                    event.payload,
                    EventPayload::UserMessage { .. } | EventPayload::IntakeDataProvided { .. }
                );
                if !opener {
                    error!(
                        patient_id = %event.patient_id,
                        event_type = ?event.event_type(),
                        "Event for unknown patient, refusing to create diary"
                    );
                    self.event_log.record(
                        &event.patient_id,
                        &event.event_id,
                        event.event_type(),
                        ProcessingStatus::AgentError,
                        None,
                        Some("no diary for patient".to_string()),
                    );
                    return Err(GatewayError::DiaryNotFound {
                        patient_id: event.patient_id.clone(),
                        event_type: event.event_type(),
                    });
                }

                info!(patient_id = %event.patient_id, "Creating diary for new patient");
                let diary = self.store.create(&event.patient_id).await?;
                Ok((diary, 0))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Pick the agent for an event.
    ///
    /// System events have fixed owners; free-form patient messages go to
    /// whichever agent owns the diary's current phase.
    fn route(&self, event: &EventEnvelope, diary: &PatientDiary) -> Arc<dyn Agent> {
        match event.event_type() {
            EventType::NeedsIntakeData | EventType::IntakeDataProvided => Arc::clone(&self.intake),
            EventType::IntakeComplete
            | EventType::GpQuery
            | EventType::GpResponse
            | EventType::DocumentUploaded
            | EventType::DeteriorationAlert => Arc::clone(&self.clinical),
            EventType::ClinicalComplete | EventType::RescheduleRequest => {
                Arc::clone(&self.booking)
            }
            EventType::BookingComplete | EventType::Heartbeat => Arc::clone(&self.monitoring),
            EventType::UserMessage => match diary.header.current_phase {
                Phase::Intake => Arc::clone(&self.intake),
                Phase::Clinical => Arc::clone(&self.clinical),
                Phase::Booking => Arc::clone(&self.booking),
                Phase::Monitoring => Arc::clone(&self.monitoring),
            },
        }
    }

    /// Run the agent on its own task so a panic is contained.
    async fn invoke(
        &self,
        agent: Arc<dyn Agent>,
        event: &EventEnvelope,
        diary: PatientDiary,
    ) -> Result<AgentResult, String> {
        let event = event.clone();
        let handle = tokio::spawn(async move { agent.process(&event, diary).await });

        match handle.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(err)) => Err(err.to_string()),
            Err(join_err) => Err(format!("agent panicked: {join_err}")),
        }
    }

    /// Save the diary, retrying on concurrency conflicts with a fresh
    /// generation. The agent's output wins over the conflicting write; the
    /// conflict is logged for audit.
    async fn save_with_retry(
        &self,
        patient_id: &str,
        diary: PatientDiary,
        mut generation: u64,
    ) -> bool {
        let mut attempts = 0;
        loop {
            match self
                .store
                .save(patient_id, diary.clone(), generation)
                .await
            {
                Ok(_) => return true,
                Err(DiaryError::ConcurrencyConflict { actual, .. }) => {
                    attempts += 1;
                    if attempts > self.config.save.max_retries {
                        error!(
                            patient_id = %patient_id,
                            attempts,
                            "Diary save abandoned after repeated conflicts"
                        );
                        return false;
                    }
                    warn!(
                        patient_id = %patient_id,
                        expected = generation,
                        actual,
                        "Concurrent diary write, retrying save"
                    );
                    generation = actual;
                    tokio::time::sleep(std::time::Duration::from_millis(
                        self.config.save.retry_delay_ms,
                    ))
                    .await;
                }
                Err(err) => {
                    error!(patient_id = %patient_id, error = %err, "Diary save failed");
                    return false;
                }
            }
        }
    }

    /// The current diary for a patient.
    pub async fn get_diary(&self, patient_id: &str) -> Result<PatientDiary, GatewayError> {
        let (diary, _) = self.store.load(patient_id).await?;
        Ok(diary)
    }

    /// Processing history for a patient.
    pub fn get_event_log(&self, patient_id: &str) -> Vec<EventLogEntry> {
        self.event_log.for_patient(patient_id)
    }
}

/// Builder for [`Gateway`].
pub struct GatewayBuilder {
    config: GatewayConfig,
    store: Option<Arc<dyn DiaryStore>>,
    dispatch: Option<Arc<DispatchRegistry>>,
    slot_registry: Option<Arc<SlotRegistry>>,
    llm_backends: Vec<Arc<dyn LlmBackend>>,
    intake: Option<Arc<dyn Agent>>,
    clinical: Option<Arc<dyn Agent>>,
    booking: Option<Arc<dyn Agent>>,
    monitoring: Option<Arc<dyn Agent>>,
}

impl GatewayBuilder {
    fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
            store: None,
            dispatch: None,
            slot_registry: None,
            llm_backends: Vec::new(),
            intake: None,
            clinical: None,
            booking: None,
            monitoring: None,
        }
    }

    /// Use a custom configuration.
    pub fn with_config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a specific diary store.
    pub fn with_store(mut self, store: Arc<dyn DiaryStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a specific dispatch registry.
    pub fn with_dispatch(mut self, dispatch: Arc<DispatchRegistry>) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Use a specific slot registry.
    pub fn with_slot_registry(mut self, registry: Arc<SlotRegistry>) -> Self {
        self.slot_registry = Some(registry);
        self
    }

    /// Attach LLM backends, tried in order, for the clinical agent. The
    /// client is built from [`crate::config::LlmConfig`].
    pub fn with_llm_backends(mut self, backends: Vec<Arc<dyn LlmBackend>>) -> Self {
        self.llm_backends = backends;
        self
    }

    /// Replace the agent owning a phase. Intended for tests.
    pub fn with_phase_agent(mut self, phase: Phase, agent: Arc<dyn Agent>) -> Self {
        match phase {
            Phase::Intake => self.intake = Some(agent),
            Phase::Clinical => self.clinical = Some(agent),
            Phase::Booking => self.booking = Some(agent),
            Phase::Monitoring => self.monitoring = Some(agent),
        }
        self
    }

    /// Build the gateway.
    pub fn build(self) -> Gateway {
        let config = self.config;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryDiaryStore::new()));
        let dispatch = self
            .dispatch
            .unwrap_or_else(|| Arc::new(DispatchRegistry::with_logging_defaults()));
        let slot_registry = self.slot_registry.unwrap_or_else(|| {
            Arc::new(SlotRegistry::new(std::time::Duration::from_secs(
                config.booking.hold_ttl_secs,
            )))
        });

        let llm = if self.llm_backends.is_empty() {
            None
        } else {
            Some(Arc::new(
                LlmClient::new(self.llm_backends)
                    .with_timeout(std::time::Duration::from_millis(config.llm.timeout_ms))
                    .with_max_tokens(config.llm.max_tokens),
            ))
        };

        let scorer = RiskScorer::with_heuristic(config.heuristic.clone());
        let clinical_agent = {
            let base = ClinicalAgent::new(config.clinical.clone(), scorer);
            match llm {
                Some(llm) => base.with_llm(llm),
                None => base,
            }
        };

        let intake = self.intake.unwrap_or_else(|| Arc::new(IntakeAgent::new()));
        let clinical = self.clinical.unwrap_or_else(|| Arc::new(clinical_agent));
        let booking = self.booking.unwrap_or_else(|| {
            Arc::new(BookingAgent::new(
                Arc::clone(&slot_registry),
                config.booking.clone(),
            ))
        });
        let monitoring = self
            .monitoring
            .unwrap_or_else(|| Arc::new(MonitoringAgent::new()));

        let dedup_capacity = config.dedup.capacity;
        Gateway {
            config,
            store,
            dispatch,
            event_log: Arc::new(EventLog::new()),
            dedup: Mutex::new(DedupWindow::new(dedup_capacity)),
            intake,
            clinical,
            booking,
            monitoring,
        }
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use triage_diary::{Channel, RiskLevel, SenderRole};
    use triage_llm::MockBackend;

    use crate::agent::AgentError;
    use crate::dispatch::LoggingDispatcher;

    fn user_message(patient: &str, text: &str) -> EventEnvelope {
        EventEnvelope::new(
            patient,
            EventPayload::UserMessage {
                text: text.to_string(),
                channel: Channel::WebSocket,
            },
            SenderRole::Patient,
        )
    }

    async fn complete_intake(gateway: &Gateway, patient: &str) {
        let mut fields = HashMap::new();
        for (k, v) in [
            ("full_name", "Jane Smith"),
            ("date_of_birth", "14/03/1962"),
            ("nhs_number", "9434765919"),
            ("phone", "07700900123"),
        ] {
            fields.insert(k.to_string(), v.to_string());
        }
        gateway
            .handle_event(EventEnvelope::new(
                patient,
                EventPayload::IntakeDataProvided { fields },
                SenderRole::Patient,
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_first_message_creates_diary() {
        let gateway = Gateway::builder().build();

        gateway
            .handle_event(user_message("patient-1", "hello"))
            .await
            .unwrap();

        let diary = gateway.get_diary("patient-1").await.unwrap();
        assert_eq!(diary.header.current_phase, Phase::Intake);
    }

    #[tokio::test]
    async fn test_duplicate_event_processed_once() {
        let gateway = Gateway::builder().build();

        let event = user_message("patient-1", "my name is Jane Smith");
        gateway.handle_event(event.clone()).await.unwrap();
        gateway.handle_event(event.clone()).await.unwrap();

        let log = gateway.get_event_log("patient-1");
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].status, ProcessingStatus::Ok);
        assert_eq!(log[1].status, ProcessingStatus::Duplicate);
    }

    #[tokio::test]
    async fn test_unknown_patient_system_event_rejected() {
        let gateway = Gateway::builder().build();

        let event = EventEnvelope::new(
            "ghost",
            EventPayload::Heartbeat { day: 3 },
            SenderRole::Monitoring,
        );
        let err = gateway.handle_event(event).await.unwrap_err();
        assert!(matches!(err, GatewayError::DiaryNotFound { .. }));
    }

    struct PanickingAgent;

    #[async_trait]
    impl Agent for PanickingAgent {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn process(
            &self,
            _event: &EventEnvelope,
            _diary: PatientDiary,
        ) -> crate::agent::Result<AgentResult> {
            panic!("agent blew up");
        }
    }

    #[tokio::test]
    async fn test_agent_panic_is_contained() {
        let dispatch = Arc::new(DispatchRegistry::new());
        let ws = Arc::new(LoggingDispatcher::new(Channel::WebSocket));
        dispatch.register(ws.clone());

        let gateway = Gateway::builder()
            .with_dispatch(Arc::clone(&dispatch))
            .with_phase_agent(Phase::Intake, Arc::new(PanickingAgent))
            .build();

        gateway
            .handle_event(user_message("patient-1", "hello"))
            .await
            .unwrap();

        // The patient got an apology and the gateway is still usable.
        let sent = ws.sent().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].message.contains("Sorry"));

        let log = gateway.get_event_log("patient-1");
        assert_eq!(log[0].status, ProcessingStatus::AgentError);

        // The diary was created but the panicking agent's work was not saved.
        let diary = gateway.get_diary("patient-1").await.unwrap();
        assert!(diary.intake.collected.is_empty());

        gateway
            .handle_event(user_message("patient-2", "hi"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_apology_follows_failing_event_channel() {
        let dispatch = Arc::new(DispatchRegistry::new());
        let ws = Arc::new(LoggingDispatcher::new(Channel::WebSocket));
        let sms = Arc::new(LoggingDispatcher::new(Channel::Sms));
        dispatch.register(ws.clone());
        dispatch.register(sms.clone());

        let gateway = Gateway::builder()
            .with_dispatch(Arc::clone(&dispatch))
            .with_phase_agent(Phase::Intake, Arc::new(PanickingAgent))
            .build();

        let event = EventEnvelope::new(
            "patient-1",
            EventPayload::UserMessage {
                text: "hello".to_string(),
                channel: Channel::Sms,
            },
            SenderRole::Patient,
        );
        gateway.handle_event(event).await.unwrap();

        // The diary never recorded a preference; the apology goes back on
        // the channel the failing event arrived on.
        let sent = sms.sent().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].message.contains("Sorry"));
        assert!(ws.sent().await.is_empty());
    }

    struct FailingAgent;

    #[async_trait]
    impl Agent for FailingAgent {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn process(
            &self,
            _event: &EventEnvelope,
            _diary: PatientDiary,
        ) -> crate::agent::Result<AgentResult> {
            Err(AgentError::Processing("backend exploded".to_string()))
        }
    }

    #[tokio::test]
    async fn test_agent_error_does_not_save_diary() {
        let store = Arc::new(MemoryDiaryStore::new());
        let gateway = Gateway::builder()
            .with_store(store.clone() as Arc<dyn DiaryStore>)
            .with_phase_agent(Phase::Intake, Arc::new(FailingAgent))
            .build();

        gateway
            .handle_event(user_message("patient-1", "my name is Jane Smith"))
            .await
            .unwrap();

        // Diary exists (created before the agent ran) at generation 0.
        let (_, generation) = store.load("patient-1").await.unwrap();
        assert_eq!(generation, 0);
    }

    /// Store that injects a single concurrency conflict on save.
    struct FlakyStore {
        inner: MemoryDiaryStore,
        fail_once: AtomicBool,
    }

    #[async_trait]
    impl DiaryStore for FlakyStore {
        async fn create(&self, patient_id: &str) -> triage_diary::store::Result<PatientDiary> {
            self.inner.create(patient_id).await
        }

        async fn load(&self, patient_id: &str) -> triage_diary::store::Result<(PatientDiary, u64)> {
            self.inner.load(patient_id).await
        }

        async fn save(
            &self,
            patient_id: &str,
            diary: PatientDiary,
            expected_generation: u64,
        ) -> triage_diary::store::Result<u64> {
            if self.fail_once.swap(false, Ordering::SeqCst) {
                return Err(DiaryError::ConcurrencyConflict {
                    patient_id: patient_id.to_string(),
                    expected: expected_generation,
                    actual: expected_generation,
                });
            }
            self.inner.save(patient_id, diary, expected_generation).await
        }
    }

    #[tokio::test]
    async fn test_save_conflict_retried() {
        let store = Arc::new(FlakyStore {
            inner: MemoryDiaryStore::new(),
            fail_once: AtomicBool::new(true),
        });
        let gateway = Gateway::builder()
            .with_store(store.clone() as Arc<dyn DiaryStore>)
            .build();

        gateway
            .handle_event(user_message("patient-1", "my name is Jane Smith"))
            .await
            .unwrap();

        let log = gateway.get_event_log("patient-1");
        assert_eq!(log[0].status, ProcessingStatus::Ok);

        let diary = gateway.get_diary("patient-1").await.unwrap();
        assert!(diary.intake.collected.contains_key("full_name"));
    }

    #[tokio::test]
    async fn test_llm_config_shapes_clinical_requests() {
        let backend = Arc::new(MockBackend::new("mock"));
        let mut config = GatewayConfig::default();
        config.llm.max_tokens = 64;

        let gateway = Gateway::builder()
            .with_config(config)
            .with_llm_backends(vec![backend.clone() as Arc<dyn LlmBackend>])
            .build();

        complete_intake(&gateway, "patient-1").await;

        // Question planning went through the LLM with the configured token
        // cap; the unparseable mock reply fell back to the templates.
        let request = backend.last_request().expect("LLM was called");
        assert_eq!(request.max_tokens, Some(64));
        let diary = gateway.get_diary("patient-1").await.unwrap();
        assert_eq!(diary.clinical.questions_asked.len(), 1);
    }

    #[tokio::test]
    async fn test_full_journey_intake_to_monitoring() {
        let dispatch = Arc::new(DispatchRegistry::with_logging_defaults());
        let gateway = Gateway::builder()
            .with_dispatch(Arc::clone(&dispatch))
            .build();
        let patient = "patient-journey";

        // Intake via a structured submission.
        complete_intake(&gateway, patient).await;

        let diary = gateway.get_diary(patient).await.unwrap();
        // IntakeComplete was processed synchronously: the interview started.
        assert_eq!(diary.header.current_phase, Phase::Clinical);
        assert_eq!(diary.clinical.questions_asked.len(), 1);

        // Answer every interview question.
        let answers = [
            "I've been exhausted and my stomach aches",
            "I have diabetes",
            "I take metformin",
            "no known allergies",
            "I don't drink alcohol",
            "no other symptoms",
            "nothing else to add",
            "that's everything",
        ];
        for answer in answers {
            gateway
                .handle_event(user_message(patient, answer))
                .await
                .unwrap();
            let diary = gateway.get_diary(patient).await.unwrap();
            if diary.clinical.document_prompted {
                break;
            }
        }

        let diary = gateway.get_diary(patient).await.unwrap();
        assert!(diary.clinical.document_prompted);
        // The GP was asked for labs along the way.
        assert!(!diary.gp_channel.queries.is_empty());

        // The GP replies with alarming labs; scoring and booking follow.
        let mut lab_values = HashMap::new();
        lab_values.insert("bilirubin".to_string(), "320".to_string());
        gateway
            .handle_event(EventEnvelope::new(
                patient,
                EventPayload::GpResponse {
                    message: "LFT panel attached".to_string(),
                    lab_values,
                },
                SenderRole::Gp,
            ))
            .await
            .unwrap();

        let diary = gateway.get_diary(patient).await.unwrap();
        assert_eq!(diary.header.risk_level, RiskLevel::Critical);
        assert_eq!(diary.header.current_phase, Phase::Booking);
        assert_eq!(diary.booking.offered_slots.len(), 3);

        // Pick the first slot.
        gateway
            .handle_event(user_message(patient, "1"))
            .await
            .unwrap();

        let diary = gateway.get_diary(patient).await.unwrap();
        assert!(diary.booking.confirmed);
        assert!(diary.booking.appointment_id.is_some());
        assert_eq!(diary.header.current_phase, Phase::Monitoring);
        assert!(diary.monitoring.monitoring_active);
        assert_eq!(
            diary.monitoring.baseline.get("bilirubin").map(String::as_str),
            Some("320")
        );

        // Monitoring check-in works end to end.
        gateway
            .handle_event(user_message(patient, "feeling okay so far"))
            .await
            .unwrap();
        let diary = gateway.get_diary(patient).await.unwrap();
        assert!(diary.monitoring.assessment.is_none());
    }
}
