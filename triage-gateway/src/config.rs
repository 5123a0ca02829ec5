//! Configuration for the triage gateway.

use serde::{Deserialize, Serialize};

use triage_diary::HeuristicThresholds;

/// Configuration for the gateway and its agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway instance ID
    pub gateway_id: String,
    /// Event deduplication settings
    pub dedup: DedupConfig,
    /// Diary save retry settings
    pub save: SaveRetryConfig,
    /// Clinical interview settings
    pub clinical: ClinicalConfig,
    /// Booking settings
    pub booking: BookingConfig,
    /// Heuristic risk thresholds
    pub heuristic: HeuristicThresholds,
    /// LLM call settings
    pub llm: LlmConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gateway_id: uuid::Uuid::new_v4().to_string(),
            dedup: DedupConfig::default(),
            save: SaveRetryConfig::default(),
            clinical: ClinicalConfig::default(),
            booking: BookingConfig::default(),
            heuristic: HeuristicThresholds::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Create a new config with a gateway ID.
    pub fn new(gateway_id: impl Into<String>) -> Self {
        Self {
            gateway_id: gateway_id.into(),
            ..Default::default()
        }
    }

    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Event deduplication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Maximum event IDs remembered before the oldest are evicted
    pub capacity: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

/// Diary save retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveRetryConfig {
    /// Retries after a concurrency conflict
    pub max_retries: usize,
    /// Delay between retries (ms)
    pub retry_delay_ms: u64,
}

impl Default for SaveRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 50,
        }
    }
}

/// Clinical interview configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalConfig {
    /// Hard cap on interview questions per patient
    pub max_questions: usize,
    /// Maximum backward loops to intake before proceeding anyway
    pub max_backward_loops: u8,
    /// Answered questions needed before scoring without lab documents
    pub min_answered_for_scoring: usize,
}

impl Default for ClinicalConfig {
    fn default() -> Self {
        Self {
            max_questions: 8,
            max_backward_loops: 3,
            min_answered_for_scoring: 2,
        }
    }
}

/// Booking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfig {
    /// How long a slot hold survives without confirmation (seconds)
    pub hold_ttl_secs: u64,
    /// Slots offered per round
    pub slots_per_offer: usize,
    /// Days ahead for HIGH and CRITICAL risk appointments
    pub urgent_window_days: u32,
    /// Days ahead for MEDIUM risk appointments
    pub soon_window_days: u32,
    /// Days ahead for LOW and unscored appointments
    pub routine_window_days: u32,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            hold_ttl_secs: 900, // 15 minutes
            slots_per_offer: 3,
            urgent_window_days: 2,
            soon_window_days: 7,
            routine_window_days: 14,
        }
    }
}

/// LLM call configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Per-call timeout (ms)
    pub timeout_ms: u64,
    /// Maximum tokens per generation
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            max_tokens: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.clinical.max_questions, 8);
        assert_eq!(config.booking.slots_per_offer, 3);
        assert_eq!(config.dedup.capacity, 10_000);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = GatewayConfig::new("test-gateway");
        let yaml = config.to_yaml().unwrap();
        let parsed = GatewayConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.gateway_id, "test-gateway");
        assert_eq!(parsed.booking.hold_ttl_secs, 900);
    }
}
