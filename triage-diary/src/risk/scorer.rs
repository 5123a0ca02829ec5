//! The three-tier risk scorer.
//!
//! Safety-critical and pure: the same clinical section always produces the
//! same result. Tiers run in order - hard numeric rules, keyword rules,
//! heuristic fallback - and the maximum level across all fired rules wins.
//! The heuristic tier never runs once a deterministic tier has fired, so it
//! can never downgrade a deterministic result.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::diary::{ClinicalSection, RiskLevel};
use crate::risk::labs::parse_lab_value;
use crate::risk::rules::{is_abnormal, HARD_RULES, KEYWORD_RULES};

/// Result of a risk evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskResult {
    /// Final risk level (maximum across all fired rules)
    pub level: RiskLevel,
    /// Which rule/tier decided the result, for audit traceability
    pub method: String,
    /// Human-readable reasoning
    pub reasoning: String,
    /// Descriptions of every rule that fired
    pub triggered: Vec<String>,
    /// 1.0 for deterministic tiers, lower for the heuristic fallback
    pub confidence: f32,
}

/// Thresholds for the heuristic concern score.
///
/// Hand-tuned policy constants carried over from the source system, pending
/// clinical sign-off; kept configurable rather than re-derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicThresholds {
    /// Concern score at or above which the heuristic reports HIGH
    pub high: f32,
    /// Concern score at or above which the heuristic reports MEDIUM
    pub medium: f32,
    /// Confidence attached to heuristic results
    pub confidence: f32,
}

impl Default for HeuristicThresholds {
    fn default() -> Self {
        Self {
            high: 5.0,
            medium: 2.0,
            confidence: 0.6,
        }
    }
}

/// Referral/complaint phrases that count as urgency language in the
/// heuristic tier.
const URGENCY_PHRASES: &[&str] = &["urgent", "asap", "as soon as possible", "2-week", "two-week", "two week wait"];

/// Deterministic-first risk scorer.
#[derive(Debug, Clone, Default)]
pub struct RiskScorer {
    heuristic: HeuristicThresholds,
}

impl RiskScorer {
    /// Create a scorer with default heuristic thresholds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom heuristic thresholds.
    pub fn with_heuristic(heuristic: HeuristicThresholds) -> Self {
        Self { heuristic }
    }

    /// Score a clinical section.
    pub fn score(&self, clinical: &ClinicalSection) -> RiskResult {
        let labs = clinical.merged_lab_values();

        // Tier 1: hard numeric rules.
        let mut level = RiskLevel::None;
        let mut triggered = Vec::new();
        let mut deciding: Option<String> = None;

        for rule in HARD_RULES {
            let Some(raw) = labs.get(rule.lab) else {
                continue;
            };
            let Some(value) = parse_lab_value(raw) else {
                continue;
            };
            if rule.op.matches(value, rule.threshold) {
                debug!(lab = rule.lab, value, level = rule.level.as_str(), "Hard rule fired");
                triggered.push(format!("{} (value {})", rule.description, raw.trim()));
                if rule.level > level {
                    level = rule.level;
                    deciding = Some(format!("lab:{}", rule.lab));
                }
            }
        }

        let hard_fired = !triggered.is_empty();

        // Tier 2: keyword rules - always checked, a HIGH keyword can
        // elevate a MEDIUM lab-based score.
        let haystack = keyword_haystack(clinical);
        for rule in KEYWORD_RULES {
            if haystack.contains(rule.phrase) {
                debug!(phrase = rule.phrase, level = rule.level.as_str(), "Keyword rule fired");
                triggered.push(format!("{} (\"{}\")", rule.description, rule.phrase));
                if rule.level > level {
                    level = rule.level;
                    deciding = Some(format!("keyword:{}", rule.phrase));
                }
            }
        }

        if !triggered.is_empty() {
            let deciding = deciding.unwrap_or_else(|| "rules".to_string());
            let tier = if hard_fired { "lab and keyword rules" } else { "keyword rules" };
            return RiskResult {
                level,
                method: format!("deterministic:{deciding}"),
                reasoning: format!(
                    "{} rule(s) fired via {}; highest level {} decided by {}",
                    triggered.len(),
                    tier,
                    level.as_str(),
                    deciding,
                ),
                triggered,
                confidence: 1.0,
            };
        }

        // Tier 3: heuristic fallback, only when nothing deterministic fired.
        self.heuristic_score(clinical, &labs)
    }

    fn heuristic_score(
        &self,
        clinical: &ClinicalSection,
        labs: &std::collections::HashMap<String, String>,
    ) -> RiskResult {
        let mut score = 0.0f32;
        let mut components = Vec::new();

        let red_flags = clinical.red_flags.len();
        if red_flags > 0 {
            score += red_flags as f32;
            components.push(format!("{red_flags} red flag(s)"));
        }

        match clinical.pain_level {
            Some(p) if p >= 7 => {
                score += 2.0;
                components.push(format!("severe pain {p}/10"));
            }
            Some(p) if p >= 4 => {
                score += 1.0;
                components.push(format!("moderate pain {p}/10"));
            }
            _ => {}
        }

        let comorbidities = clinical.history.len().min(3);
        if comorbidities > 0 {
            score += comorbidities as f32;
            components.push(format!("{comorbidities} comorbidity factor(s)"));
        }

        let abnormal = labs
            .iter()
            .filter_map(|(k, v)| parse_lab_value(v).map(|value| (k, value)))
            .any(|(k, value)| is_abnormal(k, value));
        if abnormal {
            score += 1.0;
            components.push("abnormal lab value present".to_string());
        }

        let urgency_text = [
            clinical.chief_complaint.as_deref().unwrap_or(""),
            clinical
                .referral_analysis
                .as_ref()
                .map(|r| r.summary.as_str())
                .unwrap_or(""),
        ]
        .join(" ")
        .to_lowercase();
        let urgent = URGENCY_PHRASES.iter().any(|p| urgency_text.contains(p))
            || clinical
                .referral_analysis
                .as_ref()
                .is_some_and(|r| r.urgent_language);
        if urgent {
            score += 2.0;
            components.push("urgency language in referral".to_string());
        }

        let level = if score >= self.heuristic.high {
            RiskLevel::High
        } else if score >= self.heuristic.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        let reasoning = if components.is_empty() {
            "no deterministic rule fired and no concern factors present".to_string()
        } else {
            format!(
                "no deterministic rule fired; concern score {:.1} from {}",
                score,
                components.join(", ")
            )
        };

        RiskResult {
            level,
            method: "heuristic:concern_score".to_string(),
            reasoning,
            triggered: components,
            confidence: self.heuristic.confidence,
        }
    }
}

/// Build the lowercase text the keyword tier scans.
fn keyword_haystack(clinical: &ClinicalSection) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(cc) = &clinical.chief_complaint {
        parts.push(cc);
    }
    if let Some(ctx) = &clinical.condition_context {
        parts.push(ctx);
    }
    for h in &clinical.history {
        parts.push(h);
    }
    for rf in &clinical.red_flags {
        parts.push(rf);
    }
    parts.extend(clinical.answered_text());
    parts.join(" \n ").to_lowercase()
}
