//! Clinical fact extraction from free-text answers.
//!
//! The LLM path returns structured JSON; the regex/keyword fallback covers
//! the facts the risk scorer actually consumes. Extraction is additive
//! except for allergies, where a real allergy supersedes the
//! "no known allergies" placeholder.

use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::warn;

use triage_diary::diary::ClinicalSection;
use triage_llm::{strip_json_fences, GenerateRequest, LlmClient};

use crate::text::contains_symptom;

/// Placeholder recorded when the patient reports no allergies.
pub const NO_KNOWN_ALLERGIES: &str = "no known allergies";

/// Red-flag symptoms scanned for in every answer.
const RED_FLAG_PHRASES: &[&str] = &[
    "vomiting blood",
    "vomited blood",
    "black stools",
    "yellowing",
    "jaundice",
    "confusion",
    "drowsy",
    "swelling in my abdomen",
    "abdominal swelling",
    "weight loss",
];

/// Comorbidities recognized in answers.
const COMORBIDITY_KEYWORDS: &[&str] = &[
    "diabetes",
    "hypertension",
    "high blood pressure",
    "heart failure",
    "kidney disease",
    "copd",
    "obesity",
];

/// Common hepatology-relevant medications.
const MEDICATION_KEYWORDS: &[&str] = &[
    "warfarin",
    "apixaban",
    "rivaroxaban",
    "insulin",
    "metformin",
    "atorvastatin",
    "simvastatin",
    "spironolactone",
    "furosemide",
    "propranolol",
    "lactulose",
    "paracetamol",
    "ibuprofen",
];

/// Facts pulled out of one answer.
#[derive(Debug, Default, Clone)]
pub struct ExtractedFacts {
    pub pain_level: Option<u8>,
    pub pain_location: Option<String>,
    pub medications: Vec<String>,
    pub allergies: Vec<String>,
    pub no_known_allergies: bool,
    pub red_flags: Vec<String>,
    pub comorbidities: Vec<String>,
    pub lifestyle: Vec<String>,
}

impl ExtractedFacts {
    /// Fold these facts into the clinical section.
    pub fn apply(self, clinical: &mut ClinicalSection) {
        if let Some(level) = self.pain_level {
            clinical.pain_level = Some(level);
        }
        if let Some(location) = self.pain_location {
            clinical.pain_location = Some(location);
        }
        for med in self.medications {
            push_unique(&mut clinical.medications, med);
        }
        for flag in self.red_flags {
            push_unique(&mut clinical.red_flags, flag);
        }
        for condition in self.comorbidities {
            push_unique(&mut clinical.history, condition);
        }
        for factor in self.lifestyle {
            push_unique(&mut clinical.lifestyle, factor);
        }

        // A concrete allergy supersedes the placeholder; the placeholder
        // never overwrites a concrete allergy.
        if !self.allergies.is_empty() {
            clinical
                .allergies
                .retain(|a| a.to_lowercase() != NO_KNOWN_ALLERGIES);
            for allergy in self.allergies {
                push_unique(&mut clinical.allergies, allergy);
            }
        } else if self.no_known_allergies && clinical.allergies.is_empty() {
            clinical.allergies.push(NO_KNOWN_ALLERGIES.to_string());
        }
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.iter().any(|v| v.eq_ignore_ascii_case(&value)) {
        list.push(value);
    }
}

fn pain_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(\d{1,2})\s*(?:/|out of)\s*10\b").expect("pain regex")
    })
}

fn pain_location_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)pain (?:in|under|around) (?:my |the )?([a-z ]{3,30}?)(?:[.,]|$)")
            .expect("pain location regex")
    })
}

fn allergy_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)allergic to ([a-z][a-z -]{1,40}?)(?:[.,]|$| and )").expect("allergy regex")
    })
}

/// Deterministic extraction from one answer.
pub fn extract_facts_fallback(text: &str) -> ExtractedFacts {
    let lowered = text.to_lowercase();
    let mut facts = ExtractedFacts::default();

    if let Some(caps) = pain_re().captures(text) {
        if let Ok(level) = caps[1].parse::<u8>() {
            facts.pain_level = Some(level.min(10));
        }
    }
    if let Some(caps) = pain_location_re().captures(text) {
        facts.pain_location = Some(caps[1].trim().to_string());
    }

    for med in MEDICATION_KEYWORDS {
        if contains_symptom(&lowered, med) {
            facts.medications.push(med.to_string());
        }
    }

    for caps in allergy_re().captures_iter(text) {
        facts.allergies.push(caps[1].trim().to_lowercase());
    }
    if lowered.contains("no allergies") || lowered.contains("no known allergies") {
        facts.no_known_allergies = true;
    }

    for phrase in RED_FLAG_PHRASES {
        if contains_symptom(&lowered, phrase) {
            facts.red_flags.push(phrase.to_string());
        }
    }

    for condition in COMORBIDITY_KEYWORDS {
        if contains_symptom(&lowered, condition) {
            facts.comorbidities.push(condition.to_string());
        }
    }

    for (keyword, factor) in [
        ("alcohol", "alcohol"),
        ("drink", "alcohol"),
        ("smoke", "smoking"),
        ("smoking", "smoking"),
        ("cigarette", "smoking"),
    ] {
        if contains_symptom(&lowered, keyword) {
            push_unique(&mut facts.lifestyle, factor.to_string());
        }
    }

    facts
}

#[derive(Deserialize, Default)]
struct FactsJson {
    #[serde(default)]
    pain_level: Option<u8>,
    #[serde(default)]
    pain_location: Option<String>,
    #[serde(default)]
    medications: Vec<String>,
    #[serde(default)]
    allergies: Vec<String>,
    #[serde(default)]
    no_known_allergies: bool,
    #[serde(default)]
    red_flags: Vec<String>,
    #[serde(default)]
    comorbidities: Vec<String>,
    #[serde(default)]
    lifestyle: Vec<String>,
}

/// Extract facts from an answer, preferring the LLM.
pub async fn extract_facts(llm: Option<&LlmClient>, text: &str) -> ExtractedFacts {
    let Some(client) = llm else {
        return extract_facts_fallback(text);
    };

    let request = GenerateRequest::new(format!(
        "Extract clinical facts from this patient message. Reply with JSON: \
         {{\"pain_level\": 0-10 or null, \"pain_location\": \"...\" or null, \
         \"medications\": [], \"allergies\": [], \"no_known_allergies\": false, \
         \"red_flags\": [], \"comorbidities\": [], \"lifestyle\": []}}\n\n\
         Message: {text}"
    ))
    .with_system("You are a clinical triage assistant. Reply with JSON only.")
    .with_json_output()
    .with_temperature(0.0);

    match client.generate(request).await {
        Ok(response) => {
            match serde_json::from_str::<FactsJson>(strip_json_fences(&response.content)) {
                Ok(parsed) => ExtractedFacts {
                    pain_level: parsed.pain_level.map(|p| p.min(10)),
                    pain_location: parsed.pain_location,
                    medications: parsed.medications,
                    allergies: parsed.allergies.into_iter().map(|a| a.to_lowercase()).collect(),
                    no_known_allergies: parsed.no_known_allergies,
                    red_flags: parsed.red_flags,
                    comorbidities: parsed.comorbidities,
                    lifestyle: parsed.lifestyle,
                },
                Err(_) => {
                    warn!("Unparseable extraction from LLM, using fallback");
                    extract_facts_fallback(text)
                }
            }
        }
        Err(err) => {
            warn!(error = %err, "Extraction LLM call failed, using fallback");
            extract_facts_fallback(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pain_extraction() {
        let facts = extract_facts_fallback("the pain is about 7/10, pain under my right ribs.");
        assert_eq!(facts.pain_level, Some(7));
        assert_eq!(facts.pain_location.as_deref(), Some("right ribs"));
    }

    #[test]
    fn test_red_flags_respect_negation() {
        let facts = extract_facts_fallback("I have noticed yellowing of my eyes");
        assert_eq!(facts.red_flags, vec!["yellowing".to_string()]);

        let negated = extract_facts_fallback("no yellowing and I am not vomiting blood");
        assert!(negated.red_flags.is_empty());
    }

    #[test]
    fn test_allergy_supersession() {
        let mut clinical = ClinicalSection::default();

        extract_facts_fallback("I have no known allergies").apply(&mut clinical);
        assert_eq!(clinical.allergies, vec![NO_KNOWN_ALLERGIES.to_string()]);

        extract_facts_fallback("actually I am allergic to penicillin.").apply(&mut clinical);
        assert_eq!(clinical.allergies, vec!["penicillin".to_string()]);

        // The placeholder never returns once a concrete allergy is known.
        extract_facts_fallback("no known allergies").apply(&mut clinical);
        assert_eq!(clinical.allergies, vec!["penicillin".to_string()]);
    }

    #[test]
    fn test_medications_and_comorbidities() {
        let facts =
            extract_facts_fallback("I take warfarin and metformin, and I have diabetes.");
        assert!(facts.medications.contains(&"warfarin".to_string()));
        assert!(facts.medications.contains(&"metformin".to_string()));
        assert_eq!(facts.comorbidities, vec!["diabetes".to_string()]);
    }

    #[test]
    fn test_apply_is_additive_and_deduplicated() {
        let mut clinical = ClinicalSection::default();
        extract_facts_fallback("I take warfarin").apply(&mut clinical);
        extract_facts_fallback("yes, warfarin, and I drink most days").apply(&mut clinical);

        assert_eq!(clinical.medications, vec!["warfarin".to_string()]);
        assert_eq!(clinical.lifestyle, vec!["alcohol".to_string()]);
    }
}
