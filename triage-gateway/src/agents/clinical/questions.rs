//! Referral analysis and interview question planning.
//!
//! Both have an LLM path and a deterministic fallback. The LLM drafts
//! condition-specific questions; when it is unavailable or returns
//! something unparseable, hand-written per-condition templates are used
//! instead. The interview never stalls on an LLM outage.

use serde::Deserialize;
use tracing::{debug, warn};

use triage_diary::diary::{GeneratedQuestion, ReferralAnalysis};
use triage_llm::{strip_json_fences, GenerateRequest, LlmClient, LlmError};

/// Phrases that mark a referral as urgent.
const URGENT_PHRASES: &[&str] = &[
    "urgent",
    "2-week wait",
    "two-week wait",
    "2ww",
    "asap",
    "rapid access",
    "fast track",
];

/// Condition keywords, checked in order of specificity.
const CONDITION_KEYWORDS: &[(&str, &str)] = &[
    ("cirrhosis", "cirrhosis"),
    ("decompensated", "cirrhosis"),
    ("mash", "mash"),
    ("nash", "mash"),
    ("nafld", "mash"),
    ("fatty liver", "mash"),
    ("steatosis", "mash"),
    ("hepatitis", "hepatitis"),
    ("hep b", "hepatitis"),
    ("hep c", "hepatitis"),
];

/// Detect a condition context from referral or complaint text.
pub fn detect_condition(text: &str) -> Option<String> {
    let lowered = text.to_lowercase();
    CONDITION_KEYWORDS
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map(|(_, condition)| condition.to_string())
}

/// Deterministic referral analysis used when no LLM is available.
pub fn analyze_referral_fallback(text: &str) -> ReferralAnalysis {
    let lowered = text.to_lowercase();
    let summary: String = text.chars().take(240).collect();
    ReferralAnalysis {
        summary,
        condition_context: detect_condition(text),
        urgent_language: URGENT_PHRASES.iter().any(|p| lowered.contains(p)),
    }
}

/// Analyze a referral letter, preferring the LLM.
pub async fn analyze_referral(llm: Option<&LlmClient>, text: &str) -> ReferralAnalysis {
    let Some(client) = llm else {
        return analyze_referral_fallback(text);
    };

    let request = GenerateRequest::new(format!(
        "Summarize this hepatology referral letter. Reply with JSON: \
         {{\"summary\": \"...\", \"condition\": \"cirrhosis|mash|hepatitis|null\", \
         \"urgent\": true|false}}\n\nReferral:\n{text}"
    ))
    .with_system("You are a clinical triage assistant. Reply with JSON only.")
    .with_json_output()
    .with_temperature(0.0);

    match client.generate(request).await {
        Ok(response) => match parse_referral_json(&response.content) {
            Some(analysis) => analysis,
            None => {
                warn!("Unparseable referral analysis from LLM, using fallback");
                analyze_referral_fallback(text)
            }
        },
        Err(err) => {
            warn!(error = %err, "Referral analysis LLM call failed, using fallback");
            analyze_referral_fallback(text)
        }
    }
}

#[derive(Deserialize)]
struct ReferralJson {
    summary: String,
    condition: Option<String>,
    urgent: bool,
}

fn parse_referral_json(content: &str) -> Option<ReferralAnalysis> {
    let parsed: ReferralJson = serde_json::from_str(strip_json_fences(content)).ok()?;
    let condition = parsed
        .condition
        .filter(|c| !c.is_empty() && c != "null");
    Some(ReferralAnalysis {
        summary: parsed.summary,
        condition_context: condition,
        urgent_language: parsed.urgent,
    })
}

/// Ranked question templates per condition context.
pub fn template_questions(condition: Option<&str>) -> Vec<GeneratedQuestion> {
    let raw: &[(&str, &str)] = match condition {
        Some("cirrhosis") => &[
            ("Have you noticed any yellowing of your skin or eyes?", "jaundice indicates decompensation"),
            ("Have you had any swelling in your abdomen or legs?", "ascites and oedema indicate fluid retention"),
            ("Have you vomited blood or passed black stools?", "variceal bleeding is an emergency"),
            ("Have you felt unusually confused or drowsy?", "encephalopathy indicates decompensation"),
            ("How much alcohol do you drink in a typical week?", "ongoing alcohol use drives progression"),
        ],
        Some("mash") => &[
            ("Have you had any recent weight changes?", "weight trajectory guides management"),
            ("Do you have diabetes or raised blood sugar?", "metabolic comorbidity raises risk"),
            ("Have you noticed any yellowing of your skin or eyes?", "jaundice suggests advanced disease"),
            ("Do you have any pain or discomfort under your right ribs?", "localizes hepatic pain"),
            ("How much alcohol do you drink in a typical week?", "excludes alcohol-related disease"),
        ],
        Some("hepatitis") => &[
            ("When were you first told you had hepatitis?", "duration affects fibrosis risk"),
            ("Have you ever been treated for it, and did you finish the course?", "treatment history guides next steps"),
            ("Have you noticed any yellowing of your skin or eyes?", "jaundice suggests active disease"),
            ("Have you felt unusually tired or feverish recently?", "systemic symptoms suggest a flare"),
            ("Do any close contacts or family members have liver problems?", "transmission and screening"),
        ],
        _ => &[
            ("What symptoms made you seek help, and how long have you had them?", "establishes the chief complaint"),
            ("Do you have any other medical conditions we should know about?", "comorbidities affect risk"),
            ("What medications do you take regularly, including over-the-counter?", "drug causes and interactions"),
            ("Do you have any allergies to medications?", "safety before prescribing"),
            ("How much alcohol do you drink in a typical week?", "alcohol is the commonest liver insult"),
        ],
    };

    raw.iter()
        .enumerate()
        .map(|(i, (text, rationale))| GeneratedQuestion {
            text: text.to_string(),
            rank: (i + 1) as u8,
            rationale: rationale.to_string(),
        })
        .collect()
}

/// Generate a ranked question plan, preferring the LLM.
pub async fn plan_questions(
    llm: Option<&LlmClient>,
    condition: Option<&str>,
    referral_summary: Option<&str>,
) -> Vec<GeneratedQuestion> {
    let Some(client) = llm else {
        return template_questions(condition);
    };

    let context = referral_summary.unwrap_or("no referral letter available");
    let request = GenerateRequest::new(format!(
        "Plan 5 interview questions for a hepatology triage patient. \
         Condition context: {}. Referral summary: {}. Reply with a JSON array: \
         [{{\"text\": \"...\", \"rank\": 1, \"rationale\": \"...\"}}]",
        condition.unwrap_or("unknown"),
        context,
    ))
    .with_system("You are a clinical triage assistant. Reply with JSON only.")
    .with_json_output()
    .with_temperature(0.2);

    match client.generate(request).await {
        Ok(response) => match parse_questions_json(&response.content) {
            Some(questions) if !questions.is_empty() => {
                debug!(count = questions.len(), "LLM question plan accepted");
                questions
            }
            _ => {
                warn!("Unparseable question plan from LLM, using templates");
                template_questions(condition)
            }
        },
        Err(err) => {
            if !matches!(err, LlmError::Unavailable(_)) {
                warn!(error = %err, "Question planning LLM call failed, using templates");
            }
            template_questions(condition)
        }
    }
}

#[derive(Deserialize)]
struct QuestionJson {
    text: String,
    rank: u8,
    #[serde(default)]
    rationale: String,
}

fn parse_questions_json(content: &str) -> Option<Vec<GeneratedQuestion>> {
    let parsed: Vec<QuestionJson> = serde_json::from_str(strip_json_fences(content)).ok()?;
    let mut questions: Vec<GeneratedQuestion> = parsed
        .into_iter()
        .map(|q| GeneratedQuestion {
            text: q.text,
            rank: q.rank,
            rationale: q.rationale,
        })
        .collect();
    questions.sort_by_key(|q| q.rank);
    Some(questions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use triage_llm::{LlmBackend, MockBackend};

    #[test]
    fn test_condition_detection() {
        assert_eq!(detect_condition("known alcoholic cirrhosis").as_deref(), Some("cirrhosis"));
        assert_eq!(detect_condition("NAFLD on ultrasound").as_deref(), Some("mash"));
        assert_eq!(detect_condition("chronic hepatitis B carrier").as_deref(), Some("hepatitis"));
        assert_eq!(detect_condition("abdominal pain, cause unclear"), None);
    }

    #[test]
    fn test_fallback_analysis_flags_urgency() {
        let analysis = analyze_referral_fallback("URGENT 2-week wait referral, suspected cirrhosis");
        assert!(analysis.urgent_language);
        assert_eq!(analysis.condition_context.as_deref(), Some("cirrhosis"));
    }

    #[test]
    fn test_templates_are_ranked() {
        let questions = template_questions(Some("cirrhosis"));
        assert_eq!(questions.len(), 5);
        assert_eq!(questions[0].rank, 1);
        assert!(questions[0].text.contains("yellowing"));
    }

    #[tokio::test]
    async fn test_llm_plan_parsed() {
        let backend = Arc::new(MockBackend::new("mock").with_response(
            r#"[{"text": "How long have you felt unwell?", "rank": 1, "rationale": "duration"}]"#,
        )) as Arc<dyn LlmBackend>;
        let client = LlmClient::new(vec![backend]);

        let questions = plan_questions(Some(&client), Some("cirrhosis"), None).await;
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].text, "How long have you felt unwell?");
    }

    #[tokio::test]
    async fn test_garbage_llm_output_falls_back() {
        let backend = Arc::new(MockBackend::new("mock").with_response("sorry, I can't do that"))
            as Arc<dyn LlmBackend>;
        let client = LlmClient::new(vec![backend]);

        let questions = plan_questions(Some(&client), Some("mash"), None).await;
        assert_eq!(questions.len(), 5); // templates
    }

    #[tokio::test]
    async fn test_unavailable_llm_falls_back() {
        let backend = Arc::new(MockBackend::new("mock").with_available(false)) as Arc<dyn LlmBackend>;
        let client = LlmClient::new(vec![backend]);

        let analysis = analyze_referral(Some(&client), "urgent referral for cirrhosis").await;
        assert_eq!(analysis.condition_context.as_deref(), Some("cirrhosis"));
    }
}
