//! Rule tables for the risk scorer.
//!
//! The hard numeric table and the keyword table are the deterministic
//! tiers; the normal ranges feed the heuristic fallback's abnormal-lab
//! count only.

use crate::diary::RiskLevel;

/// Comparison operator for hard numeric rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Gt,
    Lt,
}

impl Cmp {
    pub fn matches(&self, value: f64, threshold: f64) -> bool {
        match self {
            Cmp::Gt => value > threshold,
            Cmp::Lt => value < threshold,
        }
    }
}

/// A hard numeric rule over a normalized lab key.
#[derive(Debug, Clone, Copy)]
pub struct HardRule {
    pub lab: &'static str,
    pub op: Cmp,
    pub threshold: f64,
    pub level: RiskLevel,
    pub description: &'static str,
}

/// Hard numeric rule table. Thresholds are adult reference-range based;
/// several rules can fire for one lab and the maximum level wins.
pub const HARD_RULES: &[HardRule] = &[
    HardRule { lab: "bilirubin", op: Cmp::Gt, threshold: 300.0, level: RiskLevel::Critical, description: "bilirubin above 300 µmol/L suggests fulminant hepatic failure" },
    HardRule { lab: "bilirubin", op: Cmp::Gt, threshold: 50.0, level: RiskLevel::High, description: "bilirubin above 50 µmol/L" },
    HardRule { lab: "bilirubin", op: Cmp::Gt, threshold: 21.0, level: RiskLevel::Medium, description: "bilirubin above the 21 µmol/L reference limit" },
    HardRule { lab: "alt", op: Cmp::Gt, threshold: 200.0, level: RiskLevel::High, description: "ALT above 200 U/L" },
    HardRule { lab: "alt", op: Cmp::Gt, threshold: 55.0, level: RiskLevel::Medium, description: "ALT above the 55 U/L reference limit" },
    HardRule { lab: "ast", op: Cmp::Gt, threshold: 200.0, level: RiskLevel::High, description: "AST above 200 U/L" },
    HardRule { lab: "ast", op: Cmp::Gt, threshold: 50.0, level: RiskLevel::Medium, description: "AST above the 50 U/L reference limit" },
    HardRule { lab: "albumin", op: Cmp::Lt, threshold: 28.0, level: RiskLevel::High, description: "albumin below 28 g/L" },
    HardRule { lab: "albumin", op: Cmp::Lt, threshold: 35.0, level: RiskLevel::Medium, description: "albumin below the 35 g/L reference limit" },
    HardRule { lab: "platelets", op: Cmp::Lt, threshold: 50.0, level: RiskLevel::High, description: "platelets below 50 ×10^9/L" },
    HardRule { lab: "platelets", op: Cmp::Lt, threshold: 150.0, level: RiskLevel::Medium, description: "platelets below the 150 ×10^9/L reference limit" },
    HardRule { lab: "inr", op: Cmp::Gt, threshold: 2.0, level: RiskLevel::Critical, description: "INR above 2.0 without anticoagulation context" },
    HardRule { lab: "inr", op: Cmp::Gt, threshold: 1.7, level: RiskLevel::High, description: "INR above 1.7" },
    HardRule { lab: "inr", op: Cmp::Gt, threshold: 1.3, level: RiskLevel::Medium, description: "INR above the 1.3 reference limit" },
    HardRule { lab: "creatinine", op: Cmp::Gt, threshold: 250.0, level: RiskLevel::High, description: "creatinine above 250 µmol/L" },
    HardRule { lab: "creatinine", op: Cmp::Gt, threshold: 150.0, level: RiskLevel::Medium, description: "creatinine above 150 µmol/L" },
    HardRule { lab: "sodium", op: Cmp::Lt, threshold: 125.0, level: RiskLevel::High, description: "sodium below 125 mmol/L" },
    HardRule { lab: "sodium", op: Cmp::Lt, threshold: 133.0, level: RiskLevel::Medium, description: "sodium below the 133 mmol/L reference limit" },
    HardRule { lab: "afp", op: Cmp::Gt, threshold: 400.0, level: RiskLevel::High, description: "AFP above 400 ng/mL raises HCC concern" },
    HardRule { lab: "egfr", op: Cmp::Lt, threshold: 30.0, level: RiskLevel::High, description: "eGFR below 30" },
    HardRule { lab: "egfr", op: Cmp::Lt, threshold: 60.0, level: RiskLevel::Medium, description: "eGFR below 60" },
];

/// A red-flag keyword rule.
#[derive(Debug, Clone, Copy)]
pub struct KeywordRule {
    pub phrase: &'static str,
    pub level: RiskLevel,
    pub description: &'static str,
}

/// Keyword rule table. Scanned over chief complaint, condition context,
/// history, red flags and all answered-question text.
pub const KEYWORD_RULES: &[KeywordRule] = &[
    KeywordRule { phrase: "vomiting blood", level: RiskLevel::Critical, description: "possible variceal bleed" },
    KeywordRule { phrase: "haematemesis", level: RiskLevel::Critical, description: "possible variceal bleed" },
    KeywordRule { phrase: "hematemesis", level: RiskLevel::Critical, description: "possible variceal bleed" },
    KeywordRule { phrase: "variceal bleed", level: RiskLevel::Critical, description: "variceal bleed" },
    KeywordRule { phrase: "jaundice", level: RiskLevel::High, description: "jaundice reported" },
    KeywordRule { phrase: "yellowing", level: RiskLevel::High, description: "jaundice reported" },
    KeywordRule { phrase: "yellow skin", level: RiskLevel::High, description: "jaundice reported" },
    KeywordRule { phrase: "confusion", level: RiskLevel::High, description: "possible hepatic encephalopathy" },
    KeywordRule { phrase: "disorientated", level: RiskLevel::High, description: "possible hepatic encephalopathy" },
    KeywordRule { phrase: "disoriented", level: RiskLevel::High, description: "possible hepatic encephalopathy" },
    KeywordRule { phrase: "encephalopathy", level: RiskLevel::High, description: "hepatic encephalopathy" },
    KeywordRule { phrase: "gi bleeding", level: RiskLevel::High, description: "GI bleeding" },
    KeywordRule { phrase: "blood in stool", level: RiskLevel::High, description: "GI bleeding" },
    KeywordRule { phrase: "melaena", level: RiskLevel::High, description: "GI bleeding" },
    KeywordRule { phrase: "melena", level: RiskLevel::High, description: "GI bleeding" },
    KeywordRule { phrase: "black stool", level: RiskLevel::High, description: "GI bleeding" },
    KeywordRule { phrase: "suspected malignancy", level: RiskLevel::High, description: "suspected malignancy" },
    KeywordRule { phrase: "cancer", level: RiskLevel::High, description: "malignancy mentioned" },
    KeywordRule { phrase: "mass lesion", level: RiskLevel::High, description: "mass lesion mentioned" },
    KeywordRule { phrase: "ascites", level: RiskLevel::Medium, description: "ascites reported" },
    KeywordRule { phrase: "abdominal swelling", level: RiskLevel::Medium, description: "possible ascites" },
    KeywordRule { phrase: "swollen abdomen", level: RiskLevel::Medium, description: "possible ascites" },
    KeywordRule { phrase: "weight loss", level: RiskLevel::Medium, description: "unexplained weight loss" },
    KeywordRule { phrase: "pruritus", level: RiskLevel::Low, description: "itching reported" },
    KeywordRule { phrase: "itching", level: RiskLevel::Low, description: "itching reported" },
];

/// Normal reference range for a lab (inclusive bounds).
#[derive(Debug, Clone, Copy)]
pub struct NormalRange {
    pub lab: &'static str,
    pub low: f64,
    pub high: f64,
}

/// Reference ranges used by the heuristic tier's abnormal-lab count.
pub const NORMAL_RANGES: &[NormalRange] = &[
    NormalRange { lab: "bilirubin", low: 0.0, high: 21.0 },
    NormalRange { lab: "alt", low: 0.0, high: 55.0 },
    NormalRange { lab: "ast", low: 0.0, high: 50.0 },
    NormalRange { lab: "albumin", low: 35.0, high: 50.0 },
    NormalRange { lab: "platelets", low: 150.0, high: 450.0 },
    NormalRange { lab: "inr", low: 0.8, high: 1.3 },
    NormalRange { lab: "creatinine", low: 60.0, high: 110.0 },
    NormalRange { lab: "sodium", low: 133.0, high: 146.0 },
    NormalRange { lab: "egfr", low: 60.0, high: 200.0 },
    NormalRange { lab: "afp", low: 0.0, high: 10.0 },
    NormalRange { lab: "ggt", low: 0.0, high: 60.0 },
    NormalRange { lab: "alp", low: 30.0, high: 130.0 },
    NormalRange { lab: "hemoglobin", low: 115.0, high: 175.0 },
];

/// Whether a value is outside the normal range for its lab.
pub fn is_abnormal(lab: &str, value: f64) -> bool {
    NORMAL_RANGES
        .iter()
        .find(|r| r.lab == lab)
        .map(|r| value < r.low || value > r.high)
        .unwrap_or(false)
}
