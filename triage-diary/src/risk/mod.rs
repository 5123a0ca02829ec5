//! Deterministic-first risk scoring.
//!
//! Three tiers, evaluated in order:
//!
//! 1. **Hard numeric rules** over normalized, leniently-parsed lab values
//! 2. **Keyword rules** over free-text clinical fields (always checked)
//! 3. **Heuristic fallback** - an additive concern score, reduced
//!    confidence, only reached when nothing deterministic fired
//!
//! Deterministic findings always dominate heuristic findings; the maximum
//! level across all fired rules wins.

pub mod labs;
pub mod rules;
pub mod scorer;

pub use scorer::{HeuristicThresholds, RiskResult, RiskScorer};
