//! Concurrency-safe appointment slot registry.
//!
//! Slots move through three states: free, held, confirmed. A hold is an
//! exclusive time-limited claim taken when a slot is offered to a patient;
//! confirmation converts the hold into a permanent booking. Expired holds
//! are reclaimed lazily on the next access, so no background sweeper is
//! needed. Two patients can never hold or confirm the same slot.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use triage_diary::SlotOption;

/// Error types for slot operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    /// The patient holds no claim on this slot.
    #[error("no hold on this slot for patient {0}")]
    NoHold(String),

    /// The patient's hold lapsed before confirmation.
    #[error("hold expired for patient {0}")]
    HoldExpired(String),

    /// Another patient already holds or booked the slot.
    #[error("slot is taken")]
    SlotTaken,

    /// The slot is not in the registry.
    #[error("unknown slot")]
    UnknownSlot,

    /// The booking belongs to a different patient.
    #[error("booking is not owned by patient {0}")]
    NotOwner(String),
}

/// An exclusive time-limited claim on a slot.
#[derive(Debug, Clone)]
struct Hold {
    patient_id: String,
    expires_at: DateTime<Utc>,
}

impl Hold {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// State of one slot.
#[derive(Debug, Clone, Default)]
struct SlotState {
    hold: Option<Hold>,
    confirmed_by: Option<String>,
}

impl SlotState {
    /// Drop the hold if it has lapsed. Confirmed bookings never expire.
    fn reclaim_if_expired(&mut self, now: DateTime<Utc>) {
        if let Some(hold) = &self.hold {
            if hold.is_expired(now) {
                debug!(patient_id = %hold.patient_id, "Reclaiming expired hold");
                self.hold = None;
            }
        }
    }

    fn is_free(&self) -> bool {
        self.hold.is_none() && self.confirmed_by.is_none()
    }
}

/// Registry of appointment slots.
///
/// Atomicity comes from the DashMap shard lock: every state transition for
/// a slot happens under its entry guard.
pub struct SlotRegistry {
    slots: DashMap<SlotOption, SlotState>,
    hold_ttl: ChronoDuration,
}

impl SlotRegistry {
    /// Create an empty registry with the given hold TTL.
    pub fn new(hold_ttl: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            hold_ttl: ChronoDuration::from_std(hold_ttl)
                .unwrap_or_else(|_| ChronoDuration::seconds(900)),
        }
    }

    /// Add slots to the registry. Existing slots are left untouched.
    pub fn add_slots(&self, slots: impl IntoIterator<Item = SlotOption>) {
        for slot in slots {
            self.slots.entry(slot).or_default();
        }
    }

    /// Number of slots currently free.
    pub fn free_count(&self) -> usize {
        let now = Utc::now();
        self.slots
            .iter()
            .filter(|entry| {
                let state = entry.value();
                state.confirmed_by.is_none()
                    && state
                        .hold
                        .as_ref()
                        .map(|h| h.is_expired(now))
                        .unwrap_or(true)
            })
            .count()
    }

    /// Hold up to `count` of the candidate slots for a patient.
    ///
    /// Candidates are tried in order; slots held or booked by others are
    /// skipped. Returns the slots actually held, which may be fewer than
    /// requested (or empty when everything is taken).
    pub fn offer_slots(
        &self,
        patient_id: &str,
        candidates: &[SlotOption],
        count: usize,
    ) -> Vec<SlotOption> {
        let now = Utc::now();
        let mut held = Vec::new();

        for slot in candidates {
            if held.len() >= count {
                break;
            }

            let mut state = self.slots.entry(slot.clone()).or_default();
            state.reclaim_if_expired(now);

            let already_mine = state
                .hold
                .as_ref()
                .map(|h| h.patient_id == patient_id)
                .unwrap_or(false);

            if state.is_free() || already_mine {
                state.hold = Some(Hold {
                    patient_id: patient_id.to_string(),
                    expires_at: now + self.hold_ttl,
                });
                held.push(slot.clone());
            }
        }

        debug!(
            patient_id = %patient_id,
            held = held.len(),
            requested = count,
            "Offered slots"
        );
        held
    }

    /// Confirm a held slot, converting the hold into a permanent booking.
    ///
    /// Requires a live hold owned by this patient. On success the patient's
    /// holds on other slots are released.
    pub fn confirm(&self, patient_id: &str, slot: &SlotOption) -> Result<(), SlotError> {
        let now = Utc::now();

        {
            let mut state = self
                .slots
                .get_mut(slot)
                .ok_or(SlotError::UnknownSlot)?;

            if let Some(owner) = &state.confirmed_by {
                if owner == patient_id {
                    return Ok(()); // confirming twice is a no-op
                }
                return Err(SlotError::SlotTaken);
            }

            let (owned, expired) = match &state.hold {
                None => return Err(SlotError::NoHold(patient_id.to_string())),
                Some(hold) => (hold.patient_id == patient_id, hold.is_expired(now)),
            };
            if !owned {
                return Err(SlotError::SlotTaken);
            }
            if expired {
                state.hold = None;
                return Err(SlotError::HoldExpired(patient_id.to_string()));
            }

            state.hold = None;
            state.confirmed_by = Some(patient_id.to_string());
        }
        // Entry guard dropped before touching other slots.

        self.release_holds(patient_id);

        info!(patient_id = %patient_id, slot = %slot, "Slot confirmed");
        Ok(())
    }

    /// Release every hold a patient has. Confirmed bookings are untouched.
    pub fn release_holds(&self, patient_id: &str) {
        for mut entry in self.slots.iter_mut() {
            let matches = entry
                .value()
                .hold
                .as_ref()
                .map(|h| h.patient_id == patient_id)
                .unwrap_or(false);
            if matches {
                entry.value_mut().hold = None;
            }
        }
    }

    /// Cancel a confirmed booking, freeing the slot. Only the owner can
    /// cancel.
    pub fn cancel_booking(&self, patient_id: &str, slot: &SlotOption) -> Result<(), SlotError> {
        let mut state = self.slots.get_mut(slot).ok_or(SlotError::UnknownSlot)?;

        match &state.confirmed_by {
            Some(owner) if owner == patient_id => {
                state.confirmed_by = None;
                info!(patient_id = %patient_id, slot = %slot, "Booking cancelled");
                Ok(())
            }
            Some(_) => {
                warn!(patient_id = %patient_id, slot = %slot, "Cancel refused, not owner");
                Err(SlotError::NotOwner(patient_id.to_string()))
            }
            None => Err(SlotError::NoHold(patient_id.to_string())),
        }
    }

    /// The patient's confirmed booking, if any.
    pub fn get_patient_booking(&self, patient_id: &str) -> Option<SlotOption> {
        self.slots.iter().find_map(|entry| {
            if entry.value().confirmed_by.as_deref() == Some(patient_id) {
                Some(entry.key().clone())
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use std::sync::Arc;

    fn slot(day: u32, hour: u32) -> SlotOption {
        SlotOption::new(
            NaiveDate::from_ymd_opt(2026, 9, day).unwrap(),
            NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            "Dr Patel",
        )
    }

    fn registry() -> SlotRegistry {
        let registry = SlotRegistry::new(Duration::from_secs(900));
        registry.add_slots((1..=9).map(|d| slot(d, 9)));
        registry
    }

    #[test]
    fn test_offer_then_confirm() {
        let registry = registry();

        let held = registry.offer_slots("patient-1", &[slot(1, 9), slot(2, 9)], 2);
        assert_eq!(held.len(), 2);

        registry.confirm("patient-1", &held[0]).unwrap();
        assert_eq!(registry.get_patient_booking("patient-1"), Some(held[0].clone()));

        // The unconfirmed hold was released and is offerable again.
        let reoffered = registry.offer_slots("patient-2", &[held[1].clone()], 1);
        assert_eq!(reoffered, vec![held[1].clone()]);
    }

    #[test]
    fn test_held_slot_not_offered_to_others() {
        let registry = registry();

        let held = registry.offer_slots("patient-1", &[slot(1, 9)], 1);
        assert_eq!(held.len(), 1);

        let other = registry.offer_slots("patient-2", &[slot(1, 9)], 1);
        assert!(other.is_empty());
    }

    #[test]
    fn test_confirm_without_hold_fails() {
        let registry = registry();
        let err = registry.confirm("patient-1", &slot(1, 9)).unwrap_err();
        assert!(matches!(err, SlotError::NoHold(_)));
    }

    #[test]
    fn test_confirm_other_patients_hold_fails() {
        let registry = registry();
        registry.offer_slots("patient-1", &[slot(1, 9)], 1);

        let err = registry.confirm("patient-2", &slot(1, 9)).unwrap_err();
        assert_eq!(err, SlotError::SlotTaken);
    }

    #[test]
    fn test_expired_hold_reclaimed() {
        let registry = SlotRegistry::new(Duration::from_secs(0));
        registry.add_slots([slot(1, 9)]);

        registry.offer_slots("patient-1", &[slot(1, 9)], 1);

        // Zero TTL: the hold is already expired.
        let err = registry.confirm("patient-1", &slot(1, 9)).unwrap_err();
        assert!(matches!(err, SlotError::HoldExpired(_)));

        let reoffered = registry.offer_slots("patient-2", &[slot(1, 9)], 1);
        assert_eq!(reoffered.len(), 1);
    }

    #[test]
    fn test_cancel_only_by_owner() {
        let registry = registry();
        let held = registry.offer_slots("patient-1", &[slot(1, 9)], 1);
        registry.confirm("patient-1", &held[0]).unwrap();

        let err = registry.cancel_booking("patient-2", &held[0]).unwrap_err();
        assert!(matches!(err, SlotError::NotOwner(_)));

        registry.cancel_booking("patient-1", &held[0]).unwrap();
        assert_eq!(registry.get_patient_booking("patient-1"), None);

        // Cancelled slot is free again.
        let reoffered = registry.offer_slots("patient-3", &[held[0].clone()], 1);
        assert_eq!(reoffered.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_offers_get_disjoint_slots() {
        let registry = Arc::new(registry());

        let candidates: Vec<SlotOption> = (1..=9).map(|d| slot(d, 9)).collect();
        let mut handles = Vec::new();
        for patient in 0..3 {
            let registry = Arc::clone(&registry);
            let candidates = candidates.clone();
            handles.push(tokio::spawn(async move {
                registry.offer_slots(&format!("patient-{patient}"), &candidates, 3)
            }));
        }

        let mut all_held = Vec::new();
        for handle in handles {
            all_held.extend(handle.await.unwrap());
        }

        // 9 slots, 3 patients wanting 3 each: every slot handed out once.
        assert_eq!(all_held.len(), 9);
        let unique: std::collections::HashSet<_> = all_held.iter().collect();
        assert_eq!(unique.len(), 9);
    }

    #[test]
    fn test_double_confirm_is_noop() {
        let registry = registry();
        let held = registry.offer_slots("patient-1", &[slot(1, 9)], 1);
        registry.confirm("patient-1", &held[0]).unwrap();
        registry.confirm("patient-1", &held[0]).unwrap();
        assert_eq!(registry.get_patient_booking("patient-1"), Some(held[0].clone()));
    }
}
