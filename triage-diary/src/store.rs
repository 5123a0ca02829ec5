//! Diary persistence contract and the in-memory reference store.
//!
//! Storage is opaque to the core: any key-value or document store works as
//! long as it honors the generation-based compare-and-swap. Callers branch
//! on typed error variants instead of catching broad exceptions.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::diary::PatientDiary;

/// Error types for diary storage.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DiaryError {
    /// No diary exists for this patient. Expected only on the very first
    /// event for a patient; otherwise a data-integrity bug.
    #[error("no diary for patient {0}")]
    NotFound(String),

    /// The stored generation no longer matches the loaded generation.
    #[error("concurrent save for patient {patient_id}: expected generation {expected}, found {actual}")]
    ConcurrencyConflict {
        patient_id: String,
        expected: u64,
        actual: u64,
    },

    /// A diary already exists where a fresh one was requested.
    #[error("diary already exists for patient {0}")]
    AlreadyExists(String),

    /// Backend-specific failure.
    #[error("diary store error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, DiaryError>;

/// Durable, optimistically-versioned per-patient state.
#[async_trait]
pub trait DiaryStore: Send + Sync {
    /// Initialize a fresh diary at generation 0.
    async fn create(&self, patient_id: &str) -> Result<PatientDiary>;

    /// Load a diary and its current generation.
    async fn load(&self, patient_id: &str) -> Result<(PatientDiary, u64)>;

    /// Save a diary. Fails with [`DiaryError::ConcurrencyConflict`] if
    /// `expected_generation` is stale. Returns the new generation.
    async fn save(
        &self,
        patient_id: &str,
        diary: PatientDiary,
        expected_generation: u64,
    ) -> Result<u64>;
}

/// In-memory diary store. The DashMap shard lock makes the save
/// compare-and-swap atomic per patient.
pub struct MemoryDiaryStore {
    entries: DashMap<String, (PatientDiary, u64)>,
}

impl MemoryDiaryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Number of diaries held.
    pub fn count(&self) -> usize {
        self.entries.len()
    }
}

impl Default for MemoryDiaryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiaryStore for MemoryDiaryStore {
    async fn create(&self, patient_id: &str) -> Result<PatientDiary> {
        if self.entries.contains_key(patient_id) {
            return Err(DiaryError::AlreadyExists(patient_id.to_string()));
        }

        let diary = PatientDiary::new(patient_id);
        self.entries
            .insert(patient_id.to_string(), (diary.clone(), 0));

        debug!(patient_id = %patient_id, "Created diary at generation 0");
        Ok(diary)
    }

    async fn load(&self, patient_id: &str) -> Result<(PatientDiary, u64)> {
        self.entries
            .get(patient_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DiaryError::NotFound(patient_id.to_string()))
    }

    async fn save(
        &self,
        patient_id: &str,
        mut diary: PatientDiary,
        expected_generation: u64,
    ) -> Result<u64> {
        let mut entry = self
            .entries
            .get_mut(patient_id)
            .ok_or_else(|| DiaryError::NotFound(patient_id.to_string()))?;

        let actual = entry.value().1;
        if actual != expected_generation {
            return Err(DiaryError::ConcurrencyConflict {
                patient_id: patient_id.to_string(),
                expected: expected_generation,
                actual,
            });
        }

        diary.touch();
        let new_generation = expected_generation + 1;
        *entry.value_mut() = (diary, new_generation);

        debug!(
            patient_id = %patient_id,
            generation = new_generation,
            "Saved diary"
        );
        Ok(new_generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_then_load() {
        let store = MemoryDiaryStore::new();

        store.create("patient-1").await.unwrap();
        let (diary, generation) = store.load("patient-1").await.unwrap();

        assert_eq!(diary.patient_id, "patient-1");
        assert_eq!(generation, 0);
    }

    #[tokio::test]
    async fn test_load_missing_is_not_found() {
        let store = MemoryDiaryStore::new();
        let err = store.load("nobody").await.unwrap_err();
        assert!(matches!(err, DiaryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let store = MemoryDiaryStore::new();
        store.create("patient-1").await.unwrap();
        let err = store.create("patient-1").await.unwrap_err();
        assert!(matches!(err, DiaryError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_save_bumps_generation() {
        let store = MemoryDiaryStore::new();
        let diary = store.create("patient-1").await.unwrap();

        let generation = store.save("patient-1", diary, 0).await.unwrap();
        assert_eq!(generation, 1);

        let (_, loaded_generation) = store.load("patient-1").await.unwrap();
        assert_eq!(loaded_generation, 1);
    }

    #[tokio::test]
    async fn test_stale_save_rejected() {
        let store = MemoryDiaryStore::new();
        let diary = store.create("patient-1").await.unwrap();

        store.save("patient-1", diary.clone(), 0).await.unwrap();

        // A second writer still holding generation 0 must be rejected.
        let err = store.save("patient-1", diary, 0).await.unwrap_err();
        assert!(matches!(
            err,
            DiaryError::ConcurrencyConflict {
                expected: 0,
                actual: 1,
                ..
            }
        ));
    }
}
