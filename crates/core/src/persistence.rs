//! Persistence contracts
//!
//! The engine hands committed state to repositories and never waits on
//! them: local state is already updated by the time a repository is
//! called, and the outcome is reported back as a [`PersistenceNotice`].
//!
//! [`MemoryRepository`] implements both contracts in memory. Clones share
//! the same backing maps, so a test can keep a handle while a session owns
//! another.

use crate::annotation::{Annotation, AnnotationId};
use crate::calibration::CalibrationRecord;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Error types for persistence operations
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// The backend refused or could not be reached
    #[error("Persistence backend unavailable: {0}")]
    Unavailable(String),
}

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// What a delete found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Annotation persistence contract
pub trait AnnotationRepository {
    /// All annotations for a plan, in render order
    fn load(&self, plan_id: &str) -> PersistenceResult<Vec<Annotation>>;

    /// Insert or replace an annotation
    fn save(&self, annotation: &Annotation) -> PersistenceResult<()>;

    fn delete(&self, plan_id: &str, id: AnnotationId) -> PersistenceResult<DeleteOutcome>;

    /// Remove every annotation of a plan
    fn clear(&self, plan_id: &str) -> PersistenceResult<()>;
}

/// Calibration persistence contract, one calibration per plan
pub trait CalibrationRepository {
    fn load(&self, plan_id: &str) -> PersistenceResult<Option<CalibrationRecord>>;

    fn save(&self, plan_id: &str, record: &CalibrationRecord) -> PersistenceResult<()>;

    fn clear(&self, plan_id: &str) -> PersistenceResult<()>;
}

/// A repository call the session made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceOperation {
    SaveAnnotation(AnnotationId),
    DeleteAnnotation(AnnotationId),
    ClearAnnotations,
    SaveCalibration,
    ClearCalibration,
}

impl fmt::Display for PersistenceOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceOperation::SaveAnnotation(id) => write!(f, "save annotation {}", id),
            PersistenceOperation::DeleteAnnotation(id) => write!(f, "delete annotation {}", id),
            PersistenceOperation::ClearAnnotations => f.write_str("clear annotations"),
            PersistenceOperation::SaveCalibration => f.write_str("save calibration"),
            PersistenceOperation::ClearCalibration => f.write_str("clear calibration"),
        }
    }
}

/// Outcome of an optimistic persistence hand-off
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceNotice {
    Succeeded(PersistenceOperation),
    Failed {
        operation: PersistenceOperation,
        message: String,
    },
    /// The repository had no record to delete; local and stored state differ
    NotFound(PersistenceOperation),
}

impl PersistenceNotice {
    pub fn from_result<T>(operation: PersistenceOperation, result: &PersistenceResult<T>) -> Self {
        match result {
            Ok(_) => PersistenceNotice::Succeeded(operation),
            Err(e) => PersistenceNotice::Failed {
                operation,
                message: e.to_string(),
            },
        }
    }

    /// Like [`from_result`](Self::from_result), but a delete that matched
    /// nothing is reported as [`PersistenceNotice::NotFound`]
    pub fn from_delete(
        operation: PersistenceOperation,
        result: &PersistenceResult<DeleteOutcome>,
    ) -> Self {
        match result {
            Ok(DeleteOutcome::NotFound) => PersistenceNotice::NotFound(operation),
            _ => Self::from_result(operation, result),
        }
    }

    pub fn operation(&self) -> PersistenceOperation {
        match self {
            PersistenceNotice::Succeeded(operation)
            | PersistenceNotice::NotFound(operation)
            | PersistenceNotice::Failed { operation, .. } => *operation,
        }
    }

    /// True unless the repository did exactly what was asked
    pub fn is_failure(&self) -> bool {
        !matches!(self, PersistenceNotice::Succeeded(_))
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    annotations: HashMap<String, Vec<Annotation>>,
    calibrations: HashMap<String, CalibrationRecord>,
    fail_writes: bool,
}

/// In-memory implementation of both persistence contracts
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, for exercising failure notices
    pub fn set_fail_writes(&self, fail: bool) -> PersistenceResult<()> {
        self.lock()?.fail_writes = fail;
        Ok(())
    }

    /// Number of annotations stored for a plan
    pub fn annotation_count(&self, plan_id: &str) -> usize {
        self.lock()
            .map(|state| state.annotations.get(plan_id).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    fn lock(&self) -> PersistenceResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| PersistenceError::Unavailable("memory store poisoned".to_string()))
    }

    fn lock_for_write(&self) -> PersistenceResult<MutexGuard<'_, MemoryState>> {
        let state = self.lock()?;
        if state.fail_writes {
            return Err(PersistenceError::Unavailable("writes disabled".to_string()));
        }
        Ok(state)
    }
}

impl AnnotationRepository for MemoryRepository {
    fn load(&self, plan_id: &str) -> PersistenceResult<Vec<Annotation>> {
        Ok(self.lock()?.annotations.get(plan_id).cloned().unwrap_or_default())
    }

    fn save(&self, annotation: &Annotation) -> PersistenceResult<()> {
        let mut state = self.lock_for_write()?;
        let plan = state
            .annotations
            .entry(annotation.plan_id().to_string())
            .or_default();
        match plan.iter_mut().find(|a| a.id() == annotation.id()) {
            Some(existing) => *existing = annotation.clone(),
            None => plan.push(annotation.clone()),
        }
        Ok(())
    }

    fn delete(&self, plan_id: &str, id: AnnotationId) -> PersistenceResult<DeleteOutcome> {
        let mut state = self.lock_for_write()?;
        let Some(plan) = state.annotations.get_mut(plan_id) else {
            return Ok(DeleteOutcome::NotFound);
        };
        let before = plan.len();
        plan.retain(|a| a.id() != id);
        Ok(if plan.len() < before {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::NotFound
        })
    }

    fn clear(&self, plan_id: &str) -> PersistenceResult<()> {
        self.lock_for_write()?.annotations.remove(plan_id);
        Ok(())
    }
}

impl CalibrationRepository for MemoryRepository {
    fn load(&self, plan_id: &str) -> PersistenceResult<Option<CalibrationRecord>> {
        Ok(self.lock()?.calibrations.get(plan_id).cloned())
    }

    fn save(&self, plan_id: &str, record: &CalibrationRecord) -> PersistenceResult<()> {
        self.lock_for_write()?
            .calibrations
            .insert(plan_id.to_string(), record.clone());
        Ok(())
    }

    fn clear(&self, plan_id: &str) -> PersistenceResult<()> {
        self.lock_for_write()?.calibrations.remove(plan_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationShape, NewAnnotation};
    use crate::calibration::MeasurementUnit;
    use crate::coordinate::Percent;

    fn annotation(plan: &str) -> Annotation {
        let shape = AnnotationShape::Text {
            position: Percent::new(5.0, 5.0),
            content: "Note".to_string(),
        };
        Annotation::from_input(NewAnnotation::new(plan, "project", shape), None)
    }

    #[test]
    fn test_save_load_delete() {
        let repo = MemoryRepository::new();
        let a = annotation("plan-a");
        let b = annotation("plan-b");
        AnnotationRepository::save(&repo, &a).unwrap();
        AnnotationRepository::save(&repo, &b).unwrap();
        // Saving again replaces
        AnnotationRepository::save(&repo, &a).unwrap();

        assert_eq!(AnnotationRepository::load(&repo, "plan-a").unwrap(), vec![a.clone()]);
        assert_eq!(repo.delete("plan-a", a.id()).unwrap(), DeleteOutcome::Deleted);
        assert_eq!(repo.delete("plan-a", a.id()).unwrap(), DeleteOutcome::NotFound);
        assert_eq!(repo.annotation_count("plan-b"), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let repo = MemoryRepository::new();
        let handle = repo.clone();
        AnnotationRepository::save(&repo, &annotation("plan")).unwrap();
        assert_eq!(handle.annotation_count("plan"), 1);

        AnnotationRepository::clear(&handle, "plan").unwrap();
        assert_eq!(repo.annotation_count("plan"), 0);
    }

    #[test]
    fn test_calibration_round_trip() {
        let repo = MemoryRepository::new();
        let record = CalibrationRecord {
            pixels_per_unit: 10.0,
            unit: MeasurementUnit::Feet,
            reference_length: 10.0,
            start_x: 0.0,
            start_y: 0.0,
            end_x: 10.0,
            end_y: 0.0,
        };
        assert_eq!(CalibrationRepository::load(&repo, "plan").unwrap(), None);
        CalibrationRepository::save(&repo, "plan", &record).unwrap();
        assert_eq!(CalibrationRepository::load(&repo, "plan").unwrap(), Some(record));
        CalibrationRepository::clear(&repo, "plan").unwrap();
        assert_eq!(CalibrationRepository::load(&repo, "plan").unwrap(), None);
    }

    #[test]
    fn test_failing_writes_become_failed_notices() {
        let repo = MemoryRepository::new();
        repo.set_fail_writes(true).unwrap();
        let a = annotation("plan");
        let result = AnnotationRepository::save(&repo, &a);
        let notice = PersistenceNotice::from_result(PersistenceOperation::SaveAnnotation(a.id()), &result);
        assert!(notice.is_failure());
        assert_eq!(notice.operation(), PersistenceOperation::SaveAnnotation(a.id()));
        assert_eq!(repo.annotation_count("plan"), 0);
    }

    #[test]
    fn test_missing_delete_becomes_not_found_notice() {
        let repo = MemoryRepository::new();
        let a = annotation("plan");
        let op = PersistenceOperation::DeleteAnnotation(a.id());

        let notice = PersistenceNotice::from_delete(op, &repo.delete("plan", a.id()));
        assert_eq!(notice, PersistenceNotice::NotFound(op));
        assert!(notice.is_failure());

        AnnotationRepository::save(&repo, &a).unwrap();
        let notice = PersistenceNotice::from_delete(op, &repo.delete("plan", a.id()));
        assert_eq!(notice, PersistenceNotice::Succeeded(op));
    }
}
