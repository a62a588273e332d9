//! Plan snapshots
//!
//! A self-contained JSON document with everything known about one plan's
//! markup: calibration, annotations and pins. Used to hand a session's
//! state to offline tooling.

use crate::annotation::Annotation;
use crate::calibration::CalibrationRecord;
use crate::coordinate::PlanDimensions;
use crate::persistence::{PersistenceError, PersistenceResult};
use crate::pin::Pin;
use std::path::Path;

/// Serialized markup state of one plan
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlanSnapshot {
    pub plan_id: String,
    pub project_id: String,
    pub dimensions: PlanDimensions,
    #[serde(default)]
    pub calibration: Option<CalibrationRecord>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub pins: Vec<Pin>,
}

impl PlanSnapshot {
    pub fn from_json(json: &str) -> PersistenceResult<Self> {
        serde_json::from_str(json).map_err(|e| PersistenceError::Deserialization(e.to_string()))
    }

    pub fn to_json(&self) -> PersistenceResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| PersistenceError::Serialization(e.to_string()))
    }

    /// Load a snapshot file
    pub fn load(path: &Path) -> PersistenceResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
