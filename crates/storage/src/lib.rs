use directories::ProjectDirs;
use planmark_core::{
    Annotation, AnnotationId, AnnotationRepository, CalibrationRecord, CalibrationRepository,
    DeleteOutcome, PersistenceError, PersistenceResult,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unsupported schema version {0} in {1}")]
    UnsupportedVersion(u32, PathBuf),
}

impl From<StorageError> for PersistenceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io(e) => PersistenceError::Io(e),
            StorageError::Serde(e) => PersistenceError::Deserialization(e.to_string()),
            other => PersistenceError::Unavailable(other.to_string()),
        }
    }
}

/// JSON file store, one directory per plan
///
/// ```text
/// <root>/plans/<encoded plan_id>/annotations.json
/// <root>/plans/<encoded plan_id>/calibration.json
/// ```
#[derive(Debug, Clone)]
pub struct JsonPlanStore {
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AnnotationsEnvelope {
    version: u32,
    annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CalibrationEnvelope {
    version: u32,
    calibration: CalibrationRecord,
}

impl JsonPlanStore {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("dev", "Planmark", "Planmark")
            .ok_or(StorageError::NoDataDirectory)?;

        Ok(Self { root: dirs.data_local_dir().to_path_buf() })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn load_annotations(&self, plan_id: &str) -> Result<Vec<Annotation>, StorageError> {
        let path = self.annotations_path(plan_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let bytes = fs::read(&path)?;
        let envelope: AnnotationsEnvelope = serde_json::from_slice(&bytes)?;
        check_version(envelope.version, &path)?;

        let (own, foreign): (Vec<_>, Vec<_>) = envelope
            .annotations
            .into_iter()
            .partition(|a| a.plan_id() == plan_id);
        if !foreign.is_empty() {
            tracing::warn!(%plan_id, skipped = foreign.len(), "ignoring annotations of other plans");
        }

        Ok(own)
    }

    pub fn save_annotations(
        &self,
        plan_id: &str,
        annotations: Vec<Annotation>,
    ) -> Result<(), StorageError> {
        let envelope = AnnotationsEnvelope { version: SCHEMA_VERSION, annotations };
        write_atomic(&self.annotations_path(plan_id), &serde_json::to_vec_pretty(&envelope)?)
    }

    pub fn load_calibration(&self, plan_id: &str) -> Result<Option<CalibrationRecord>, StorageError> {
        let path = self.calibration_path(plan_id);
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&path)?;
        let envelope: CalibrationEnvelope = serde_json::from_slice(&bytes)?;
        check_version(envelope.version, &path)?;

        Ok(Some(envelope.calibration))
    }

    pub fn save_calibration(
        &self,
        plan_id: &str,
        calibration: &CalibrationRecord,
    ) -> Result<(), StorageError> {
        let envelope =
            CalibrationEnvelope { version: SCHEMA_VERSION, calibration: calibration.clone() };
        write_atomic(&self.calibration_path(plan_id), &serde_json::to_vec_pretty(&envelope)?)
    }

    fn remove_file(path: &Path) -> Result<(), StorageError> {
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn plan_dir(&self, plan_id: &str) -> PathBuf {
        self.root.join("plans").join(encode_plan_id(plan_id))
    }

    fn annotations_path(&self, plan_id: &str) -> PathBuf {
        self.plan_dir(plan_id).join("annotations.json")
    }

    fn calibration_path(&self, plan_id: &str) -> PathBuf {
        self.plan_dir(plan_id).join("calibration.json")
    }
}

impl AnnotationRepository for JsonPlanStore {
    fn load(&self, plan_id: &str) -> PersistenceResult<Vec<Annotation>> {
        Ok(self.load_annotations(plan_id)?)
    }

    fn save(&self, annotation: &Annotation) -> PersistenceResult<()> {
        let plan_id = annotation.plan_id();
        let mut annotations = self.load_annotations(plan_id)?;
        match annotations.iter_mut().find(|a| a.id() == annotation.id()) {
            Some(existing) => *existing = annotation.clone(),
            None => annotations.push(annotation.clone()),
        }
        self.save_annotations(plan_id, annotations)?;
        tracing::debug!(%plan_id, annotation_id = %annotation.id(), "annotation written");
        Ok(())
    }

    fn delete(&self, plan_id: &str, id: AnnotationId) -> PersistenceResult<DeleteOutcome> {
        let mut annotations = self.load_annotations(plan_id)?;
        let before = annotations.len();
        annotations.retain(|a| a.id() != id);
        if annotations.len() == before {
            return Ok(DeleteOutcome::NotFound);
        }
        self.save_annotations(plan_id, annotations)?;
        tracing::debug!(%plan_id, annotation_id = %id, "annotation removed");
        Ok(DeleteOutcome::Deleted)
    }

    fn clear(&self, plan_id: &str) -> PersistenceResult<()> {
        Self::remove_file(&self.annotations_path(plan_id))?;
        Ok(())
    }
}

impl CalibrationRepository for JsonPlanStore {
    fn load(&self, plan_id: &str) -> PersistenceResult<Option<CalibrationRecord>> {
        Ok(self.load_calibration(plan_id)?)
    }

    fn save(&self, plan_id: &str, record: &CalibrationRecord) -> PersistenceResult<()> {
        self.save_calibration(plan_id, record)?;
        Ok(())
    }

    fn clear(&self, plan_id: &str) -> PersistenceResult<()> {
        Self::remove_file(&self.calibration_path(plan_id))?;
        Ok(())
    }
}

fn check_version(version: u32, path: &Path) -> Result<(), StorageError> {
    if version > SCHEMA_VERSION {
        return Err(StorageError::UnsupportedVersion(version, path.to_path_buf()));
    }
    Ok(())
}

/// Write through a temporary file so readers never see a partial file
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, bytes)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Encode a plan id as one safe path component
///
/// ASCII letters, digits and `-` pass through; every other byte becomes
/// `_XX` (uppercase hex), `_` included, so distinct ids never share a
/// directory. The empty id maps to a lone `_`, which no other id produces.
fn encode_plan_id(plan_id: &str) -> String {
    if plan_id.is_empty() {
        return "_".to_string();
    }
    let mut encoded = String::with_capacity(plan_id.len());
    for byte in plan_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("_{byte:02X}"));
        }
    }
    encoded
}
