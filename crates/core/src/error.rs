//! Crate-level error type for session operations

use crate::annotation::AnnotationError;
use crate::calibration::CalibrationError;
use crate::config::ConfigError;
use crate::csv_export::CsvExportError;
use crate::measurement::MeasurementError;
use crate::persistence::PersistenceError;
use crate::tool::ToolError;

/// Any error a [`MarkupSession`](crate::session::MarkupSession) can report
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Annotation(#[from] AnnotationError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    Measurement(#[from] MeasurementError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    CsvExport(#[from] CsvExportError),

    /// Annotation input addressed to a different plan than the session's
    #[error("annotation targets plan {found}, session is bound to {expected}")]
    PlanMismatch { expected: String, found: String },

    /// Editing attempted while a historical plan revision is on screen
    #[error("plan version {viewed} is read-only (current is {current})")]
    ReadOnlyVersion { viewed: u32, current: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;
