//! Planmark Core Library
//!
//! Plan annotation and measurement engine: coordinate normalization,
//! scale calibration, distance/area measurement, layered annotations with
//! undo/redo, and version-aware read-only overlays.

pub mod annotation;
pub mod calibration;
pub mod config;
pub mod coordinate;
pub mod csv_export;
pub mod error;
pub mod history;
pub mod layer;
pub mod measurement;
pub mod overlay;
pub mod persistence;
pub mod pin;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod tool;

pub use annotation::{
    Annotation, AnnotationError, AnnotationId, AnnotationKind, AnnotationRecord, AnnotationShape,
    AnnotationStyle, Color, NewAnnotation, DEFAULT_LAYER,
};
pub use calibration::{
    CalibrationError, CalibrationManager, CalibrationPhase, CalibrationRecord, MeasurementUnit,
    ScaleCalibration,
};
pub use config::{ConfigError, EngineConfig};
pub use coordinate::{to_percent, to_pixel, ContentRect, Percent, Pixel, PlanDimensions, Viewport};
pub use csv_export::{export_pins_csv, CsvExportConfig, CsvExportError};
pub use error::{Error, Result};
pub use history::{ApplyTarget, HistoryAction, HistoryEntry, HistoryManager, TimelineEntry};
pub use layer::{Layer, LayerRegistry};
pub use measurement::{
    area_from_pixels, distance_from_pixels, summarize, Measurement, MeasurementError, SummaryRow,
};
pub use overlay::VersionOverlay;
pub use persistence::{
    AnnotationRepository, CalibrationRepository, DeleteOutcome, MemoryRepository,
    PersistenceError, PersistenceNotice, PersistenceOperation, PersistenceResult,
};
pub use pin::{Pin, PinDraft, PinId};
pub use session::{
    ExportHandle, MarkupSession, PlanInfo, PlanSurface, Repositories, SessionKey, Shortcut,
};
pub use snapshot::PlanSnapshot;
pub use store::{AnnotationStore, CreateContext};
pub use tool::{Tool, ToolError, ToolMachine, ToolOutcome};
