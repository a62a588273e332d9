//! Markup session
//!
//! One [`MarkupSession`] per `(plan_id, project_id)`. It owns the
//! calibration, the annotation store, the undo/redo history, the tool
//! state machine, layers, pins and the version overlay, and is the only
//! place they are wired together. Opening a different plan means opening
//! a new session.
//!
//! Pointer events arrive in screen pixels together with the content box
//! they were taken in and are normalized to percentages here. Persistence
//! is optimistic: local state changes first, then the repository is
//! called and its outcome queued as a [`PersistenceNotice`].

use crate::annotation::{
    Annotation, AnnotationError, AnnotationId, AnnotationShape, AnnotationStyle, NewAnnotation,
};
use crate::calibration::{
    CalibrationManager, CalibrationPhase, MeasurementUnit, ScaleCalibration,
};
use crate::config::EngineConfig;
use crate::coordinate::{to_percent, ContentRect, Percent, Pixel, PlanDimensions};
use crate::csv_export::{export_pins_csv, CsvExportConfig};
use crate::error::{Error, Result};
use crate::history::{HistoryAction, HistoryManager};
use crate::layer::{Layer, LayerRegistry};
use crate::measurement::{measure_shape, summarize, SummaryRow};
use crate::overlay::VersionOverlay;
use crate::persistence::{
    AnnotationRepository, CalibrationRepository, DeleteOutcome, MemoryRepository, PersistenceNotice,
    PersistenceOperation, PersistenceResult,
};
use crate::pin::{Pin, PinDraft, PinId};
use crate::snapshot::PlanSnapshot;
use crate::store::{AnnotationStore, CreateContext};
use crate::tool::{Tool, ToolMachine, ToolOutcome};
use std::io::Write;

/// Identity of a session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub plan_id: String,
    pub project_id: String,
}

impl SessionKey {
    pub fn new(plan_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
            project_id: project_id.into(),
        }
    }
}

/// What the engine knows about the plan being marked up
#[derive(Debug, Clone, PartialEq)]
pub struct PlanInfo {
    /// Natural content size in unscaled pixels
    pub dimensions: PlanDimensions,
    pub current_version: u32,
    pub file_url: Option<String>,
}

impl PlanInfo {
    pub fn new(dimensions: PlanDimensions) -> Self {
        Self {
            dimensions,
            current_version: 1,
            file_url: None,
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.current_version = version;
        self
    }

    pub fn with_file_url(mut self, url: impl Into<String>) -> Self {
        self.file_url = Some(url.into());
        self
    }
}

/// Reference to the rendered plan surface, for exporters
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSurface {
    pub plan_id: String,
    pub file_url: Option<String>,
    pub dimensions: PlanDimensions,
}

/// What an exporter needs from a session
pub trait ExportHandle {
    /// The plan surface the annotations are drawn over
    fn exportable_element(&self) -> PlanSurface;

    /// Visible, layer-filtered annotations in render order
    fn annotations(&self) -> Vec<&Annotation>;
}

/// Keyboard shortcuts the session reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    Undo,
    Redo,
    Escape,
    Enter,
}

/// Persistence collaborators of a session
pub struct Repositories {
    pub annotations: Box<dyn AnnotationRepository>,
    pub calibrations: Box<dyn CalibrationRepository>,
}

impl Repositories {
    pub fn new(
        annotations: impl AnnotationRepository + 'static,
        calibrations: impl CalibrationRepository + 'static,
    ) -> Self {
        Self {
            annotations: Box::new(annotations),
            calibrations: Box::new(calibrations),
        }
    }

    /// Both contracts served by one in-memory repository
    pub fn memory(repository: MemoryRepository) -> Self {
        Self::new(repository.clone(), repository)
    }
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}

/// Plan annotation and measurement session
#[derive(Debug)]
pub struct MarkupSession {
    key: SessionKey,
    config: EngineConfig,
    plan: PlanInfo,
    style: AnnotationStyle,
    active_layer: String,
    calibration: CalibrationManager,
    store: AnnotationStore,
    history: HistoryManager,
    tools: ToolMachine,
    layers: LayerRegistry,
    overlay: VersionOverlay,
    pins: Vec<Pin>,
    repos: Repositories,
    notices: Vec<PersistenceNotice>,
}

impl MarkupSession {
    /// Open a session and load the plan's persisted markup
    ///
    /// A stored calibration that no longer validates is ignored with a
    /// warning; failing to load annotations is an error.
    pub fn open(
        key: SessionKey,
        config: EngineConfig,
        plan: PlanInfo,
        repos: Repositories,
    ) -> Result<Self> {
        config.validate()?;
        let style = config.default_style()?;

        let annotations = repos.annotations.load(&key.plan_id)?;
        let mut calibration = CalibrationManager::new(plan.dimensions);
        match repos.calibrations.load(&key.plan_id) {
            Ok(Some(record)) => match ScaleCalibration::from_record(&record) {
                Ok(restored) => calibration.restore(restored),
                Err(e) => tracing::warn!(plan_id = %key.plan_id, error = %e, "ignoring stored calibration"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(plan_id = %key.plan_id, error = %e, "failed to load calibration"),
        }

        let mut layers = LayerRegistry::new();
        layers.ensure(&config.default_layer);
        for annotation in &annotations {
            layers.ensure(annotation.layer());
        }

        let mut tools = ToolMachine::new(config.freehand_min_step);
        tools.set_calibrated(calibration.is_calibrated());

        tracing::info!(
            plan_id = %key.plan_id,
            project_id = %key.project_id,
            annotations = annotations.len(),
            calibrated = calibration.is_calibrated(),
            "markup session opened"
        );

        Ok(Self {
            active_layer: config.default_layer.clone(),
            history: HistoryManager::with_limit(config.history_limit),
            overlay: VersionOverlay::new(plan.current_version),
            store: AnnotationStore::with_annotations(annotations),
            key,
            config,
            plan,
            style,
            calibration,
            tools,
            layers,
            pins: Vec::new(),
            repos,
            notices: Vec::new(),
        })
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn dimensions(&self) -> PlanDimensions {
        self.plan.dimensions
    }

    // --- Tools and pointer input ---

    pub fn tool(&self) -> Tool {
        self.tools.tool()
    }

    /// Whether a drawing tool is active
    pub fn is_drawing(&self) -> bool {
        self.tools.is_drawing()
    }

    /// Switch tools; drawing tools are refused on a historical revision
    pub fn select_tool(&mut self, tool: Tool) -> Result<()> {
        if tool.is_drawing() {
            self.ensure_editable()?;
        }
        if self.tools.tool() == Tool::Calibrate && tool != Tool::Calibrate {
            self.calibration.cancel();
        }
        self.tools.select_tool(tool)?;
        Ok(())
    }

    /// Leave drawing mode, discarding any gesture
    pub fn exit_drawing(&mut self) {
        self.calibration.cancel();
        self.tools.exit_drawing();
    }

    /// Style for subsequently drawn annotations
    pub fn set_style(&mut self, style: AnnotationStyle) {
        self.style = style;
    }

    pub fn style(&self) -> &AnnotationStyle {
        &self.style
    }

    /// Layer subsequently drawn annotations land on
    pub fn set_active_layer(&mut self, name: &str) {
        self.layers.ensure(name);
        self.active_layer = name.to_string();
    }

    pub fn active_layer(&self) -> &str {
        &self.active_layer
    }

    pub fn pointer_down(&mut self, pixel: Pixel, rect: &ContentRect) -> Result<Option<Annotation>> {
        let position = to_percent(pixel, rect);
        if self.tools.tool() == Tool::Calibrate && !self.tools.is_entering_text() {
            self.calibration.begin_calibration(position);
        }
        let outcome = self.tools.pointer_down(position);
        self.handle_outcome(outcome)
    }

    pub fn pointer_move(&mut self, pixel: Pixel, rect: &ContentRect) {
        self.tools.pointer_move(to_percent(pixel, rect));
    }

    pub fn pointer_up(&mut self, pixel: Pixel, rect: &ContentRect) -> Result<Option<Annotation>> {
        let outcome = self.tools.pointer_up(to_percent(pixel, rect));
        if outcome == ToolOutcome::None
            && matches!(self.calibration.phase(), CalibrationPhase::Drawing { .. })
        {
            self.calibration.cancel();
        }
        self.handle_outcome(outcome)
    }

    /// Double-click closes an area polygon
    pub fn double_click(&mut self) -> Result<Option<Annotation>> {
        let outcome = self.tools.double_click();
        self.handle_outcome(outcome)
    }

    pub fn close_polygon(&mut self) -> Result<Option<Annotation>> {
        let outcome = self.tools.close_polygon();
        self.handle_outcome(outcome)
    }

    pub fn text_input(&mut self, text: &str) {
        self.tools.text_input(text);
    }

    pub fn confirm_text(&mut self) -> Result<Option<Annotation>> {
        let outcome = self.tools.confirm_text();
        self.handle_outcome(outcome)
    }

    /// Shape of the gesture in progress, for rubber-band rendering
    pub fn preview(&self) -> Option<AnnotationShape> {
        self.tools.preview()
    }

    /// React to a keyboard shortcut
    ///
    /// Undo and redo only act while drawing mode is active. Escape cancels
    /// the gesture in progress, or leaves drawing mode when there is none.
    /// Enter confirms text entry or closes an area polygon.
    pub fn handle_shortcut(&mut self, shortcut: Shortcut) -> Result<Option<Annotation>> {
        match shortcut {
            Shortcut::Undo if self.tools.is_drawing() => {
                self.undo()?;
                Ok(None)
            }
            Shortcut::Redo if self.tools.is_drawing() => {
                self.redo()?;
                Ok(None)
            }
            Shortcut::Undo | Shortcut::Redo => Ok(None),
            Shortcut::Escape => {
                if self.tools.has_pending_gesture() {
                    self.tools.cancel();
                    self.calibration.cancel();
                } else {
                    self.exit_drawing();
                }
                Ok(None)
            }
            Shortcut::Enter => {
                if self.tools.is_entering_text() {
                    self.confirm_text()
                } else {
                    self.close_polygon()
                }
            }
        }
    }

    fn handle_outcome(&mut self, outcome: ToolOutcome) -> Result<Option<Annotation>> {
        match outcome {
            ToolOutcome::None => Ok(None),
            ToolOutcome::Commit(shape) => self.commit_shape(shape),
            ToolOutcome::CalibrationLine { start, end } => {
                if !matches!(self.calibration.phase(), CalibrationPhase::Drawing { .. }) {
                    self.calibration.begin_calibration(start);
                }
                self.calibration.complete_calibration(end)?;
                Ok(None)
            }
            ToolOutcome::Rejected(e) => Err(e.into()),
        }
    }

    fn commit_shape(&mut self, shape: AnnotationShape) -> Result<Option<Annotation>> {
        let input = NewAnnotation {
            plan_id: self.key.plan_id.clone(),
            project_id: self.key.project_id.clone(),
            shape,
            style: self.style.clone(),
            layer: Some(self.active_layer.clone()),
        };
        self.create_annotation(input)
    }

    // --- Annotations ---

    /// Create an annotation and record it in history
    ///
    /// Returns `Ok(None)` when the target layer is locked.
    pub fn create_annotation(&mut self, input: NewAnnotation) -> Result<Option<Annotation>> {
        self.ensure_editable()?;
        self.ensure_same_plan(&input)?;
        self.layers.ensure(input.layer_name());

        let ctx = CreateContext {
            calibration: self.calibration.calibration(),
            dimensions: self.plan.dimensions,
            layers: &self.layers,
        };
        let Some(annotation) = self.store.create(input, ctx)? else {
            return Ok(None);
        };

        self.history.record_create(annotation.clone());
        let result = self.repos.annotations.save(&annotation);
        self.persisted(PersistenceOperation::SaveAnnotation(annotation.id()), result);
        Ok(Some(annotation))
    }

    /// Delete an annotation and record it in history
    ///
    /// Unknown ids are a silent no-op.
    pub fn delete_annotation(&mut self, id: AnnotationId) -> Result<Option<Annotation>> {
        self.ensure_editable()?;
        let Some(annotation) = self.store.delete(id) else {
            return Ok(None);
        };

        self.history.record_delete(annotation.clone());
        self.delete_persisted(id);
        Ok(Some(annotation))
    }

    /// Inputs must address the plan and project this session is bound to
    fn ensure_same_plan(&self, input: &NewAnnotation) -> Result<()> {
        if input.plan_id != self.key.plan_id || input.project_id != self.key.project_id {
            return Err(Error::PlanMismatch {
                expected: format!("{}/{}", self.key.project_id, self.key.plan_id),
                found: format!("{}/{}", input.project_id, input.plan_id),
            });
        }
        Ok(())
    }

    /// Replace an annotation as a delete followed by a create
    ///
    /// Records two history entries. Nothing changes when the old id is
    /// unknown, the new input targets a locked layer, or the new input is
    /// invalid.
    pub fn replace_annotation(
        &mut self,
        id: AnnotationId,
        input: NewAnnotation,
    ) -> Result<Option<Annotation>> {
        self.ensure_editable()?;
        self.ensure_same_plan(&input)?;
        if !self.store.contains(id) || self.layers.is_locked(input.layer_name()) {
            return Ok(None);
        }
        if !(input.style.stroke_width > 0.0) {
            return Err(AnnotationError::InvalidStrokeWidth(input.style.stroke_width).into());
        }
        measure_shape(&input.shape, self.calibration.calibration(), self.plan.dimensions)?;

        self.delete_annotation(id)?;
        self.create_annotation(input)
    }

    /// Delete every annotation and wipe history
    ///
    /// Irreversible: nothing is recorded for undo.
    pub fn clear_all(&mut self) -> Result<usize> {
        self.ensure_editable()?;
        let removed = self.store.clear_all();
        self.history.clear_history();
        self.tools.cancel();

        let result = self.repos.annotations.clear(&self.key.plan_id);
        self.persisted(PersistenceOperation::ClearAnnotations, result);
        tracing::info!(plan_id = %self.key.plan_id, removed = removed.len(), "annotations cleared");
        Ok(removed.len())
    }

    /// Every annotation in render order, hidden layers included
    pub fn all_annotations(&self) -> &[Annotation] {
        self.store.annotations()
    }

    pub fn annotation(&self, id: AnnotationId) -> Option<&Annotation> {
        self.store.get(id)
    }

    /// Annotations to render
    ///
    /// Annotations are not scoped to plan revisions and pass through the
    /// version overlay unchanged.
    pub fn visible_annotations(&self) -> Vec<&Annotation> {
        self.layers.filter(self.store.annotations())
    }

    /// Topmost visible annotation under a pointer position
    pub fn annotation_at(&self, pixel: Pixel, rect: &ContentRect, tolerance: f64) -> Option<&Annotation> {
        self.store.hit_test(pixel, rect, tolerance, &self.layers)
    }

    /// Formatted measurement label of an annotation
    pub fn measurement_label(&self, annotation: &Annotation) -> Option<String> {
        annotation
            .measurement()
            .map(|m| m.label(self.config.label_precision))
    }

    /// Measurement totals over visible annotations
    pub fn summary(&self) -> Vec<SummaryRow> {
        summarize(self.visible_annotations())
    }

    // --- History ---

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    /// Undo the last action; `false` when there was nothing to undo
    pub fn undo(&mut self) -> Result<bool> {
        self.ensure_editable()?;
        let Some(action) = self.history.undo() else {
            return Ok(false);
        };
        self.replay(&action.invert());
        Ok(true)
    }

    /// Redo the next action; `false` when there was nothing to redo
    pub fn redo(&mut self) -> Result<bool> {
        self.ensure_editable()?;
        let Some(action) = self.history.redo() else {
            return Ok(false);
        };
        self.replay(&action);
        Ok(true)
    }

    /// Rewind until timeline entry `index` is the newest applied action
    ///
    /// Returns the number of actions undone.
    pub fn undo_to_index(&mut self, index: usize) -> Result<usize> {
        self.ensure_editable()?;
        let actions = self.history.undo_to_index(index);
        for action in &actions {
            self.replay(&action.invert());
        }
        Ok(actions.len())
    }

    /// Fast-forward until timeline entry `index` is the newest applied action
    ///
    /// Returns the number of actions redone.
    pub fn redo_to_index(&mut self, index: usize) -> Result<usize> {
        self.ensure_editable()?;
        let actions = self.history.redo_to_index(index);
        for action in &actions {
            self.replay(action);
        }
        Ok(actions.len())
    }

    /// Apply an action to the store and mirror it to persistence
    fn replay(&mut self, action: &HistoryAction) {
        action.apply(&mut self.store);
        match action {
            HistoryAction::Create(annotation) => {
                let result = self.repos.annotations.save(annotation);
                self.persisted(PersistenceOperation::SaveAnnotation(annotation.id()), result);
            }
            HistoryAction::Delete(annotation) => {
                self.delete_persisted(annotation.id());
            }
        }
    }

    // --- Calibration ---

    pub fn calibration(&self) -> Option<&ScaleCalibration> {
        self.calibration.calibration()
    }

    pub fn calibration_phase(&self) -> CalibrationPhase {
        self.calibration.phase()
    }

    /// Pixel length of the drawn reference line awaiting confirmation
    pub fn pending_calibration_length(&self) -> Option<f64> {
        self.calibration.pending_pixel_length()
    }

    /// Confirm the drawn reference line with its real-world length
    ///
    /// Enables the measurement tools and returns to `Select`.
    pub fn confirm_calibration(
        &mut self,
        reference_length: f64,
        unit: MeasurementUnit,
    ) -> Result<ScaleCalibration> {
        self.ensure_editable()?;
        let calibration = self.calibration.confirm(reference_length, unit)?.clone();
        self.tools.set_calibrated(true);
        self.tools.exit_drawing();

        let result = self
            .repos
            .calibrations
            .save(&self.key.plan_id, &calibration.to_record());
        self.persisted(PersistenceOperation::SaveCalibration, result);
        Ok(calibration)
    }

    /// Abandon a reference line in progress or awaiting confirmation
    pub fn cancel_calibration(&mut self) {
        self.calibration.cancel();
        if self.tools.tool() == Tool::Calibrate {
            self.tools.exit_drawing();
        }
    }

    /// Remove the calibration
    ///
    /// Measurement tools are disabled; existing measurements keep their
    /// frozen values.
    pub fn clear_calibration(&mut self) -> Result<Option<ScaleCalibration>> {
        self.ensure_editable()?;
        let removed = self.calibration.clear();
        self.tools.set_calibrated(false);
        if removed.is_some() {
            tracing::info!(plan_id = %self.key.plan_id, "calibration cleared");
            let result = self.repos.calibrations.clear(&self.key.plan_id);
            self.persisted(PersistenceOperation::ClearCalibration, result);
        }
        Ok(removed)
    }

    // --- Layers ---

    pub fn layers(&self) -> &[Layer] {
        self.layers.layers()
    }

    pub fn set_layer_visible(&mut self, name: &str, visible: bool) {
        self.layers.set_visible(name, visible);
    }

    pub fn set_layer_locked(&mut self, name: &str, locked: bool) {
        self.layers.set_locked(name, locked);
    }

    // --- Pins ---

    /// Install pins loaded by the host
    pub fn load_pins(&mut self, pins: Vec<Pin>) {
        self.pins = pins;
    }

    /// Every pin of the plan, regardless of the viewed revision
    pub fn pins(&self) -> &[Pin] {
        &self.pins
    }

    /// Pins to render for the viewed revision
    pub fn visible_pins(&self) -> Vec<&Pin> {
        self.overlay.visible_pins(&self.pins)
    }

    /// Drop a pin at a pointer position
    pub fn place_pin(&mut self, pixel: Pixel, rect: &ContentRect, draft: PinDraft) -> Result<Pin> {
        self.place_pin_at(to_percent(pixel, rect), draft)
    }

    /// Drop a pin at a percentage position
    pub fn place_pin_at(&mut self, position: Percent, draft: PinDraft) -> Result<Pin> {
        self.ensure_editable()?;
        let pin = Pin::place(self.key.plan_id.clone(), position, draft);
        tracing::debug!(plan_id = %self.key.plan_id, pin_id = %pin.id, "pin placed");
        self.pins.push(pin.clone());
        Ok(pin)
    }

    pub fn remove_pin(&mut self, id: PinId) -> Result<Option<Pin>> {
        self.ensure_editable()?;
        let Some(index) = self.pins.iter().position(|p| p.id == id) else {
            return Ok(None);
        };
        Ok(Some(self.pins.remove(index)))
    }

    /// Write the visible pins as CSV
    pub fn export_pins_csv<W: Write>(&self, writer: W) -> Result<()> {
        export_pins_csv(writer, &self.visible_pins(), &CsvExportConfig::default())?;
        Ok(())
    }

    // --- Versions ---

    pub fn overlay(&self) -> &VersionOverlay {
        &self.overlay
    }

    /// Switch the viewed plan revision
    ///
    /// Viewing a historical revision drops any gesture and returns to
    /// `Select`.
    pub fn view_version(&mut self, version: u32) {
        self.overlay.view(version);
        if self.overlay.is_historical() {
            self.exit_drawing();
        }
        tracing::debug!(
            plan_id = %self.key.plan_id,
            viewed = version,
            current = self.overlay.current_version(),
            "viewing plan version"
        );
    }

    /// A new revision became current
    pub fn set_current_version(&mut self, version: u32) {
        self.overlay.set_current(version);
        self.plan.current_version = version;
        if self.overlay.is_historical() {
            self.exit_drawing();
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.overlay.is_historical()
    }

    fn ensure_editable(&self) -> Result<()> {
        if self.overlay.is_historical() {
            return Err(Error::ReadOnlyVersion {
                viewed: self.overlay.viewed_version(),
                current: self.overlay.current_version(),
            });
        }
        Ok(())
    }

    // --- Persistence outcomes ---

    /// Take queued persistence outcomes, oldest first
    pub fn drain_notices(&mut self) -> Vec<PersistenceNotice> {
        std::mem::take(&mut self.notices)
    }

    fn persisted<T>(&mut self, operation: PersistenceOperation, result: PersistenceResult<T>) {
        if let Err(e) = &result {
            tracing::warn!(
                plan_id = %self.key.plan_id,
                %operation,
                error = %e,
                "persistence failed, keeping local state"
            );
        }
        self.notices.push(PersistenceNotice::from_result(operation, &result));
    }

    fn delete_persisted(&mut self, id: AnnotationId) {
        let operation = PersistenceOperation::DeleteAnnotation(id);
        let result = self.repos.annotations.delete(&self.key.plan_id, id);
        match &result {
            Ok(DeleteOutcome::NotFound) => {
                tracing::warn!(
                    plan_id = %self.key.plan_id,
                    %operation,
                    "repository had no such annotation"
                );
                self.notices.push(PersistenceNotice::from_delete(operation, &result));
            }
            _ => self.persisted(operation, result),
        }
    }

    /// Everything needed to reproduce this session's markup offline
    pub fn snapshot(&self) -> PlanSnapshot {
        PlanSnapshot {
            plan_id: self.key.plan_id.clone(),
            project_id: self.key.project_id.clone(),
            dimensions: self.plan.dimensions,
            calibration: self.calibration.calibration().map(ScaleCalibration::to_record),
            annotations: self.store.annotations().to_vec(),
            pins: self.pins.clone(),
        }
    }
}

impl ExportHandle for MarkupSession {
    fn exportable_element(&self) -> PlanSurface {
        PlanSurface {
            plan_id: self.key.plan_id.clone(),
            file_url: self.plan.file_url.clone(),
            dimensions: self.plan.dimensions,
        }
    }

    fn annotations(&self) -> Vec<&Annotation> {
        self.visible_annotations()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::AnnotationKind;
    use crate::measurement::MeasurementError;

    fn rect() -> ContentRect {
        ContentRect::natural(PlanDimensions::new(1000.0, 1000.0))
    }

    fn open(repo: &MemoryRepository) -> MarkupSession {
        MarkupSession::open(
            SessionKey::new("plan-1", "project-1"),
            EngineConfig::default(),
            PlanInfo::new(PlanDimensions::new(1000.0, 1000.0)).with_version(2),
            Repositories::memory(repo.clone()),
        )
        .unwrap()
    }

    fn drag(session: &mut MarkupSession, from: (f64, f64), to: (f64, f64)) -> Option<Annotation> {
        session.pointer_down(Pixel::new(from.0, from.1), &rect()).unwrap();
        session.pointer_move(Pixel::new(to.0, to.1), &rect());
        session.pointer_up(Pixel::new(to.0, to.1), &rect()).unwrap()
    }

    fn calibrate(session: &mut MarkupSession) {
        session.select_tool(Tool::Calibrate).unwrap();
        drag(session, (0.0, 0.0), (100.0, 0.0));
        session.confirm_calibration(10.0, MeasurementUnit::Feet).unwrap();
    }

    #[test]
    fn test_drag_creates_and_persists() {
        let repo = MemoryRepository::new();
        let mut session = open(&repo);
        session.select_tool(Tool::Draw(AnnotationKind::Arrow)).unwrap();

        let created = drag(&mut session, (100.0, 100.0), (300.0, 200.0)).unwrap();
        assert_eq!(created.shape().start(), Percent::new(10.0, 10.0));
        assert_eq!(created.shape().end(), Some(Percent::new(30.0, 20.0)));
        assert_eq!(created.layer(), "default");
        assert_eq!(session.history().undo_count(), 1);
        assert_eq!(repo.annotation_count("plan-1"), 1);
        assert_eq!(
            session.drain_notices(),
            vec![PersistenceNotice::Succeeded(PersistenceOperation::SaveAnnotation(created.id()))]
        );
        assert!(session.drain_notices().is_empty());
    }

    #[test]
    fn test_calibration_flow_enables_measurements() {
        let repo = MemoryRepository::new();
        let mut session = open(&repo);
        assert!(session
            .select_tool(Tool::Draw(AnnotationKind::MeasureDistance))
            .is_err());

        calibrate(&mut session);
        assert_eq!(session.tool(), Tool::Select);
        assert!((session.calibration().unwrap().pixels_per_unit() - 10.0).abs() < 1e-9);

        session.select_tool(Tool::Draw(AnnotationKind::MeasureDistance)).unwrap();
        let measured = drag(&mut session, (200.0, 200.0), (250.0, 200.0)).unwrap();
        assert_eq!(session.measurement_label(&measured).as_deref(), Some("5.00 ft"));

        // Reopening restores the persisted calibration
        let reopened = open(&repo);
        assert!(reopened.calibration().is_some());
        assert_eq!(reopened.all_annotations().len(), 1);
    }

    #[test]
    fn test_clear_calibration_keeps_frozen_values() {
        let repo = MemoryRepository::new();
        let mut session = open(&repo);
        calibrate(&mut session);
        session.select_tool(Tool::Draw(AnnotationKind::MeasureDistance)).unwrap();
        let measured = drag(&mut session, (0.0, 0.0), (50.0, 0.0)).unwrap();

        session.clear_calibration().unwrap();
        assert_eq!(session.tool(), Tool::Select);
        assert!(session.calibration().is_none());
        let kept = session.annotation(measured.id()).unwrap();
        assert_eq!(kept.measurement(), measured.measurement());
    }

    #[test]
    fn test_zero_length_calibration_line_is_discarded() {
        let repo = MemoryRepository::new();
        let mut session = open(&repo);
        session.select_tool(Tool::Calibrate).unwrap();
        drag(&mut session, (10.0, 10.0), (10.0, 10.0));
        assert_eq!(session.calibration_phase(), CalibrationPhase::Idle);
        assert!(session.confirm_calibration(10.0, MeasurementUnit::Feet).is_err());
    }

    #[test]
    fn test_polygon_shortcut_and_rejection() {
        let repo = MemoryRepository::new();
        let mut session = open(&repo);
        calibrate(&mut session);
        session.select_tool(Tool::Draw(AnnotationKind::MeasureArea)).unwrap();

        for (x, y) in [(0.0, 0.0), (100.0, 0.0)] {
            session.pointer_down(Pixel::new(x, y), &rect()).unwrap();
            session.pointer_up(Pixel::new(x, y), &rect()).unwrap();
        }
        assert!(matches!(
            session.handle_shortcut(Shortcut::Enter),
            Err(Error::Measurement(MeasurementError::TooFewPoints(2)))
        ));

        session.pointer_down(Pixel::new(100.0, 50.0), &rect()).unwrap();
        session.pointer_down(Pixel::new(0.0, 50.0), &rect()).unwrap();
        let area = session.double_click().unwrap().unwrap();
        let m = area.measurement().unwrap();
        assert!((m.value - 50.0).abs() < 1e-9);
        assert_eq!(m.unit, "ft²");
    }

    #[test]
    fn test_undo_shortcut_requires_drawing_mode() {
        let repo = MemoryRepository::new();
        let mut session = open(&repo);
        session.select_tool(Tool::Draw(AnnotationKind::Line)).unwrap();
        drag(&mut session, (0.0, 0.0), (100.0, 100.0));

        session.exit_drawing();
        session.handle_shortcut(Shortcut::Undo).unwrap();
        assert_eq!(session.all_annotations().len(), 1);

        session.select_tool(Tool::Draw(AnnotationKind::Line)).unwrap();
        session.handle_shortcut(Shortcut::Undo).unwrap();
        assert!(session.all_annotations().is_empty());
        session.handle_shortcut(Shortcut::Redo).unwrap();
        assert_eq!(session.all_annotations().len(), 1);
    }

    #[test]
    fn test_escape_cancels_then_exits() {
        let repo = MemoryRepository::new();
        let mut session = open(&repo);
        session.select_tool(Tool::Draw(AnnotationKind::Rectangle)).unwrap();
        session.pointer_down(Pixel::new(10.0, 10.0), &rect()).unwrap();

        session.handle_shortcut(Shortcut::Escape).unwrap();
        assert!(session.preview().is_none());
        assert!(session.is_drawing());
        assert_eq!(session.pointer_up(Pixel::new(90.0, 90.0), &rect()).unwrap(), None);

        session.handle_shortcut(Shortcut::Escape).unwrap();
        assert!(!session.is_drawing());
    }

    #[test]
    fn test_text_entry_via_enter() {
        let repo = MemoryRepository::new();
        let mut session = open(&repo);
        session.select_tool(Tool::Draw(AnnotationKind::Text)).unwrap();
        session.pointer_down(Pixel::new(500.0, 250.0), &rect()).unwrap();
        session.text_input("Verify slab depth");
        let text = session.handle_shortcut(Shortcut::Enter).unwrap().unwrap();
        assert_eq!(text.shape().text(), Some("Verify slab depth"));
        assert_eq!(text.shape().start(), Percent::new(50.0, 25.0));
    }

    #[test]
    fn test_replace_records_two_entries() {
        let repo = MemoryRepository::new();
        let mut session = open(&repo);
        session.select_tool(Tool::Draw(AnnotationKind::Line)).unwrap();
        let original = drag(&mut session, (0.0, 0.0), (100.0, 0.0)).unwrap();

        let mut input = original.to_input();
        input.shape = AnnotationShape::Line {
            start: Percent::new(0.0, 0.0),
            end: Percent::new(20.0, 0.0),
        };
        let replacement = session.replace_annotation(original.id(), input).unwrap().unwrap();
        assert_ne!(replacement.id(), original.id());
        assert_eq!(session.history().undo_count(), 3);
        assert_eq!(session.all_annotations().len(), 1);

        session.undo().unwrap();
        session.undo().unwrap();
        assert_eq!(session.all_annotations(), &[original]);
    }

    #[test]
    fn test_replace_onto_locked_layer_changes_nothing() {
        let repo = MemoryRepository::new();
        let mut session = open(&repo);
        session.select_tool(Tool::Draw(AnnotationKind::Line)).unwrap();
        let original = drag(&mut session, (0.0, 0.0), (100.0, 0.0)).unwrap();

        session.set_layer_locked("frozen", true);
        let input = original.to_input().on_layer("frozen");
        assert_eq!(session.replace_annotation(original.id(), input).unwrap(), None);
        assert!(session.annotation(original.id()).is_some());
        assert_eq!(session.history().undo_count(), 1);
    }

    #[test]
    fn test_clear_all_wipes_history() {
        let repo = MemoryRepository::new();
        let mut session = open(&repo);
        session.select_tool(Tool::Draw(AnnotationKind::Line)).unwrap();
        drag(&mut session, (0.0, 0.0), (100.0, 0.0));
        drag(&mut session, (0.0, 10.0), (100.0, 10.0));

        assert_eq!(session.clear_all().unwrap(), 2);
        assert!(session.all_annotations().is_empty());
        assert!(session.history().is_empty());
        assert!(!session.undo().unwrap());
        assert_eq!(repo.annotation_count("plan-1"), 0);
    }

    #[test]
    fn test_failed_persistence_keeps_local_state() {
        let repo = MemoryRepository::new();
        let mut session = open(&repo);
        repo.set_fail_writes(true).unwrap();

        session.select_tool(Tool::Draw(AnnotationKind::Line)).unwrap();
        let created = drag(&mut session, (0.0, 0.0), (100.0, 0.0)).unwrap();
        assert!(session.annotation(created.id()).is_some());

        let notices = session.drain_notices();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].is_failure());
        assert_eq!(repo.annotation_count("plan-1"), 0);
    }

    #[test]
    fn test_input_for_another_plan_is_rejected() {
        let repo = MemoryRepository::new();
        let mut session = open(&repo);
        let shape = AnnotationShape::Line {
            start: Percent::new(0.0, 0.0),
            end: Percent::new(50.0, 50.0),
        };

        let foreign = NewAnnotation::new("plan-2", "project-1", shape.clone());
        assert!(matches!(
            session.create_annotation(foreign),
            Err(Error::PlanMismatch { .. })
        ));
        let other_project = NewAnnotation::new("plan-1", "project-9", shape.clone());
        assert!(session.create_annotation(other_project).is_err());

        assert!(session.all_annotations().is_empty());
        assert!(session.history().is_empty());
        assert_eq!(repo.annotation_count("plan-2"), 0);
        assert!(session.drain_notices().is_empty());

        let own = session
            .create_annotation(NewAnnotation::new("plan-1", "project-1", shape.clone()))
            .unwrap()
            .unwrap();
        let foreign = NewAnnotation::new("plan-2", "project-1", shape);
        assert!(session.replace_annotation(own.id(), foreign).is_err());
        assert!(session.annotation(own.id()).is_some());
    }

    #[test]
    fn test_delete_missing_from_repository_is_reported() {
        let repo = MemoryRepository::new();
        let mut session = open(&repo);
        session.select_tool(Tool::Draw(AnnotationKind::Line)).unwrap();
        let line = drag(&mut session, (0.0, 0.0), (100.0, 0.0)).unwrap();
        session.drain_notices();

        AnnotationRepository::clear(&repo, "plan-1").unwrap();
        session.delete_annotation(line.id()).unwrap();

        let op = PersistenceOperation::DeleteAnnotation(line.id());
        assert_eq!(session.drain_notices(), vec![PersistenceNotice::NotFound(op)]);

        // Undo re-saves, redo then deletes a row that exists again
        session.undo().unwrap();
        session.redo().unwrap();
        let notices = session.drain_notices();
        assert_eq!(notices.last(), Some(&PersistenceNotice::Succeeded(op)));
        assert!(notices.iter().all(|n| !n.is_failure()));
    }

    #[test]
    fn test_historical_version_is_read_only() {
        let repo = MemoryRepository::new();
        let mut session = open(&repo);
        session
            .place_pin_at(Percent::new(40.0, 40.0), PinDraft::new("Leak"))
            .unwrap();
        session.select_tool(Tool::Draw(AnnotationKind::Line)).unwrap();
        let line = drag(&mut session, (0.0, 0.0), (100.0, 0.0)).unwrap();

        session.view_version(1);
        assert!(session.is_read_only());
        assert_eq!(session.tool(), Tool::Select);
        assert!(session.visible_pins().is_empty());
        assert_eq!(session.visible_annotations().len(), 1);

        assert!(matches!(
            session.select_tool(Tool::Draw(AnnotationKind::Line)),
            Err(Error::ReadOnlyVersion { viewed: 1, current: 2 })
        ));
        assert!(session.delete_annotation(line.id()).is_err());
        assert!(session.undo().is_err());
        assert!(session
            .place_pin_at(Percent::new(1.0, 1.0), PinDraft::new("x"))
            .is_err());

        let mut csv = Vec::new();
        session.export_pins_csv(&mut csv).unwrap();
        assert_eq!(String::from_utf8(csv).unwrap().lines().count(), 1);

        session.view_version(2);
        assert_eq!(session.visible_pins().len(), 1);
    }

    #[test]
    fn test_layers_filter_rendering_and_summary() {
        let repo = MemoryRepository::new();
        let mut session = open(&repo);
        calibrate(&mut session);
        session.select_tool(Tool::Draw(AnnotationKind::MeasureDistance)).unwrap();
        drag(&mut session, (0.0, 0.0), (50.0, 0.0));
        session.set_active_layer("mep");
        drag(&mut session, (0.0, 10.0), (100.0, 10.0));

        assert_eq!(session.summary()[0].count, 2);
        session.set_layer_visible("mep", false);
        assert_eq!(session.visible_annotations().len(), 1);
        let summary = session.summary();
        assert_eq!(summary[0].count, 1);
        assert!((summary[0].total - 5.0).abs() < 1e-9);
        assert_eq!(ExportHandle::annotations(&session).len(), 1);
        assert_eq!(session.all_annotations().len(), 2);
    }

    #[test]
    fn test_hit_test_through_session() {
        let repo = MemoryRepository::new();
        let mut session = open(&repo);
        session.select_tool(Tool::Draw(AnnotationKind::Line)).unwrap();
        let line = drag(&mut session, (0.0, 500.0), (1000.0, 500.0)).unwrap();

        // Same spot on a zoomed viewport
        let zoomed = ContentRect::new(50.0, 20.0, 2000.0, 2000.0);
        let hit = session.annotation_at(Pixel::new(1050.0, 1022.0), &zoomed, 4.0);
        assert_eq!(hit.map(Annotation::id), Some(line.id()));
        assert!(session.annotation_at(Pixel::new(1050.0, 1100.0), &zoomed, 4.0).is_none());
    }

    #[test]
    fn test_export_handle_surface() {
        let repo = MemoryRepository::new();
        let session = MarkupSession::open(
            SessionKey::new("A-101", "tower"),
            EngineConfig::default(),
            PlanInfo::new(PlanDimensions::new(2400.0, 1800.0)).with_file_url("https://files/a101.pdf"),
            Repositories::memory(repo),
        )
        .unwrap();
        let surface = session.exportable_element();
        assert_eq!(surface.plan_id, "A-101");
        assert_eq!(surface.file_url.as_deref(), Some("https://files/a101.pdf"));
        assert_eq!(surface.dimensions, PlanDimensions::new(2400.0, 1800.0));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let repo = MemoryRepository::new();
        let mut session = open(&repo);
        calibrate(&mut session);
        session
            .place_pin_at(Percent::new(10.0, 90.0), PinDraft::new("Door"))
            .unwrap();

        let snapshot = session.snapshot();
        let json = snapshot.to_json().unwrap();
        let back = PlanSnapshot::from_json(&json).unwrap();
        assert_eq!(back, snapshot);
        assert_eq!(back.pins.len(), 1);
        assert!(back.calibration.is_some());
    }
}
