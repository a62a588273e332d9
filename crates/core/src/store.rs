//! Annotation store
//!
//! Ordered collection of committed annotations for one plan. Insertion
//! order is render order. `create`/`delete` are the user-facing operations;
//! `insert`/`remove` are the raw primitives history replay goes through.

use crate::annotation::{Annotation, AnnotationError, AnnotationId, NewAnnotation};
use crate::calibration::ScaleCalibration;
use crate::coordinate::{ContentRect, Pixel, PlanDimensions};
use crate::history::ApplyTarget;
use crate::layer::LayerRegistry;
use crate::measurement::measure_shape;
use std::collections::HashMap;

/// What `create` needs from its surroundings
#[derive(Debug, Clone, Copy)]
pub struct CreateContext<'a> {
    /// Active calibration, required for measurement kinds
    pub calibration: Option<&'a ScaleCalibration>,
    /// Natural content size the measurement math runs in
    pub dimensions: PlanDimensions,
    /// Lock state of the target layer is read from here
    pub layers: &'a LayerRegistry,
}

/// In-memory annotation collection
#[derive(Debug, Clone, Default)]
pub struct AnnotationStore {
    annotations: Vec<Annotation>,
    /// Index each removed annotation had, so re-inserting restores its
    /// render position
    removed_at: HashMap<AnnotationId, usize>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with previously persisted annotations
    pub fn with_annotations(annotations: Vec<Annotation>) -> Self {
        Self {
            annotations,
            removed_at: HashMap::new(),
        }
    }

    /// All annotations in render order
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id() == id)
    }

    pub fn contains(&self, id: AnnotationId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Create an annotation from user input
    ///
    /// Derives and freezes the measurement for measurement kinds. Returns
    /// `Ok(None)` without touching the store when the target layer is
    /// locked.
    pub fn create(
        &mut self,
        input: NewAnnotation,
        ctx: CreateContext<'_>,
    ) -> Result<Option<Annotation>, AnnotationError> {
        if ctx.layers.is_locked(input.layer_name()) {
            tracing::debug!(
                layer = input.layer_name(),
                kind = %input.shape.kind(),
                "create rejected on locked layer"
            );
            return Ok(None);
        }

        if !(input.style.stroke_width > 0.0) {
            return Err(AnnotationError::InvalidStrokeWidth(input.style.stroke_width));
        }

        let measurement = measure_shape(&input.shape, ctx.calibration, ctx.dimensions)?;
        let annotation = Annotation::from_input(input, measurement);
        tracing::debug!(
            annotation_id = %annotation.id(),
            kind = %annotation.kind(),
            layer = annotation.layer(),
            "annotation created"
        );
        self.annotations.push(annotation.clone());
        Ok(Some(annotation))
    }

    /// Delete an annotation by id; absent ids are a no-op
    pub fn delete(&mut self, id: AnnotationId) -> Option<Annotation> {
        let removed = self.remove(id);
        if removed.is_some() {
            tracing::debug!(annotation_id = %id, "annotation deleted");
        }
        removed
    }

    /// Remove every annotation, returning what was removed
    pub fn clear_all(&mut self) -> Vec<Annotation> {
        self.removed_at.clear();
        std::mem::take(&mut self.annotations)
    }

    /// Topmost annotation under a pixel position
    ///
    /// Only annotations on layers the registry reports visible are
    /// considered.
    pub fn hit_test(
        &self,
        point: Pixel,
        rect: &ContentRect,
        tolerance: f64,
        layers: &LayerRegistry,
    ) -> Option<&Annotation> {
        layers
            .filter(&self.annotations)
            .into_iter()
            .rev()
            .find(|a| a.shape().hit_test(point, rect, tolerance))
    }
}

impl ApplyTarget for AnnotationStore {
    /// Re-insert with the same id and content
    ///
    /// A previously removed annotation goes back to the index it was removed
    /// from; anything else is appended. An annotation already present under
    /// that id is replaced in place.
    fn insert(&mut self, annotation: Annotation) {
        let id = annotation.id();
        if let Some(existing) = self.annotations.iter_mut().find(|a| a.id() == id) {
            *existing = annotation;
            return;
        }
        match self.removed_at.remove(&id) {
            Some(index) => {
                let index = index.min(self.annotations.len());
                self.annotations.insert(index, annotation);
            }
            None => self.annotations.push(annotation),
        }
    }

    fn remove(&mut self, id: AnnotationId) -> Option<Annotation> {
        let index = self.annotations.iter().position(|a| a.id() == id)?;
        self.removed_at.insert(id, index);
        Some(self.annotations.remove(index))
    }
}
