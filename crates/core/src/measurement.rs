//! Measurement calculation
//!
//! Distance and area measurements derived from the active scale
//! calibration. Geometry arrives in percentage space and is converted to
//! unscaled content pixels before any math, so results do not depend on
//! how the plan is currently zoomed.
//!
//! Values are computed once, when the annotation is created, and frozen on
//! it. Changing or clearing the calibration later never rewrites them.

use crate::annotation::{AnnotationError, AnnotationKind, AnnotationShape, Annotation};
use crate::calibration::{MeasurementUnit, ScaleCalibration};
use crate::coordinate::{to_pixel, ContentRect, Percent, Pixel, PlanDimensions};
use std::collections::BTreeMap;

/// A derived real-world measurement
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Measurement {
    /// Value in real-world units (squared units for areas)
    pub value: f64,
    /// Unit symbol, e.g. "ft" or "ft²"
    pub unit: String,
}

impl Measurement {
    /// Format as a label, e.g. `"12.50 ft"`
    pub fn label(&self, precision: usize) -> String {
        format!("{:.*} {}", precision, self.value, self.unit)
    }
}

/// Errors raised by the measurement calculator
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeasurementError {
    #[error("an area needs at least 3 points, got {0}")]
    TooFewPoints(usize),
}

/// Polygon area in squared pixels using the Shoelace formula
///
/// Self-intersecting polygons still produce a magnitude, which may not
/// match what the outline looks like.
pub fn shoelace_area(points: &[Pixel]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let twice_area: f64 = (0..n)
        .map(|i| {
            let j = (i + 1) % n;
            points[i].x * points[j].y - points[j].x * points[i].y
        })
        .sum();
    (twice_area / 2.0).abs()
}

/// Distance between two unscaled content pixels at `pixels_per_unit`
pub fn distance_from_pixels(
    start: Pixel,
    end: Pixel,
    pixels_per_unit: f64,
    unit: MeasurementUnit,
) -> Measurement {
    Measurement {
        value: start.distance_to(&end) / pixels_per_unit,
        unit: unit.symbol().to_string(),
    }
}

/// Polygon area over unscaled content pixels at `pixels_per_unit`
pub fn area_from_pixels(
    points: &[Pixel],
    pixels_per_unit: f64,
    unit: MeasurementUnit,
) -> Result<Measurement, MeasurementError> {
    if points.len() < 3 {
        return Err(MeasurementError::TooFewPoints(points.len()));
    }
    Ok(Measurement {
        value: shoelace_area(points) / (pixels_per_unit * pixels_per_unit),
        unit: unit.area_symbol(),
    })
}

/// Distance between two points in real-world units
pub fn measure_distance(
    start: Percent,
    end: Percent,
    calibration: &ScaleCalibration,
    dimensions: PlanDimensions,
) -> Measurement {
    let rect = ContentRect::natural(dimensions);
    distance_from_pixels(
        to_pixel(start, &rect),
        to_pixel(end, &rect),
        calibration.pixels_per_unit(),
        calibration.unit(),
    )
}

/// Area enclosed by a polygon in squared real-world units
pub fn measure_area(
    points: &[Percent],
    calibration: &ScaleCalibration,
    dimensions: PlanDimensions,
) -> Result<Measurement, MeasurementError> {
    let rect = ContentRect::natural(dimensions);
    let pixels: Vec<Pixel> = points.iter().map(|p| to_pixel(*p, &rect)).collect();
    area_from_pixels(&pixels, calibration.pixels_per_unit(), calibration.unit())
}

/// Derive the measurement for a shape about to be created
///
/// Returns `Ok(None)` for shapes that are not measurements. Measurement
/// shapes need a calibration.
pub fn measure_shape(
    shape: &AnnotationShape,
    calibration: Option<&ScaleCalibration>,
    dimensions: PlanDimensions,
) -> Result<Option<Measurement>, AnnotationError> {
    match shape {
        AnnotationShape::MeasureDistance { start, end } => {
            let calibration =
                calibration.ok_or(AnnotationError::CalibrationRequired(shape.kind()))?;
            Ok(Some(measure_distance(*start, *end, calibration, dimensions)))
        }
        AnnotationShape::MeasureArea { points } => {
            if points.len() < 3 {
                return Err(MeasurementError::TooFewPoints(points.len()).into());
            }
            let calibration =
                calibration.ok_or(AnnotationError::CalibrationRequired(shape.kind()))?;
            Ok(Some(measure_area(points, calibration, dimensions)?))
        }
        AnnotationShape::Line { .. }
        | AnnotationShape::Arrow { .. }
        | AnnotationShape::Rectangle { .. }
        | AnnotationShape::Text { .. }
        | AnnotationShape::Freehand { .. } => Ok(None),
    }
}

/// Midpoint of a segment, where a distance label sits
pub fn midpoint(start: Percent, end: Percent) -> Percent {
    Percent::new((start.x + end.x) / 2.0, (start.y + end.y) / 2.0)
}

/// Vertex centroid of a polygon, where an area label sits
pub fn centroid(points: &[Percent]) -> Option<Percent> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let sum_x: f64 = points.iter().map(|p| p.x).sum();
    let sum_y: f64 = points.iter().map(|p| p.y).sum();
    Some(Percent::new(sum_x / n, sum_y / n))
}

/// Where the measurement label of an annotation should be placed
pub fn label_position(shape: &AnnotationShape) -> Option<Percent> {
    match shape {
        AnnotationShape::MeasureDistance { start, end } => Some(midpoint(*start, *end)),
        AnnotationShape::MeasureArea { points } => centroid(points),
        _ => None,
    }
}

/// Aggregate of measurements sharing a kind and unit
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub kind: AnnotationKind,
    pub unit: String,
    pub count: usize,
    pub total: f64,
}

/// Totals per (kind, unit) over the given annotations
///
/// Callers pass the layer-filtered set so hidden layers do not count.
/// Annotations without a frozen measurement are skipped.
pub fn summarize<'a, I>(annotations: I) -> Vec<SummaryRow>
where
    I: IntoIterator<Item = &'a Annotation>,
{
    let mut rows: BTreeMap<(AnnotationKind, String), (usize, f64)> = BTreeMap::new();
    for annotation in annotations {
        if let Some(m) = annotation.measurement() {
            let entry = rows
                .entry((annotation.kind(), m.unit.clone()))
                .or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += m.value;
        }
    }
    rows.into_iter()
        .map(|((kind, unit), (count, total))| SummaryRow {
            kind,
            unit,
            count,
            total,
        })
        .collect()
}
