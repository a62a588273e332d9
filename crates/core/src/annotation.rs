//! Annotation data model
//!
//! Annotations are drawn markups owned by a plan. Geometry is a closed sum
//! type with one variant per annotation type and is stored in percentage
//! space. The flat [`AnnotationRecord`] is the shape exchanged with the
//! persistence collaborator.

use crate::coordinate::{to_pixel, ContentRect, Percent, Pixel};
use crate::measurement::{Measurement, MeasurementError};
use chrono::{DateTime, Utc};
use std::fmt;

/// Unique identifier for an annotation
///
/// Generated locally at creation time so history replay and the optimistic
/// persistence hand-off agree on identity.
pub type AnnotationId = uuid::Uuid;

/// Layer every annotation lands on unless told otherwise
pub const DEFAULT_LAYER: &str = "default";

/// Annotation type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    Line,
    Arrow,
    Rectangle,
    Text,
    Freehand,
    MeasureDistance,
    MeasureArea,
}

impl AnnotationKind {
    /// Whether annotations of this kind carry a derived measurement
    pub fn is_measurement(self) -> bool {
        matches!(
            self,
            AnnotationKind::MeasureDistance | AnnotationKind::MeasureArea
        )
    }

    /// Wire name of the kind
    pub fn as_str(self) -> &'static str {
        match self {
            AnnotationKind::Line => "line",
            AnnotationKind::Arrow => "arrow",
            AnnotationKind::Rectangle => "rectangle",
            AnnotationKind::Text => "text",
            AnnotationKind::Freehand => "freehand",
            AnnotationKind::MeasureDistance => "measure_distance",
            AnnotationKind::MeasureArea => "measure_area",
        }
    }
}

impl fmt::Display for AnnotationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// Create an opaque color
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse `#rrggbb` or `#rrggbbaa`
    pub fn from_hex(hex: &str) -> Result<Self, AnnotationError> {
        let invalid = || AnnotationError::InvalidColor(hex.to_string());
        let digits = hex.strip_prefix('#').ok_or_else(invalid)?;
        if !digits.is_ascii() || !(digits.len() == 6 || digits.len() == 8) {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| invalid());
        Ok(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
            a: if digits.len() == 8 { channel(6)? } else { 255 },
        })
    }

    /// Format as lowercase `#rrggbb`, appending alpha only when translucent
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl Color {
    pub const RED: Color = Color { r: 255, g: 0, b: 0, a: 255 };
    pub const BLUE: Color = Color { r: 0, g: 0, b: 255, a: 255 };
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0, a: 255 };
}

/// Visual styling of an annotation
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationStyle {
    /// Stroke (and text) color
    pub color: Color,
    /// Stroke width in screen pixels at natural size
    pub stroke_width: f64,
}

impl AnnotationStyle {
    pub fn new(color: Color, stroke_width: f64) -> Self {
        Self {
            color,
            stroke_width,
        }
    }
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self::new(Color::RED, 2.0)
    }
}

/// Geometry of an annotation, one variant per annotation type
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationShape {
    Line { start: Percent, end: Percent },
    Arrow { start: Percent, end: Percent },
    Rectangle { start: Percent, end: Percent },
    Text { position: Percent, content: String },
    Freehand { points: Vec<Percent> },
    MeasureDistance { start: Percent, end: Percent },
    MeasureArea { points: Vec<Percent> },
}

impl AnnotationShape {
    /// Type tag of this shape
    pub fn kind(&self) -> AnnotationKind {
        match self {
            AnnotationShape::Line { .. } => AnnotationKind::Line,
            AnnotationShape::Arrow { .. } => AnnotationKind::Arrow,
            AnnotationShape::Rectangle { .. } => AnnotationKind::Rectangle,
            AnnotationShape::Text { .. } => AnnotationKind::Text,
            AnnotationShape::Freehand { .. } => AnnotationKind::Freehand,
            AnnotationShape::MeasureDistance { .. } => AnnotationKind::MeasureDistance,
            AnnotationShape::MeasureArea { .. } => AnnotationKind::MeasureArea,
        }
    }

    /// Anchor point; the first path point for path shapes
    pub fn start(&self) -> Percent {
        match self {
            AnnotationShape::Line { start, .. }
            | AnnotationShape::Arrow { start, .. }
            | AnnotationShape::Rectangle { start, .. }
            | AnnotationShape::MeasureDistance { start, .. } => *start,
            AnnotationShape::Text { position, .. } => *position,
            AnnotationShape::Freehand { points } | AnnotationShape::MeasureArea { points } => {
                points.first().copied().unwrap_or_default()
            }
        }
    }

    /// End point for two-point shapes
    pub fn end(&self) -> Option<Percent> {
        match self {
            AnnotationShape::Line { end, .. }
            | AnnotationShape::Arrow { end, .. }
            | AnnotationShape::Rectangle { end, .. }
            | AnnotationShape::MeasureDistance { end, .. } => Some(*end),
            AnnotationShape::Text { .. }
            | AnnotationShape::Freehand { .. }
            | AnnotationShape::MeasureArea { .. } => None,
        }
    }

    /// Path points for freehand and area shapes
    pub fn path_points(&self) -> Option<&[Percent]> {
        match self {
            AnnotationShape::Freehand { points } | AnnotationShape::MeasureArea { points } => {
                Some(points)
            }
            _ => None,
        }
    }

    /// Text content for text shapes
    pub fn text(&self) -> Option<&str> {
        match self {
            AnnotationShape::Text { content, .. } => Some(content),
            _ => None,
        }
    }

    /// Bounding box as (min, max) percentages
    pub fn bounding_box(&self) -> (Percent, Percent) {
        match self {
            AnnotationShape::Line { start, end }
            | AnnotationShape::Arrow { start, end }
            | AnnotationShape::Rectangle { start, end }
            | AnnotationShape::MeasureDistance { start, end } => (
                Percent::new(start.x.min(end.x), start.y.min(end.y)),
                Percent::new(start.x.max(end.x), start.y.max(end.y)),
            ),
            AnnotationShape::Text { position, .. } => (*position, *position),
            AnnotationShape::Freehand { points } | AnnotationShape::MeasureArea { points } => {
                let Some(first) = points.first() else {
                    return (Percent::default(), Percent::default());
                };
                points.iter().skip(1).fold((*first, *first), |(min, max), p| {
                    (
                        Percent::new(min.x.min(p.x), min.y.min(p.y)),
                        Percent::new(max.x.max(p.x), max.y.max(p.y)),
                    )
                })
            }
        }
    }

    /// Check whether a pixel position touches this shape
    ///
    /// `rect` is the content box the pixel position was taken in and
    /// `tolerance` is in the same pixels.
    pub fn hit_test(&self, point: Pixel, rect: &ContentRect, tolerance: f64) -> bool {
        let px = |p: &Percent| to_pixel(*p, rect);
        match self {
            AnnotationShape::Line { start, end }
            | AnnotationShape::Arrow { start, end }
            | AnnotationShape::MeasureDistance { start, end } => {
                point_near_segment(point, px(start), px(end), tolerance)
            }
            AnnotationShape::Rectangle { start, end } => {
                let (a, b) = (px(start), px(end));
                point.x >= a.x.min(b.x) - tolerance
                    && point.x <= a.x.max(b.x) + tolerance
                    && point.y >= a.y.min(b.y) - tolerance
                    && point.y <= a.y.max(b.y) + tolerance
            }
            AnnotationShape::Text { position, content } => {
                // Conservative estimate, actual extent depends on the renderer
                let anchor = px(position);
                let width = (content.chars().count() as f64 * 8.0).max(20.0);
                point.x >= anchor.x - tolerance
                    && point.x <= anchor.x + width + tolerance
                    && point.y >= anchor.y - tolerance
                    && point.y <= anchor.y + 20.0 + tolerance
            }
            AnnotationShape::Freehand { points } => points
                .windows(2)
                .any(|w| point_near_segment(point, px(&w[0]), px(&w[1]), tolerance)),
            AnnotationShape::MeasureArea { points } => {
                let n = points.len();
                (0..n).any(|i| {
                    point_near_segment(point, px(&points[i]), px(&points[(i + 1) % n]), tolerance)
                })
            }
        }
    }
}

/// Point-to-segment distance check in pixel space
fn point_near_segment(point: Pixel, start: Pixel, end: Pixel, tolerance: f64) -> bool {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let length_sq = dx * dx + dy * dy;

    if length_sq < 1e-12 {
        return point.distance_to(&start) <= tolerance;
    }

    let t = (((point.x - start.x) * dx + (point.y - start.y) * dy) / length_sq).clamp(0.0, 1.0);
    let closest = Pixel::new(start.x + t * dx, start.y + t * dy);
    point.distance_to(&closest) <= tolerance
}

/// Errors raised by annotation construction and conversion
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnnotationError {
    #[error("a calibration is required to create a {0} annotation")]
    CalibrationRequired(AnnotationKind),

    #[error(transparent)]
    Measurement(#[from] MeasurementError),

    #[error("invalid color: {0}")]
    InvalidColor(String),

    #[error("stroke width must be positive, got {0}")]
    InvalidStrokeWidth(f64),

    #[error("invalid annotation record: {0}")]
    InvalidRecord(String),
}

/// Input for creating an annotation
///
/// Carries everything the user controls. Identity, timestamps and the
/// measurement fields are filled in by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAnnotation {
    pub plan_id: String,
    pub project_id: String,
    pub shape: AnnotationShape,
    pub style: AnnotationStyle,
    /// Target layer, [`DEFAULT_LAYER`] when `None`
    pub layer: Option<String>,
}

impl NewAnnotation {
    pub fn new(plan_id: impl Into<String>, project_id: impl Into<String>, shape: AnnotationShape) -> Self {
        Self {
            plan_id: plan_id.into(),
            project_id: project_id.into(),
            shape,
            style: AnnotationStyle::default(),
            layer: None,
        }
    }

    pub fn with_style(mut self, style: AnnotationStyle) -> Self {
        self.style = style;
        self
    }

    pub fn on_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = Some(layer.into());
        self
    }

    /// Layer this input targets
    pub fn layer_name(&self) -> &str {
        self.layer.as_deref().unwrap_or(DEFAULT_LAYER)
    }
}

/// A committed annotation
///
/// Immutable once created: edits are modelled as delete + create so every
/// change has a symmetric history entry.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(into = "AnnotationRecord", try_from = "AnnotationRecord")]
pub struct Annotation {
    id: AnnotationId,
    plan_id: String,
    project_id: String,
    shape: AnnotationShape,
    style: AnnotationStyle,
    layer: String,
    measurement: Option<Measurement>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Annotation {
    /// Build an annotation from validated input and its derived measurement
    pub(crate) fn from_input(input: NewAnnotation, measurement: Option<Measurement>) -> Self {
        let now = Utc::now();
        let layer = input.layer_name().to_string();
        Self {
            id: AnnotationId::new_v4(),
            plan_id: input.plan_id,
            project_id: input.project_id,
            shape: input.shape,
            style: input.style,
            layer,
            measurement,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> AnnotationId {
        self.id
    }

    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn kind(&self) -> AnnotationKind {
        self.shape.kind()
    }

    pub fn shape(&self) -> &AnnotationShape {
        &self.shape
    }

    pub fn style(&self) -> &AnnotationStyle {
        &self.style
    }

    pub fn layer(&self) -> &str {
        &self.layer
    }

    /// Measurement frozen at creation time
    pub fn measurement(&self) -> Option<&Measurement> {
        self.measurement.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Input that recreates this annotation with the same user-controlled fields
    pub fn to_input(&self) -> NewAnnotation {
        NewAnnotation {
            plan_id: self.plan_id.clone(),
            project_id: self.project_id.clone(),
            shape: self.shape.clone(),
            style: self.style.clone(),
            layer: Some(self.layer.clone()),
        }
    }
}

/// Flat annotation shape exchanged with the persistence collaborator
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnnotationRecord {
    pub id: AnnotationId,
    pub plan_id: String,
    pub project_id: String,
    pub annotation_type: AnnotationKind,
    pub start_x: f64,
    pub start_y: f64,
    #[serde(default)]
    pub end_x: Option<f64>,
    #[serde(default)]
    pub end_y: Option<f64>,
    #[serde(default)]
    pub path_points: Option<Vec<Percent>>,
    #[serde(default)]
    pub text_content: Option<String>,
    pub color: String,
    pub stroke_width: f64,
    #[serde(default = "default_layer")]
    pub layer: String,
    #[serde(default)]
    pub measurement_value: Option<f64>,
    #[serde(default)]
    pub measurement_unit: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_layer() -> String {
    DEFAULT_LAYER.to_string()
}

impl From<Annotation> for AnnotationRecord {
    fn from(annotation: Annotation) -> Self {
        let annotation_type = annotation.shape.kind();
        let start = annotation.shape.start();
        let end = annotation.shape.end();
        let path_points = annotation.shape.path_points().map(<[Percent]>::to_vec);
        let (measurement_value, measurement_unit) = match annotation.measurement {
            Some(m) => (Some(m.value), Some(m.unit)),
            None => (None, None),
        };
        let text_content = match annotation.shape {
            AnnotationShape::Text { content, .. } => Some(content),
            _ => None,
        };

        Self {
            id: annotation.id,
            plan_id: annotation.plan_id,
            project_id: annotation.project_id,
            annotation_type,
            start_x: start.x,
            start_y: start.y,
            end_x: end.map(|p| p.x),
            end_y: end.map(|p| p.y),
            path_points,
            text_content,
            color: annotation.style.color.to_hex(),
            stroke_width: annotation.style.stroke_width,
            layer: annotation.layer,
            measurement_value,
            measurement_unit,
            created_at: annotation.created_at,
            updated_at: annotation.updated_at,
        }
    }
}

impl TryFrom<AnnotationRecord> for Annotation {
    type Error = AnnotationError;

    fn try_from(record: AnnotationRecord) -> Result<Self, Self::Error> {
        let invalid = |what: &str| {
            AnnotationError::InvalidRecord(format!("{} annotation {}", record.annotation_type, what))
        };
        let start = Percent::new(record.start_x, record.start_y);
        let end = match (record.end_x, record.end_y) {
            (Some(x), Some(y)) => Some(Percent::new(x, y)),
            _ => None,
        };

        let shape = match record.annotation_type {
            AnnotationKind::Line
            | AnnotationKind::Arrow
            | AnnotationKind::Rectangle
            | AnnotationKind::MeasureDistance => {
                let end = end.ok_or_else(|| invalid("is missing its end point"))?;
                match record.annotation_type {
                    AnnotationKind::Line => AnnotationShape::Line { start, end },
                    AnnotationKind::Arrow => AnnotationShape::Arrow { start, end },
                    AnnotationKind::Rectangle => AnnotationShape::Rectangle { start, end },
                    _ => AnnotationShape::MeasureDistance { start, end },
                }
            }
            AnnotationKind::Text => AnnotationShape::Text {
                position: start,
                content: record
                    .text_content
                    .clone()
                    .ok_or_else(|| invalid("is missing its text content"))?,
            },
            AnnotationKind::Freehand => {
                let points = record.path_points.clone().unwrap_or_default();
                if points.is_empty() {
                    return Err(invalid("has no path points"));
                }
                AnnotationShape::Freehand { points }
            }
            AnnotationKind::MeasureArea => {
                let points = record.path_points.clone().unwrap_or_default();
                if points.len() < 3 {
                    return Err(invalid("needs at least 3 path points"));
                }
                AnnotationShape::MeasureArea { points }
            }
        };

        if !(record.stroke_width > 0.0) {
            return Err(AnnotationError::InvalidStrokeWidth(record.stroke_width));
        }

        let measurement = match (record.measurement_value, record.measurement_unit) {
            (Some(value), Some(unit)) => Some(Measurement { value, unit }),
            _ => None,
        };

        Ok(Self {
            id: record.id,
            plan_id: record.plan_id,
            project_id: record.project_id,
            shape,
            style: AnnotationStyle::new(Color::from_hex(&record.color)?, record.stroke_width),
            layer: record.layer,
            measurement,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> AnnotationShape {
        AnnotationShape::Line {
            start: Percent::new(10.0, 20.0),
            end: Percent::new(50.0, 80.0),
        }
    }

    #[test]
    fn test_color_hex_round_trip() {
        let color = Color::from_hex("#FF8000").unwrap();
        assert_eq!(color, Color::rgb(255, 128, 0));
        assert_eq!(color.to_hex(), "#ff8000");

        let translucent = Color::from_hex("#00ff0080").unwrap();
        assert_eq!(translucent.a, 128);
        assert_eq!(translucent.to_hex(), "#00ff0080");

        assert!(Color::from_hex("red").is_err());
        assert!(Color::from_hex("#12345").is_err());
        assert!(Color::from_hex("#zzzzzz").is_err());
    }

    #[test]
    fn test_line_bounding_box() {
        let (min, max) = line().bounding_box();
        assert_eq!(min, Percent::new(10.0, 20.0));
        assert_eq!(max, Percent::new(50.0, 80.0));
    }

    #[test]
    fn test_shape_accessors() {
        let area = AnnotationShape::MeasureArea {
            points: vec![
                Percent::new(1.0, 1.0),
                Percent::new(5.0, 1.0),
                Percent::new(5.0, 5.0),
            ],
        };
        assert_eq!(area.kind(), AnnotationKind::MeasureArea);
        assert_eq!(area.start(), Percent::new(1.0, 1.0));
        assert_eq!(area.end(), None);
        assert_eq!(area.path_points().map(<[Percent]>::len), Some(3));
        assert!(area.kind().is_measurement());
        assert!(!AnnotationKind::Freehand.is_measurement());
    }

    #[test]
    fn test_hit_testing() {
        let rect = ContentRect::new(0.0, 0.0, 1000.0, 1000.0);
        let shape = AnnotationShape::Line {
            start: Percent::new(0.0, 0.0),
            end: Percent::new(10.0, 0.0),
        };
        assert!(shape.hit_test(Pixel::new(50.0, 3.0), &rect, 5.0));
        assert!(!shape.hit_test(Pixel::new(50.0, 30.0), &rect, 5.0));
        assert!(!shape.hit_test(Pixel::new(150.0, 0.0), &rect, 5.0));
    }

    #[test]
    fn test_record_round_trip() {
        let input = NewAnnotation::new("plan-1", "project-1", line())
            .with_style(AnnotationStyle::new(Color::BLUE, 3.0))
            .on_layer("structural");
        let annotation = Annotation::from_input(input, None);

        let json = serde_json::to_value(&annotation).unwrap();
        assert_eq!(json["annotation_type"], "line");
        assert_eq!(json["end_x"], 50.0);
        assert_eq!(json["color"], "#0000ff");
        assert_eq!(json["layer"], "structural");
        assert!(json["measurement_value"].is_null());

        let back: Annotation = serde_json::from_value(json).unwrap();
        assert_eq!(back, annotation);
    }

    #[test]
    fn test_measurement_fields_in_record() {
        let shape = AnnotationShape::MeasureDistance {
            start: Percent::new(0.0, 0.0),
            end: Percent::new(5.0, 0.0),
        };
        let measurement = Measurement {
            value: 5.0,
            unit: "ft".to_string(),
        };
        let annotation = Annotation::from_input(NewAnnotation::new("p", "q", shape), Some(measurement));
        let record = AnnotationRecord::from(annotation);
        assert_eq!(record.annotation_type, AnnotationKind::MeasureDistance);
        assert_eq!(record.measurement_value, Some(5.0));
        assert_eq!(record.measurement_unit.as_deref(), Some("ft"));
        assert_eq!(record.layer, DEFAULT_LAYER);
    }

    #[test]
    fn test_record_missing_end_is_rejected() {
        let annotation = Annotation::from_input(NewAnnotation::new("p", "q", line()), None);
        let mut record = AnnotationRecord::from(annotation);
        record.end_x = None;
        assert!(matches!(
            Annotation::try_from(record),
            Err(AnnotationError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_record_short_area_is_rejected() {
        let annotation = Annotation::from_input(NewAnnotation::new("p", "q", line()), None);
        let mut record = AnnotationRecord::from(annotation);
        record.annotation_type = AnnotationKind::MeasureArea;
        record.path_points = Some(vec![Percent::new(0.0, 0.0), Percent::new(1.0, 1.0)]);
        assert!(Annotation::try_from(record).is_err());
    }

    #[test]
    fn test_layer_defaults_when_absent() {
        let json = serde_json::json!({
            "id": AnnotationId::new_v4(),
            "plan_id": "p",
            "project_id": "q",
            "annotation_type": "text",
            "start_x": 12.0,
            "start_y": 34.0,
            "text_content": "Check beam",
            "color": "#000000",
            "stroke_width": 1.0,
            "created_at": "2024-03-01T12:00:00Z",
            "updated_at": "2024-03-01T12:00:00Z"
        });
        let annotation: Annotation = serde_json::from_value(json).unwrap();
        assert_eq!(annotation.layer(), DEFAULT_LAYER);
        assert_eq!(annotation.shape().text(), Some("Check beam"));
    }
}
