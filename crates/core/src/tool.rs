//! Tool and gesture state machine
//!
//! `Tool` is the user's intent; `Gesture` is the multi-step capture in
//! flight between pointer events. Pointer positions arrive already
//! normalized to percentage space. A finished gesture comes back as a
//! [`ToolOutcome`] for the session to commit; the machine itself never
//! touches the store.

use crate::annotation::{AnnotationKind, AnnotationShape};
use crate::coordinate::Percent;
use crate::measurement::MeasurementError;

/// Positions closer than this are treated as the same point
const SAME_POINT_EPSILON: f64 = 1e-9;

/// Active interaction mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    /// Pointer / selection, no drawing
    #[default]
    Select,
    /// Draw annotations of one kind
    Draw(AnnotationKind),
    /// Draw a calibration reference line
    Calibrate,
}

impl Tool {
    /// Whether this tool puts the session in drawing mode
    pub fn is_drawing(self) -> bool {
        !matches!(self, Tool::Select)
    }

    /// Whether this tool needs an active calibration
    pub fn requires_calibration(self) -> bool {
        matches!(self, Tool::Draw(kind) if kind.is_measurement())
    }
}

/// Result of feeding an event to the machine
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// Nothing to commit
    None,
    /// A finished shape ready to be created
    Commit(AnnotationShape),
    /// A finished reference line for the calibration manager
    CalibrationLine { start: Percent, end: Percent },
    /// The gesture cannot finish yet; its buffer is kept
    Rejected(MeasurementError),
}

/// Errors raised when changing tools
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    #[error("the {0} tool requires a scale calibration")]
    CalibrationRequired(AnnotationKind),
}

/// In-flight gesture buffers
#[derive(Debug, Clone, PartialEq, Default)]
enum Gesture {
    #[default]
    Idle,
    /// Two-point drag (line, arrow, rectangle, distance, calibration)
    Dragging { start: Percent, current: Percent },
    /// Freehand sampling while the pointer is held
    Sampling { points: Vec<Percent> },
    /// Area polygon built click by click
    Polygon { points: Vec<Percent> },
    /// Text entry anchored at a position
    TextEntry { position: Percent, buffer: String },
}

/// Tool selection plus gesture capture
#[derive(Debug, Clone)]
pub struct ToolMachine {
    tool: Tool,
    gesture: Gesture,
    calibrated: bool,
    /// Minimum spacing between freehand samples, in percent
    freehand_min_step: f64,
}

impl ToolMachine {
    pub fn new(freehand_min_step: f64) -> Self {
        Self {
            tool: Tool::Select,
            gesture: Gesture::Idle,
            calibrated: false,
            freehand_min_step,
        }
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Drawing mode is any tool but `Select`
    pub fn is_drawing(&self) -> bool {
        self.tool.is_drawing()
    }

    /// Whether a gesture is being captured
    pub fn has_pending_gesture(&self) -> bool {
        self.gesture != Gesture::Idle
    }

    /// Whether text entry is open
    pub fn is_entering_text(&self) -> bool {
        matches!(self.gesture, Gesture::TextEntry { .. })
    }

    /// Switch tools, discarding any gesture in progress
    pub fn select_tool(&mut self, tool: Tool) -> Result<(), ToolError> {
        if let Tool::Draw(kind) = tool {
            if kind.is_measurement() && !self.calibrated {
                return Err(ToolError::CalibrationRequired(kind));
            }
        }
        if tool != self.tool {
            self.cancel();
            self.tool = tool;
        }
        Ok(())
    }

    /// Track whether a calibration exists
    ///
    /// Losing the calibration while a measurement tool is active falls back
    /// to `Select`.
    pub fn set_calibrated(&mut self, calibrated: bool) {
        self.calibrated = calibrated;
        if !calibrated && self.tool.requires_calibration() {
            self.cancel();
            self.tool = Tool::Select;
        }
    }

    /// Leave drawing mode
    pub fn exit_drawing(&mut self) {
        self.cancel();
        self.tool = Tool::Select;
    }

    /// Drop the current gesture without committing
    pub fn cancel(&mut self) {
        self.gesture = Gesture::Idle;
    }

    pub fn pointer_down(&mut self, position: Percent) -> ToolOutcome {
        // A press outside an open text box blurs it
        if self.is_entering_text() {
            return self.confirm_text();
        }

        match self.tool {
            Tool::Select => ToolOutcome::None,
            Tool::Calibrate
            | Tool::Draw(
                AnnotationKind::Line
                | AnnotationKind::Arrow
                | AnnotationKind::Rectangle
                | AnnotationKind::MeasureDistance,
            ) => {
                self.gesture = Gesture::Dragging {
                    start: position,
                    current: position,
                };
                ToolOutcome::None
            }
            Tool::Draw(AnnotationKind::Freehand) => {
                self.gesture = Gesture::Sampling {
                    points: vec![position],
                };
                ToolOutcome::None
            }
            Tool::Draw(AnnotationKind::Text) => {
                self.gesture = Gesture::TextEntry {
                    position,
                    buffer: String::new(),
                };
                ToolOutcome::None
            }
            Tool::Draw(AnnotationKind::MeasureArea) => {
                match &mut self.gesture {
                    Gesture::Polygon { points } => {
                        let duplicate = points
                            .last()
                            .is_some_and(|last| last.approx_eq(&position, SAME_POINT_EPSILON));
                        if !duplicate {
                            points.push(position);
                        }
                    }
                    _ => {
                        self.gesture = Gesture::Polygon {
                            points: vec![position],
                        };
                    }
                }
                ToolOutcome::None
            }
        }
    }

    pub fn pointer_move(&mut self, position: Percent) {
        let min_step = self.freehand_min_step;
        match &mut self.gesture {
            Gesture::Dragging { current, .. } => *current = position,
            Gesture::Sampling { points } => {
                let far_enough = points
                    .last()
                    .map_or(true, |last| last.distance_to(&position) >= min_step);
                if far_enough {
                    points.push(position);
                }
            }
            Gesture::Idle | Gesture::Polygon { .. } | Gesture::TextEntry { .. } => {}
        }
    }

    pub fn pointer_up(&mut self, position: Percent) -> ToolOutcome {
        match std::mem::take(&mut self.gesture) {
            Gesture::Dragging { start, .. } => {
                if start.approx_eq(&position, SAME_POINT_EPSILON) {
                    return ToolOutcome::None;
                }
                self.finish_drag(start, position)
            }
            Gesture::Sampling { mut points } => {
                let far_enough = points
                    .last()
                    .map_or(true, |last| !last.approx_eq(&position, SAME_POINT_EPSILON));
                if far_enough {
                    points.push(position);
                }
                if points.len() < 2 {
                    return ToolOutcome::None;
                }
                ToolOutcome::Commit(AnnotationShape::Freehand { points })
            }
            // Multi-step gestures outlive the release
            other => {
                self.gesture = other;
                ToolOutcome::None
            }
        }
    }

    fn finish_drag(&self, start: Percent, end: Percent) -> ToolOutcome {
        let shape = match self.tool {
            Tool::Calibrate => return ToolOutcome::CalibrationLine { start, end },
            Tool::Draw(AnnotationKind::Line) => AnnotationShape::Line { start, end },
            Tool::Draw(AnnotationKind::Arrow) => AnnotationShape::Arrow { start, end },
            Tool::Draw(AnnotationKind::Rectangle) => AnnotationShape::Rectangle { start, end },
            Tool::Draw(AnnotationKind::MeasureDistance) => {
                AnnotationShape::MeasureDistance { start, end }
            }
            Tool::Select
            | Tool::Draw(
                AnnotationKind::Text | AnnotationKind::Freehand | AnnotationKind::MeasureArea,
            ) => return ToolOutcome::None,
        };
        ToolOutcome::Commit(shape)
    }

    /// Double-click closes an area polygon
    pub fn double_click(&mut self) -> ToolOutcome {
        self.close_polygon()
    }

    /// Finish the area polygon
    ///
    /// Fewer than 3 points is rejected and the points are kept so the user
    /// can keep clicking.
    pub fn close_polygon(&mut self) -> ToolOutcome {
        let Gesture::Polygon { points } = &self.gesture else {
            return ToolOutcome::None;
        };
        if points.len() < 3 {
            return ToolOutcome::Rejected(MeasurementError::TooFewPoints(points.len()));
        }
        match std::mem::take(&mut self.gesture) {
            Gesture::Polygon { points } => ToolOutcome::Commit(AnnotationShape::MeasureArea { points }),
            _ => ToolOutcome::None,
        }
    }

    /// Replace the text entry buffer
    pub fn text_input(&mut self, text: &str) {
        if let Gesture::TextEntry { buffer, .. } = &mut self.gesture {
            buffer.clear();
            buffer.push_str(text);
        }
    }

    /// Confirm (or blur) the text entry
    ///
    /// Blank text closes the entry without committing.
    pub fn confirm_text(&mut self) -> ToolOutcome {
        if !self.is_entering_text() {
            return ToolOutcome::None;
        }
        match std::mem::take(&mut self.gesture) {
            Gesture::TextEntry { position, buffer } if !buffer.trim().is_empty() => {
                ToolOutcome::Commit(AnnotationShape::Text {
                    position,
                    content: buffer,
                })
            }
            _ => ToolOutcome::None,
        }
    }

    /// Shape the in-flight gesture would commit right now, for rubber-banding
    pub fn preview(&self) -> Option<AnnotationShape> {
        match &self.gesture {
            Gesture::Idle => None,
            Gesture::Dragging { start, current } => match self.finish_drag(*start, *current) {
                ToolOutcome::Commit(shape) => Some(shape),
                _ => None,
            },
            Gesture::Sampling { points } => Some(AnnotationShape::Freehand {
                points: points.clone(),
            }),
            Gesture::Polygon { points } => Some(AnnotationShape::MeasureArea {
                points: points.clone(),
            }),
            Gesture::TextEntry { position, buffer } => Some(AnnotationShape::Text {
                position: *position,
                content: buffer.clone(),
            }),
        }
    }
}

impl Default for ToolMachine {
    fn default() -> Self {
        Self::new(0.25)
    }
}
