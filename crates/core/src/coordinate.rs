//! Coordinate normalization
//!
//! Converts between screen pixels and the percentage space annotations and
//! pins are stored in. Percentages are relative to the content bounding box,
//! so a stored coordinate stays put regardless of zoom, pan or the
//! resolution the plan was rendered at.

/// Position as a percentage (0-100) of the content box
///
/// Origin is the top-left corner of the content, X grows to the right and
/// Y grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Percent {
    pub x: f64,
    pub y: f64,
}

impl Percent {
    /// Create a new percentage coordinate
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Clamp both axes into the 0-100 range
    pub fn clamped(self) -> Self {
        Self {
            x: self.x.clamp(0.0, 100.0),
            y: self.y.clamp(0.0, 100.0),
        }
    }

    /// Check whether both axes lie inside the content box
    pub fn is_inside(&self) -> bool {
        (0.0..=100.0).contains(&self.x) && (0.0..=100.0).contains(&self.y)
    }

    /// Compare two coordinates within a tolerance
    pub fn approx_eq(&self, other: &Percent, epsilon: f64) -> bool {
        (self.x - other.x).abs() <= epsilon && (self.y - other.y).abs() <= epsilon
    }

    /// Distance to another coordinate in percentage units
    ///
    /// Only meaningful for comparing nearby samples; real distances must go
    /// through pixels because the two axes usually have different lengths.
    pub fn distance_to(&self, other: &Percent) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Position in pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Pixel {
    pub x: f64,
    pub y: f64,
}

impl Pixel {
    /// Create a new pixel coordinate
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another pixel coordinate
    pub fn distance_to(&self, other: &Pixel) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Natural (unscaled) size of a plan sheet in content pixels
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlanDimensions {
    pub width: f64,
    pub height: f64,
}

impl PlanDimensions {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Bounding rectangle of the content in some pixel space
///
/// For pointer events this is the on-screen box after zoom and pan. For
/// measurements it is the unscaled box (see [`ContentRect::natural`]).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContentRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl ContentRect {
    /// Create a new content rectangle
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// The unscaled content box anchored at the origin
    pub fn natural(dimensions: PlanDimensions) -> Self {
        Self::new(0.0, 0.0, dimensions.width, dimensions.height)
    }

    fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// Zoom and pan state of the plan viewer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Zoom factor (1.0 = natural size)
    pub scale: f64,
    /// Horizontal offset of the content's left edge in screen pixels
    pub pan_x: f64,
    /// Vertical offset of the content's top edge in screen pixels
    pub pan_y: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            scale: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
        }
    }
}

impl Viewport {
    pub fn new(scale: f64, pan_x: f64, pan_y: f64) -> Self {
        Self {
            scale,
            pan_x,
            pan_y,
        }
    }

    /// On-screen bounding box of the transformed content
    pub fn content_rect(&self, dimensions: PlanDimensions) -> ContentRect {
        ContentRect::new(
            self.pan_x,
            self.pan_y,
            dimensions.width * self.scale,
            dimensions.height * self.scale,
        )
    }
}

/// Convert a pixel position to a percentage of the content box
///
/// A degenerate rectangle (zero or negative size) maps everything to the
/// origin rather than producing NaN or infinity.
pub fn to_percent(pixel: Pixel, rect: &ContentRect) -> Percent {
    if rect.is_degenerate() {
        return Percent::default();
    }
    Percent::new(
        (pixel.x - rect.left) / rect.width * 100.0,
        (pixel.y - rect.top) / rect.height * 100.0,
    )
}

/// Convert a percentage of the content box back to a pixel position
pub fn to_pixel(percent: Percent, rect: &ContentRect) -> Pixel {
    Pixel::new(
        rect.left + percent.x / 100.0 * rect.width,
        rect.top + percent.y / 100.0 * rect.height,
    )
}
