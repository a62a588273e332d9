//! Scale calibration
//!
//! Derives a pixels-per-unit factor from a reference line the user draws
//! over a dimension of known length. Pixel distances are always taken in
//! the unscaled content box, so the factor holds at every zoom level.

use crate::coordinate::{to_pixel, ContentRect, Percent, PlanDimensions};
use std::fmt;
use std::str::FromStr;

/// Real-world units a plan can be calibrated in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum MeasurementUnit {
    #[serde(rename = "m")]
    Meters,
    #[serde(rename = "ft")]
    Feet,
    #[serde(rename = "cm")]
    Centimeters,
    #[serde(rename = "mm")]
    Millimeters,
    #[serde(rename = "in")]
    Inches,
    #[serde(rename = "yd")]
    Yards,
}

impl MeasurementUnit {
    /// All units, in the order a unit picker cycles through them
    pub const ALL: [MeasurementUnit; 6] = [
        MeasurementUnit::Meters,
        MeasurementUnit::Feet,
        MeasurementUnit::Centimeters,
        MeasurementUnit::Millimeters,
        MeasurementUnit::Inches,
        MeasurementUnit::Yards,
    ];

    /// Short symbol used in labels and persisted records
    pub fn symbol(self) -> &'static str {
        match self {
            MeasurementUnit::Meters => "m",
            MeasurementUnit::Feet => "ft",
            MeasurementUnit::Centimeters => "cm",
            MeasurementUnit::Millimeters => "mm",
            MeasurementUnit::Inches => "in",
            MeasurementUnit::Yards => "yd",
        }
    }

    /// Symbol for the squared unit (e.g. "ft²")
    pub fn area_symbol(self) -> String {
        format!("{}²", self.symbol())
    }
}

impl fmt::Display for MeasurementUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for MeasurementUnit {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MeasurementUnit::ALL
            .into_iter()
            .find(|unit| unit.symbol().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CalibrationError::UnknownUnit(s.to_string()))
    }
}

/// Errors raised while calibrating
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalibrationError {
    #[error("reference length must be a positive number, got {0}")]
    InvalidReferenceLength(f64),

    #[error("reference line has zero length")]
    DegenerateReferenceLine,

    #[error("no reference line is being drawn")]
    NotDrawing,

    #[error("no reference line is awaiting confirmation")]
    NotPending,

    #[error("unknown measurement unit: {0}")]
    UnknownUnit(String),

    #[error("stored calibration has an invalid scale factor: {0}")]
    InvalidScale(f64),
}

/// Committed scale for one plan
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleCalibration {
    pixels_per_unit: f64,
    unit: MeasurementUnit,
    reference_length: f64,
    start: Percent,
    end: Percent,
}

impl ScaleCalibration {
    /// Calibrate from a reference line of known real-world length
    ///
    /// `reference_length` is validated before it is used as a divisor.
    pub fn from_reference_line(
        start: Percent,
        end: Percent,
        reference_length: f64,
        unit: MeasurementUnit,
        dimensions: PlanDimensions,
    ) -> Result<Self, CalibrationError> {
        if !reference_length.is_finite() || reference_length <= 0.0 {
            return Err(CalibrationError::InvalidReferenceLength(reference_length));
        }

        let rect = ContentRect::natural(dimensions);
        let pixel_distance = to_pixel(start, &rect).distance_to(&to_pixel(end, &rect));
        if !(pixel_distance > 0.0) {
            return Err(CalibrationError::DegenerateReferenceLine);
        }

        Ok(Self {
            pixels_per_unit: pixel_distance / reference_length,
            unit,
            reference_length,
            start,
            end,
        })
    }

    /// Pixels (unscaled content) per real-world unit
    pub fn pixels_per_unit(&self) -> f64 {
        self.pixels_per_unit
    }

    pub fn unit(&self) -> MeasurementUnit {
        self.unit
    }

    pub fn reference_length(&self) -> f64 {
        self.reference_length
    }

    /// Reference line endpoints
    pub fn reference_line(&self) -> (Percent, Percent) {
        (self.start, self.end)
    }

    /// Convert an unscaled pixel distance to real-world units
    pub fn to_real(&self, pixel_distance: f64) -> f64 {
        pixel_distance / self.pixels_per_unit
    }

    /// Convert a real-world distance to unscaled pixels
    pub fn to_pixels(&self, real_distance: f64) -> f64 {
        real_distance * self.pixels_per_unit
    }

    /// Persistence shape of this calibration
    pub fn to_record(&self) -> CalibrationRecord {
        CalibrationRecord {
            pixels_per_unit: self.pixels_per_unit,
            unit: self.unit,
            reference_length: self.reference_length,
            start_x: self.start.x,
            start_y: self.start.y,
            end_x: self.end.x,
            end_y: self.end.y,
        }
    }

    /// Rebuild a calibration from its persisted record
    ///
    /// The stored factor is trusted as-is so the calibration survives a
    /// change in render resolution, but it still has to be usable.
    pub fn from_record(record: &CalibrationRecord) -> Result<Self, CalibrationError> {
        if !record.pixels_per_unit.is_finite() || record.pixels_per_unit <= 0.0 {
            return Err(CalibrationError::InvalidScale(record.pixels_per_unit));
        }
        if !record.reference_length.is_finite() || record.reference_length <= 0.0 {
            return Err(CalibrationError::InvalidReferenceLength(record.reference_length));
        }
        Ok(Self {
            pixels_per_unit: record.pixels_per_unit,
            unit: record.unit,
            reference_length: record.reference_length,
            start: Percent::new(record.start_x, record.start_y),
            end: Percent::new(record.end_x, record.end_y),
        })
    }
}

/// Calibration as exchanged with the persistence collaborator
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationRecord {
    pub pixels_per_unit: f64,
    pub unit: MeasurementUnit,
    pub reference_length: f64,
    pub start_x: f64,
    pub start_y: f64,
    pub end_x: f64,
    pub end_y: f64,
}

/// Where the calibration workflow currently is
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationPhase {
    /// Nothing in progress
    Idle,
    /// Reference line started, waiting for release
    Drawing { start: Percent },
    /// Reference line drawn, waiting for length and unit
    PendingConfirmation { start: Percent, end: Percent },
}

/// Drives the draw-then-confirm calibration workflow for one plan
#[derive(Debug, Clone)]
pub struct CalibrationManager {
    dimensions: PlanDimensions,
    phase: CalibrationPhase,
    current: Option<ScaleCalibration>,
}

impl CalibrationManager {
    /// Create a manager with no calibration
    pub fn new(dimensions: PlanDimensions) -> Self {
        Self {
            dimensions,
            phase: CalibrationPhase::Idle,
            current: None,
        }
    }

    /// Install a calibration loaded from persistence
    pub fn restore(&mut self, calibration: ScaleCalibration) {
        self.current = Some(calibration);
    }

    /// The committed calibration, if any
    pub fn calibration(&self) -> Option<&ScaleCalibration> {
        self.current.as_ref()
    }

    /// Whether measurement tools may be used
    pub fn is_calibrated(&self) -> bool {
        self.current.is_some()
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    pub fn dimensions(&self) -> PlanDimensions {
        self.dimensions
    }

    /// Start drawing a reference line
    ///
    /// Restarting while a line is pending discards the old line.
    pub fn begin_calibration(&mut self, start: Percent) {
        self.phase = CalibrationPhase::Drawing { start };
    }

    /// Finish drawing the reference line
    pub fn complete_calibration(&mut self, end: Percent) -> Result<(), CalibrationError> {
        match self.phase {
            CalibrationPhase::Drawing { start } => {
                self.phase = CalibrationPhase::PendingConfirmation { start, end };
                Ok(())
            }
            _ => Err(CalibrationError::NotDrawing),
        }
    }

    /// Pixel length of the pending reference line in unscaled content
    pub fn pending_pixel_length(&self) -> Option<f64> {
        match self.phase {
            CalibrationPhase::PendingConfirmation { start, end } => {
                let rect = ContentRect::natural(self.dimensions);
                Some(to_pixel(start, &rect).distance_to(&to_pixel(end, &rect)))
            }
            _ => None,
        }
    }

    /// Commit the pending reference line with its real-world length
    ///
    /// On error the line stays pending so the user can correct the input.
    pub fn confirm(
        &mut self,
        reference_length: f64,
        unit: MeasurementUnit,
    ) -> Result<&ScaleCalibration, CalibrationError> {
        let CalibrationPhase::PendingConfirmation { start, end } = self.phase else {
            return Err(CalibrationError::NotPending);
        };

        let calibration = ScaleCalibration::from_reference_line(
            start,
            end,
            reference_length,
            unit,
            self.dimensions,
        )?;

        tracing::info!(
            pixels_per_unit = calibration.pixels_per_unit(),
            unit = %unit,
            "scale calibrated"
        );

        self.phase = CalibrationPhase::Idle;
        Ok(self.current.insert(calibration))
    }

    /// Abandon the workflow, keeping any existing calibration
    pub fn cancel(&mut self) {
        self.phase = CalibrationPhase::Idle;
    }

    /// Remove the calibration
    ///
    /// Existing measurement annotations keep their frozen values.
    pub fn clear(&mut self) -> Option<ScaleCalibration> {
        self.phase = CalibrationPhase::Idle;
        self.current.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> PlanDimensions {
        PlanDimensions::new(1000.0, 500.0)
    }

    #[test]
    fn test_reference_line_ratio() {
        // 10% of 1000px = 100px drawn over 10 ft
        let cal = ScaleCalibration::from_reference_line(
            Percent::new(0.0, 0.0),
            Percent::new(10.0, 0.0),
            10.0,
            MeasurementUnit::Feet,
            dims(),
        )
        .unwrap();
        assert!((cal.pixels_per_unit() - 10.0).abs() < 1e-9);
        assert_eq!(cal.unit().symbol(), "ft");
    }

    #[test]
    fn test_round_trip_reproduces_reference_length() {
        for (dx, dy, length) in [(10.0, 0.0, 10.0), (33.3, 71.2, 4.75), (0.5, 0.5, 1234.5)] {
            let start = Percent::new(5.0, 5.0);
            let end = Percent::new(5.0 + dx, 5.0 + dy);
            let cal = ScaleCalibration::from_reference_line(
                start,
                end,
                length,
                MeasurementUnit::Meters,
                dims(),
            )
            .unwrap();
            let rect = ContentRect::natural(dims());
            let d = to_pixel(start, &rect).distance_to(&to_pixel(end, &rect));
            assert!((cal.to_real(d) - length).abs() < 1e-9);
            assert!((cal.to_pixels(length) - d).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rejects_non_positive_length() {
        for bad in [0.0, -3.0, f64::NAN, f64::INFINITY] {
            let result = ScaleCalibration::from_reference_line(
                Percent::new(0.0, 0.0),
                Percent::new(10.0, 0.0),
                bad,
                MeasurementUnit::Feet,
                dims(),
            );
            assert!(matches!(
                result,
                Err(CalibrationError::InvalidReferenceLength(_))
            ));
        }
    }

    #[test]
    fn test_rejects_zero_length_line() {
        let p = Percent::new(40.0, 40.0);
        let result = ScaleCalibration::from_reference_line(p, p, 5.0, MeasurementUnit::Feet, dims());
        assert_eq!(result, Err(CalibrationError::DegenerateReferenceLine));
    }

    #[test]
    fn test_manager_workflow() {
        let mut manager = CalibrationManager::new(dims());
        assert!(!manager.is_calibrated());

        manager.begin_calibration(Percent::new(0.0, 0.0));
        manager.complete_calibration(Percent::new(10.0, 0.0)).unwrap();
        let length = manager.pending_pixel_length().unwrap();
        assert!((length - 100.0).abs() < 1e-9);

        let cal = manager.confirm(10.0, MeasurementUnit::Feet).unwrap();
        assert!((cal.pixels_per_unit() - 10.0).abs() < 1e-9);
        assert_eq!(manager.phase(), CalibrationPhase::Idle);
        assert!(manager.is_calibrated());
    }

    #[test]
    fn test_invalid_confirm_keeps_line_pending() {
        let mut manager = CalibrationManager::new(dims());
        manager.begin_calibration(Percent::new(0.0, 0.0));
        manager.complete_calibration(Percent::new(10.0, 0.0)).unwrap();

        assert!(manager.confirm(0.0, MeasurementUnit::Feet).is_err());
        assert!(matches!(
            manager.phase(),
            CalibrationPhase::PendingConfirmation { .. }
        ));
        assert!(!manager.is_calibrated());

        assert!(manager.confirm(2.0, MeasurementUnit::Feet).is_ok());
    }

    #[test]
    fn test_confirm_out_of_order() {
        let mut manager = CalibrationManager::new(dims());
        assert_eq!(
            manager.complete_calibration(Percent::new(1.0, 1.0)),
            Err(CalibrationError::NotDrawing)
        );
        assert_eq!(
            manager.confirm(1.0, MeasurementUnit::Feet).unwrap_err(),
            CalibrationError::NotPending
        );
    }

    #[test]
    fn test_cancel_and_clear() {
        let mut manager = CalibrationManager::new(dims());
        manager.begin_calibration(Percent::new(0.0, 0.0));
        manager.complete_calibration(Percent::new(10.0, 0.0)).unwrap();
        manager.confirm(10.0, MeasurementUnit::Feet).unwrap();

        manager.begin_calibration(Percent::new(50.0, 50.0));
        manager.cancel();
        assert!(manager.is_calibrated());

        let removed = manager.clear();
        assert!(removed.is_some());
        assert!(!manager.is_calibrated());
    }

    #[test]
    fn test_record_round_trip() {
        let cal = ScaleCalibration::from_reference_line(
            Percent::new(1.0, 2.0),
            Percent::new(30.0, 2.0),
            12.0,
            MeasurementUnit::Inches,
            dims(),
        )
        .unwrap();
        let json = serde_json::to_value(cal.to_record()).unwrap();
        assert_eq!(json["unit"], "in");
        assert!(json.get("pixelsPerUnit").is_some());
        assert!(json.get("referenceLength").is_some());

        let record: CalibrationRecord = serde_json::from_value(json).unwrap();
        assert_eq!(ScaleCalibration::from_record(&record).unwrap(), cal);
    }

    #[test]
    fn test_from_record_rejects_zero_scale() {
        let record = CalibrationRecord {
            pixels_per_unit: 0.0,
            unit: MeasurementUnit::Feet,
            reference_length: 1.0,
            start_x: 0.0,
            start_y: 0.0,
            end_x: 1.0,
            end_y: 0.0,
        };
        assert_eq!(
            ScaleCalibration::from_record(&record),
            Err(CalibrationError::InvalidScale(0.0))
        );
    }

    #[test]
    fn test_unit_parsing() {
        assert_eq!("FT".parse::<MeasurementUnit>().unwrap(), MeasurementUnit::Feet);
        assert_eq!(MeasurementUnit::Meters.area_symbol(), "m²");
        assert!("furlong".parse::<MeasurementUnit>().is_err());
    }
}
