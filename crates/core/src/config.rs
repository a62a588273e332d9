//! Engine configuration
//!
//! Defaults for new annotations and session behavior. Configuration can be
//! loaded from a TOML file, environment variables, or created
//! programmatically.

use crate::annotation::{AnnotationStyle, Color, DEFAULT_LAYER};
use std::fs;
use std::io;
use std::path::Path;

/// Configuration for a markup session
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Layer new annotations land on
    pub default_layer: String,
    /// Stroke color for new annotations, `#rrggbb` or `#rrggbbaa`
    pub default_color: String,
    /// Stroke width for new annotations
    pub default_stroke_width: f64,
    /// Minimum spacing between freehand samples, in percent of the sheet
    pub freehand_min_step: f64,
    /// Maximum number of undoable actions, unbounded when absent
    pub history_limit: Option<usize>,
    /// Decimal places in measurement labels
    pub label_precision: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_layer: DEFAULT_LAYER.to_string(),
            default_color: Color::RED.to_hex(),
            default_stroke_width: 2.0,
            freehand_min_step: 0.25,
            history_limit: None,
            label_precision: 2,
        }
    }
}

impl EngineConfig {
    pub fn with_default_layer(mut self, layer: impl Into<String>) -> Self {
        self.default_layer = layer.into();
        self
    }

    pub fn with_default_color(mut self, color: Color) -> Self {
        self.default_color = color.to_hex();
        self
    }

    pub fn with_stroke_width(mut self, width: f64) -> Self {
        self.default_stroke_width = width;
        self
    }

    pub fn with_freehand_min_step(mut self, step: f64) -> Self {
        self.freehand_min_step = step;
        self
    }

    pub fn with_history_limit(mut self, limit: Option<usize>) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_label_precision(mut self, precision: usize) -> Self {
        self.label_precision = precision;
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PLANMARK_DEFAULT_LAYER`: layer for new annotations (default: "default")
    /// - `PLANMARK_DEFAULT_COLOR`: hex stroke color (default: "#ff0000")
    /// - `PLANMARK_STROKE_WIDTH`: stroke width (default: 2)
    /// - `PLANMARK_FREEHAND_MIN_STEP`: freehand sample spacing (default: 0.25)
    /// - `PLANMARK_HISTORY_LIMIT`: undo depth, `none` for unbounded
    /// - `PLANMARK_LABEL_PRECISION`: label decimal places (default: 2)
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PLANMARK_DEFAULT_LAYER") {
            config.default_layer = val;
        }

        if let Ok(val) = std::env::var("PLANMARK_DEFAULT_COLOR") {
            config.default_color = val;
        }

        if let Ok(val) = std::env::var("PLANMARK_STROKE_WIDTH") {
            config.default_stroke_width = parse_env("PLANMARK_STROKE_WIDTH", &val)?;
        }

        if let Ok(val) = std::env::var("PLANMARK_FREEHAND_MIN_STEP") {
            config.freehand_min_step = parse_env("PLANMARK_FREEHAND_MIN_STEP", &val)?;
        }

        if let Ok(val) = std::env::var("PLANMARK_HISTORY_LIMIT") {
            config.history_limit = if val.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(parse_env("PLANMARK_HISTORY_LIMIT", &val)?)
            };
        }

        if let Ok(val) = std::env::var("PLANMARK_LABEL_PRECISION") {
            config.label_precision = parse_env("PLANMARK_LABEL_PRECISION", &val)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// Expected file format (every key optional):
    /// ```toml
    /// default_layer = "markup"
    /// default_color = "#0000ff"
    /// default_stroke_width = 3.0
    /// freehand_min_step = 0.5
    /// history_limit = 200
    /// label_precision = 1
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let toml = self.to_toml()?;
        fs::write(path.as_ref(), toml).map_err(ConfigError::Io)
    }

    /// Converts configuration to TOML format.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every value is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_layer.trim().is_empty() {
            return Err(ConfigError::InvalidValue("default_layer".to_string()));
        }
        if Color::from_hex(&self.default_color).is_err() {
            return Err(ConfigError::InvalidValue("default_color".to_string()));
        }
        if !(self.default_stroke_width > 0.0) || !self.default_stroke_width.is_finite() {
            return Err(ConfigError::InvalidValue("default_stroke_width".to_string()));
        }
        if !(self.freehand_min_step >= 0.0) || !self.freehand_min_step.is_finite() {
            return Err(ConfigError::InvalidValue("freehand_min_step".to_string()));
        }
        if self.history_limit == Some(0) {
            return Err(ConfigError::InvalidValue("history_limit".to_string()));
        }
        Ok(())
    }

    /// Style applied to new annotations
    pub fn default_style(&self) -> Result<AnnotationStyle, ConfigError> {
        let color = Color::from_hex(&self.default_color)
            .map_err(|_| ConfigError::InvalidValue("default_color".to_string()))?;
        Ok(AnnotationStyle::new(color, self.default_stroke_width))
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid value for a configuration parameter
    #[error("Invalid value for configuration key: {0}")]
    InvalidValue(String),

    /// I/O error reading or writing configuration file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
