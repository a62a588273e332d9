//! CSV export for pins
//!
//! One row per pin handed in. Callers pass the pins currently visible
//! (the version overlay already applied), so a historical view exports an
//! empty sheet with just the header row.

use crate::pin::Pin;
use chrono::SecondsFormat;
use std::io::Write;

/// Error types for CSV export
#[derive(Debug, thiserror::Error)]
pub enum CsvExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),
}

pub type CsvExportResult<T> = Result<T, CsvExportError>;

/// Configuration for CSV export
#[derive(Debug, Clone)]
pub struct CsvExportConfig {
    /// Include column headers in the output
    pub include_headers: bool,

    /// CSV delimiter character
    pub delimiter: u8,
}

impl Default for CsvExportConfig {
    fn default() -> Self {
        Self {
            include_headers: true,
            delimiter: b',',
        }
    }
}

/// Column headers, in output order
pub const PIN_COLUMNS: [&str; 11] = [
    "Title",
    "Description",
    "Type",
    "Status",
    "Created By",
    "Assigned To",
    "Has RFI",
    "Photo Count",
    "X Position",
    "Y Position",
    "Created At",
];

/// Export pins to CSV format
///
/// Positions are percentages with two decimals; `Created At` is ISO-8601
/// UTC with milliseconds. Fields containing quotes, delimiters or newlines
/// are quoted with embedded quotes doubled.
pub fn export_pins_csv<W: Write>(
    writer: W,
    pins: &[&Pin],
    config: &CsvExportConfig,
) -> CsvExportResult<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(config.delimiter)
        .has_headers(config.include_headers)
        .from_writer(writer);

    if config.include_headers {
        csv_writer.write_record(PIN_COLUMNS)?;
    }

    for pin in pins {
        csv_writer.write_record(pin_row(pin))?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Export pins to an in-memory CSV string
pub fn pins_to_csv_string(pins: &[&Pin], config: &CsvExportConfig) -> CsvExportResult<String> {
    let mut output = Vec::new();
    export_pins_csv(&mut output, pins, config)?;
    String::from_utf8(output).map_err(|e| {
        CsvExportError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })
}

fn pin_row(pin: &Pin) -> [String; 11] {
    [
        pin.title.clone(),
        pin.description.clone(),
        pin.pin_type.clone(),
        pin.status.clone(),
        pin.created_by.clone().unwrap_or_default(),
        pin.assigned_to.clone().unwrap_or_default(),
        yes_no(pin.has_rfi()).to_string(),
        pin.photo_count.to_string(),
        format!("{:.2}", pin.x_position),
        format!("{:.2}", pin.y_position),
        pin.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    ]
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}
