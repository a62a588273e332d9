use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use planmark_core::{
    area_from_pixels, distance_from_pixels, export_pins_csv, summarize, CsvExportConfig,
    MeasurementUnit, Pixel, PlanSnapshot, ScaleCalibration,
};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "planmark-cli")]
#[command(about = "Planmark CLI")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Export the pins of a plan snapshot as CSV.
    PinsCsv {
        #[arg(value_name = "SNAPSHOT")]
        snapshot: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Measure a distance or an area from pixel points.
    Measure {
        #[arg(value_enum)]
        kind: MeasureKind,
        /// Unscaled content pixels per real-world unit.
        #[arg(long)]
        ppu: f64,
        #[arg(long, default_value = "ft")]
        unit: String,
        #[arg(long, default_value_t = 2)]
        precision: usize,
        /// Points as `x,y` pixel pairs.
        #[arg(value_name = "POINT", required = true, allow_hyphen_values = true)]
        points: Vec<String>,
    },
    /// Print machine-readable measurement totals of a plan snapshot.
    Summary {
        #[arg(value_name = "SNAPSHOT")]
        snapshot: PathBuf,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MeasureKind {
    Distance,
    Area,
}

#[derive(Debug, Serialize)]
struct SummaryOutput {
    plan_id: String,
    annotation_count: usize,
    pin_count: usize,
    calibrated: bool,
    measurements: Vec<SummaryRowOutput>,
}

#[derive(Debug, Serialize)]
struct SummaryRowOutput {
    kind: String,
    unit: String,
    count: usize,
    total: f64,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::PinsCsv { snapshot, output } => run_pins_csv(&snapshot, output.as_deref()),
        Commands::Measure { kind, ppu, unit, precision, points } => {
            run_measure(kind, ppu, &unit, precision, &points)
        }
        Commands::Summary { snapshot } => run_summary(&snapshot),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_pins_csv(snapshot: &Path, output: Option<&Path>) -> Result<()> {
    let snapshot = load_snapshot(snapshot)?;
    let pins: Vec<_> = snapshot.pins.iter().collect();
    let config = CsvExportConfig::default();

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            export_pins_csv(file, &pins, &config).context("failed to write CSV")?;
            println!("{}", path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            export_pins_csv(&mut handle, &pins, &config).context("failed to write CSV")?;
            handle.flush()?;
        }
    }

    tracing::debug!(plan_id = %snapshot.plan_id, pins = pins.len(), "pins exported");
    Ok(())
}

fn run_measure(
    kind: MeasureKind,
    ppu: f64,
    unit: &str,
    precision: usize,
    points: &[String],
) -> Result<()> {
    if !ppu.is_finite() || ppu <= 0.0 {
        anyhow::bail!("--ppu must be a positive number, got {ppu}");
    }
    let unit: MeasurementUnit = unit.parse()?;
    let points = points.iter().map(|p| parse_point(p)).collect::<Result<Vec<_>>>()?;

    let measurement = match kind {
        MeasureKind::Distance => {
            let [start, end] = points.as_slice() else {
                anyhow::bail!("distance needs exactly 2 points, got {}", points.len());
            };
            distance_from_pixels(*start, *end, ppu, unit)
        }
        MeasureKind::Area => area_from_pixels(&points, ppu, unit)?,
    };

    println!("{}", measurement.label(precision));
    Ok(())
}

fn run_summary(snapshot_path: &Path) -> Result<()> {
    let snapshot = load_snapshot(snapshot_path)?;

    let calibrated = match &snapshot.calibration {
        Some(record) => {
            ScaleCalibration::from_record(record).context("snapshot calibration is invalid")?;
            true
        }
        None => false,
    };

    let measurements = summarize(&snapshot.annotations)
        .into_iter()
        .map(|row| SummaryRowOutput {
            kind: row.kind.to_string(),
            unit: row.unit,
            count: row.count,
            total: row.total,
        })
        .collect();

    let payload = SummaryOutput {
        plan_id: snapshot.plan_id,
        annotation_count: snapshot.annotations.len(),
        pin_count: snapshot.pins.len(),
        calibrated,
        measurements,
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

fn load_snapshot(path: &Path) -> Result<PlanSnapshot> {
    ensure_file_exists(path)?;
    PlanSnapshot::load(path).context("failed to read snapshot")
}

fn parse_point(raw: &str) -> Result<Pixel> {
    let (x, y) = raw
        .split_once(',')
        .with_context(|| format!("point must be `x,y`, got `{raw}`"))?;
    let x: f64 = x.trim().parse().with_context(|| format!("invalid x in `{raw}`"))?;
    let y: f64 = y.trim().parse().with_context(|| format!("invalid y in `{raw}`"))?;
    Ok(Pixel::new(x, y))
}

fn ensure_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}
