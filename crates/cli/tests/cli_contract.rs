use assert_cmd::cargo::cargo_bin_cmd;
use planmark_core::{
    AnnotationShape, CalibrationRepository, EngineConfig, MarkupSession, MeasurementUnit,
    MemoryRepository, NewAnnotation, Percent, PinDraft, PlanDimensions, PlanInfo, Repositories,
    ScaleCalibration, SessionKey,
};
use predicates::prelude::*;
use serde_json::Value;
use std::path::{Path, PathBuf};

const PLAN: &str = "A-101";
const PROJECT: &str = "tower";

/// Writes a snapshot with a 10 px/ft scale, two 30 ft distances and two pins
fn write_snapshot(dir: &Path) -> PathBuf {
    let dims = PlanDimensions::new(1000.0, 1000.0);
    let repo = MemoryRepository::new();
    let calibration = ScaleCalibration::from_reference_line(
        Percent::new(0.0, 0.0),
        Percent::new(10.0, 0.0),
        10.0,
        MeasurementUnit::Feet,
        dims,
    )
    .unwrap();
    CalibrationRepository::save(&repo, PLAN, &calibration.to_record()).unwrap();

    let mut session = MarkupSession::open(
        SessionKey::new(PLAN, PROJECT),
        EngineConfig::default(),
        PlanInfo::new(dims),
        Repositories::memory(repo),
    )
    .unwrap();

    for y in [20.0, 60.0] {
        session
            .create_annotation(NewAnnotation::new(
                PLAN,
                PROJECT,
                AnnotationShape::MeasureDistance {
                    start: Percent::new(0.0, y),
                    end: Percent::new(30.0, y),
                },
            ))
            .unwrap();
    }
    session
        .place_pin_at(Percent::new(25.0, 75.0), PinDraft::new("Door swing, \"D4\""))
        .unwrap();
    session
        .place_pin_at(Percent::new(50.0, 50.0), PinDraft::new("Slab edge").rfi("RFI-7"))
        .unwrap();

    let path = dir.join("snapshot.json");
    std::fs::write(&path, session.snapshot().to_json().unwrap()).unwrap();
    path
}

#[test]
fn version_prints_package_version() {
    cargo_bin_cmd!("planmark-cli")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn measure_distance_applies_scale() {
    cargo_bin_cmd!("planmark-cli")
        .args(["measure", "distance", "--ppu", "10", "--unit", "ft", "0,0", "30,40"])
        .assert()
        .success()
        .stdout("5.00 ft\n");
}

#[test]
fn measure_area_uses_squared_unit() {
    cargo_bin_cmd!("planmark-cli")
        .args(["measure", "area", "--ppu", "2", "--unit", "m"])
        .args(["0,0", "20,0", "20,10", "0,10"])
        .assert()
        .success()
        .stdout("50.00 m²\n");
}

#[test]
fn measure_rejects_bad_input() {
    cargo_bin_cmd!("planmark-cli")
        .args(["measure", "distance", "--ppu", "0", "0,0", "1,1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--ppu must be a positive number"));

    cargo_bin_cmd!("planmark-cli")
        .args(["measure", "area", "--ppu", "1", "0,0", "1,1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 3 points"));

    cargo_bin_cmd!("planmark-cli")
        .args(["measure", "distance", "--ppu", "1", "--unit", "furlong", "0,0", "1,1"])
        .assert()
        .failure();
}

#[test]
fn summary_emits_json_totals() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let snapshot = write_snapshot(temp.path());

    let output = cargo_bin_cmd!("planmark-cli")
        .arg("summary")
        .arg(&snapshot)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).expect("stdout should contain valid json");
    assert_eq!(value["plan_id"], PLAN);
    assert_eq!(value["annotation_count"], 2);
    assert_eq!(value["pin_count"], 2);
    assert_eq!(value["calibrated"], true);

    let rows = value["measurements"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["kind"], "measure_distance");
    assert_eq!(rows[0]["unit"], "ft");
    assert_eq!(rows[0]["count"], 2);
    let total = rows[0]["total"].as_f64().unwrap();
    assert!((total - 60.0).abs() < 1e-9);
}

#[test]
fn pins_csv_writes_to_stdout_and_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let snapshot = write_snapshot(temp.path());

    cargo_bin_cmd!("planmark-cli")
        .arg("pins-csv")
        .arg(&snapshot)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Title,"))
        .stdout(predicate::str::contains("\"Door swing, \"\"D4\"\"\""))
        .stdout(predicate::str::contains("Slab edge,,issue,open,,,Yes,0,50.00,50.00,"));

    let output_path = temp.path().join("out/pins.csv");
    cargo_bin_cmd!("planmark-cli")
        .arg("pins-csv")
        .arg(&snapshot)
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success();

    let csv = std::fs::read_to_string(&output_path).unwrap();
    assert_eq!(csv.lines().count(), 3);
}

#[test]
fn missing_snapshot_fails() {
    cargo_bin_cmd!("planmark-cli")
        .arg("summary")
        .arg("does-not-exist.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("file does not exist"));
}
