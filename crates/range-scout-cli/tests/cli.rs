use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};

fn range_scout() -> Command {
    let mut cmd = Command::cargo_bin("range-scout").unwrap();
    cmd.current_dir(env!("CARGO_MANIFEST_DIR"));
    cmd
}

fn payloads(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| {
            let message: Value = serde_json::from_str(line).unwrap();
            assert_eq!(message["type"], "DATES_FOUND");
            message["payload"].clone()
        })
        .collect()
}

#[test]
fn test_extract_attributes() {
    let output = range_scout()
        .args(["extract", "tests/fixtures/attributes.json"])
        .args(["--path", "/resorts/grand-floridian/rates-rooms"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(
        payloads(&output.stdout),
        vec![json!({
            "resortId": "grand-floridian",
            "checkIn": "2024-06-10T06:13:20.000Z",
            "checkOut": "2024-06-17T04:53:20.000Z",
            "provenance": "attributes",
            "detail": "date-from/date-to"
        })]
    );
}

#[test]
fn test_extract_encapsulated_text_fallback() {
    let output = range_scout()
        .args(["extract", "tests/fixtures/encapsulated_text.json"])
        .args(["--timezone", "America/New_York"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let payload = &payloads(&output.stdout)[0];
    assert_eq!(payload["provenance"], "encapsulated");
    assert_eq!(payload["checkIn"], "2024-06-10T04:00:00.000Z");
    assert_eq!(payload["checkOut"], "2024-06-15T04:00:00.000Z");
    assert_eq!(payload["detail"], "text");
    assert!(payload["resortId"].is_null());
}

#[test]
fn test_extract_with_format_mode_override() {
    let output = range_scout()
        .args(["extract", "tests/fixtures/encapsulated_text.json"])
        .args(["--timezone", "America/New_York"])
        .args(["--format-mode", "civil-midnight:America/New_York"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(
        payloads(&output.stdout)[0]["checkIn"],
        "2024-06-10T00:00:00.000"
    );
}

#[test]
fn test_replay_late_picker_session() {
    let output = range_scout()
        .args(["replay", "tests/fixtures/late_picker.json"])
        .args(["--timezone", "America/New_York"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let reports = payloads(&output.stdout);
    assert_eq!(reports.len(), 3);

    assert_eq!(reports[0]["provenance"], "properties");
    assert_eq!(reports[0]["detail"], "startDate/endDate");
    assert_eq!(reports[0]["checkIn"], "2024-06-10T04:00:00.000Z");
    assert_eq!(reports[0]["checkOut"], "2024-06-15T04:00:00.000Z");

    assert_eq!(reports[1]["provenance"], "attributes");
    assert_eq!(reports[1]["checkIn"], "2024-06-10T06:13:20.000Z");
    assert!(reports[1]["checkOut"].is_null());
    assert_eq!(reports[1]["resortId"], "grand-floridian");

    assert_eq!(reports[2]["resortId"], "polynesian");
}

#[test]
fn test_replay_nested_frame_takes_top_resort() {
    let output = range_scout()
        .args(["replay", "tests/fixtures/nested_frame.json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let reports = payloads(&output.stdout);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["resortId"], "riviera");
    assert_eq!(reports[0]["detail"], "selectedDates");
    assert_eq!(reports[0]["checkOut"], "2024-06-17T04:53:20.000Z");
}

#[test]
fn test_replay_missing_picker_reports_none() {
    let output = range_scout()
        .args(["replay", "tests/fixtures/never_appears.json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(
        payloads(&output.stdout),
        vec![json!({
            "resortId": "grand-floridian",
            "checkIn": null,
            "checkOut": null,
            "provenance": "none"
        })]
    );
}

#[test]
fn test_replay_unload_before_timeout_is_silent() {
    range_scout()
        .args(["replay", "tests/fixtures/never_appears.json", "--timeout-ms", "30000"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_invalid_timezone_fails() {
    range_scout()
        .args(["extract", "tests/fixtures/attributes.json", "--timezone", "Mars/Olympus"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"));
}

#[test]
fn test_invalid_format_mode_fails() {
    range_scout()
        .args(["extract", "tests/fixtures/attributes.json", "--format-mode", "sundial"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--format-mode"));
}

#[test]
fn test_missing_fixture_fails() {
    range_scout()
        .args(["replay", "tests/fixtures/does-not-exist.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}
