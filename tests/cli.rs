use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

fn valid_settings_json() -> &'static str {
    r#"
{
  "version": 1,
  "minute_of_hour": 30,
  "active": true,
  "theme_preference": "dark"
}
"#
}

#[test]
fn diagnostics_succeeds_with_valid_settings_file() {
    let dir = tempdir().expect("tempdir");
    let settings = dir.path().join("chime.json");
    fs::write(&settings, valid_settings_json()).expect("write json");

    let mut cmd = cargo_bin_cmd!("timechime");
    cmd.arg("--diagnostics")
        .arg("--settings")
        .arg(&settings)
        .args(["--os-theme", "light", "--time-format", "24h"])
        .args(["--start-at", "2024-05-01T14:30:01"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Chime minute: :30"))
        .stdout(predicate::str::contains("Theme: dark -> dark"))
        .stdout(predicate::str::contains("Next chimes:\n  15:30\n  16:30"));
}

#[test]
fn missing_settings_file_uses_defaults() {
    let dir = tempdir().expect("tempdir");
    let settings = dir.path().join("absent.json");

    let mut cmd = cargo_bin_cmd!("timechime");
    cmd.arg("--diagnostics")
        .arg("--settings")
        .arg(&settings)
        .args(["--os-theme", "dark", "--time-format", "24h"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not found, defaults"))
        .stdout(predicate::str::contains("Chimes: off"))
        .stdout(predicate::str::contains("Theme: system -> dark"));
    assert!(!settings.exists());
}

#[test]
fn malformed_json_fails_with_clear_error() {
    let dir = tempdir().expect("tempdir");
    let settings = dir.path().join("chime.json");
    fs::write(&settings, "{ not-valid-json ").expect("write invalid json");

    let mut cmd = cargo_bin_cmd!("timechime");
    cmd.arg("--diagnostics")
        .arg("--settings")
        .arg(settings)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid JSON at line 1"));
}

#[test]
fn out_of_range_minute_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let settings = dir.path().join("chime.json");

    let mut cmd = cargo_bin_cmd!("timechime");
    cmd.arg("--diagnostics")
        .arg("--settings")
        .arg(&settings)
        .args(["--minute", "60"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid argument"));
}

#[test]
fn render_wav_writes_a_three_second_chime() {
    let dir = tempdir().expect("tempdir");
    let wav = dir.path().join("chime.wav");

    let mut cmd = cargo_bin_cmd!("timechime");
    cmd.arg("--render-wav")
        .arg(&wav)
        .args(["--sample-rate", "8000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 24000 samples"));

    let reader = hound::WavReader::open(&wav).expect("open wav");
    assert_eq!(reader.spec().channels, 1);
    assert_eq!(reader.spec().sample_rate, 8_000);
    assert_eq!(reader.duration(), 24_000);
}

#[test]
fn headless_run_reports_next_chime_and_fires() {
    let dir = tempdir().expect("tempdir");
    let settings = dir.path().join("chime.json");
    fs::write(&settings, valid_settings_json()).expect("write json");

    let mut cmd = cargo_bin_cmd!("timechime");
    cmd.arg("--headless")
        .arg("--settings")
        .arg(&settings)
        .args(["--mute", "--ticks", "1"])
        .args(["--os-theme", "dark", "--time-format", "24h"])
        .args(["--start-at", "2024-05-01T14:30:00"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Next chime: 14:30"))
        .stdout(predicate::str::contains("Chime at 14:30:00"));
}

#[test]
fn headless_inactive_run_reports_chimes_off() {
    let dir = tempdir().expect("tempdir");
    let settings = dir.path().join("chime.json");

    let mut cmd = cargo_bin_cmd!("timechime");
    cmd.arg("--headless")
        .arg("--settings")
        .arg(&settings)
        .args(["--mute", "--ticks", "1", "--active", "false"])
        .args(["--os-theme", "light", "--time-format", "24h"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Chimes off"))
        .stdout(predicate::str::contains("Chime at").not());
}
