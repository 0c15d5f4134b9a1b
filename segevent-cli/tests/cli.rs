use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn segevent() -> Command {
    Command::cargo_bin("segevent").unwrap()
}

/// Boundary event split over two segments, one ordinary event and a self-trigger.
const PULSES: &str = "\
xpos,ypos,amp,time,eventID,eventTS,mcpdID,status
125,0,20,1000,0,0,1,0
127,0,30,1001,0,0,1,0
0,552,10,1002,0,0,1,0
40,0,99,1002,1,0,2,0
1,0,50,1003,0,0,2,0
0,553,10,1004,0,0,2,0
60,0,5,1500,0,0,1,0
0,570,5,1501,0,0,1,0
";

fn pulses_csv(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("pulses.csv");
    fs::write(&path, PULSES).unwrap();
    path
}

fn data_lines(path: &Path) -> usize {
    fs::read_to_string(path).unwrap().lines().count() - 1
}

#[test]
fn test_no_args_shows_help() {
    segevent()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_help_lists_subcommands() {
    segevent()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("sort"))
        .stdout(predicate::str::contains("correlate"))
        .stdout(predicate::str::contains("process"))
        .stdout(predicate::str::contains("info"));
}

#[test]
fn test_info_reports_segments() {
    let dir = TempDir::new().unwrap();
    let input = pulses_csv(&dir);

    segevent()
        .arg("info")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("Pulses: 8"))
        .stdout(predicate::str::contains("Self-triggers: 1"))
        .stdout(predicate::str::contains("Time range: 1000 - 1501"))
        .stdout(predicate::str::contains("Segment 1: 3 wire, 2 stripe, 0 self-trigger"))
        .stdout(predicate::str::contains("Segment 2: 1 wire, 1 stripe, 1 self-trigger"));
}

#[test]
fn test_sort_writes_events() {
    let dir = TempDir::new().unwrap();
    let input = pulses_csv(&dir);
    let output = dir.path().join("sorted.csv");

    segevent()
        .arg("sort")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Events: 3"));

    let content = fs::read_to_string(&output).unwrap();
    assert!(content.starts_with("xpos,ypos,ToTx"));
    assert!(!content.contains("xfit"));
    assert_eq!(data_lines(&output), 3);
}

#[test]
fn test_sort_with_fit_adds_columns() {
    let dir = TempDir::new().unwrap();
    let input = pulses_csv(&dir);
    let output = dir.path().join("sorted.csv");

    segevent()
        .args(["sort", "--fit"])
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success();

    let header = fs::read_to_string(&output).unwrap();
    assert!(header.lines().next().unwrap().ends_with("xfit,yfit"));
}

#[test]
fn test_process_merges_boundary_pair() {
    let dir = TempDir::new().unwrap();
    let input = pulses_csv(&dir);
    let output = dir.path().join("events.csv");

    segevent()
        .args(["process", "--boundary-dt"])
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Merged pairs: 1"));

    let events = segevent_io::read_events_csv(&output).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].segment, -1);
    assert_eq!(events[0].boundary_dt, Some(3));
}

#[test]
fn test_sort_then_correlate_binary() {
    let dir = TempDir::new().unwrap();
    let input = pulses_csv(&dir);
    let sorted = dir.path().join("sorted.bin");
    let output = dir.path().join("events.csv");

    segevent()
        .arg("sort")
        .arg(&input)
        .arg("-o")
        .arg(&sorted)
        .assert()
        .success();

    segevent()
        .arg("correlate")
        .arg(&sorted)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Merged pairs: 1"));

    assert_eq!(data_lines(&output), 2);
}

#[test]
fn test_config_file_overrides_defaults() {
    let dir = TempDir::new().unwrap();
    let input = pulses_csv(&dir);
    let config = dir.path().join("config.json");
    fs::write(&config, r#"{"formation": {"require_both_axes": true}}"#).unwrap();
    let output = dir.path().join("sorted.csv");

    // Every event in the fixture has both axes.
    segevent()
        .arg("--config")
        .arg(&config)
        .arg("sort")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Dropped: 0"));
}

#[test]
fn test_unknown_extension_fails() {
    let dir = TempDir::new().unwrap();
    let input = pulses_csv(&dir);

    segevent()
        .arg("sort")
        .arg(&input)
        .arg("-o")
        .arg(dir.path().join("events.txt"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("UnsupportedFormat"));
}

#[test]
fn test_invalid_segment_count_fails() {
    let dir = TempDir::new().unwrap();
    let input = pulses_csv(&dir);

    segevent()
        .args(["sort", "--segments", "0"])
        .arg(&input)
        .arg("-o")
        .arg(dir.path().join("events.csv"))
        .assert()
        .failure();
}
