//! Integration tests for the infusion binary.
//!
//! These tests verify end-to-end behavior including:
//! - Link hydration and share-link output
//! - Flag-driven session changes
//! - Config file handling
//! - Drug listing

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create an isolated config home
fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Helper to get the CLI binary with a clean environment
fn cli(config_home: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("infusion"));
    cmd.env("XDG_CONFIG_HOME", config_home.path())
        .env("HOME", config_home.path())
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_help() {
    let home = setup_test_dir();
    cli(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Infusion rate converter for weight-based drips",
        ));
}

#[test]
fn test_default_command_shows_first_drug() {
    let home = setup_test_dir();
    cli(&home)
        .assert()
        .success()
        .stdout(predicate::str::contains("Dopamine"))
        .stdout(predicate::str::contains("Infusion rate (mL/hr): —"))
        .stdout(predicate::str::contains("Config: built-in table"));
}

#[test]
fn test_reverse_link_round_trip() {
    let home = setup_test_dir();
    cli(&home)
        .arg("calc")
        .arg("?drug=norepi&mode=reverse&b=70&rate=5.25")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Required Dose (mcg/kg/min): 0.05 mcg/kg/min",
        ))
        .stdout(predicate::str::contains(
            "https://localhost/?drug=levophed&mode=reverse&lang=en&conc=4%3A100&rate=5.25&b=70.0&p=0.05",
        ));
}

#[test]
fn test_hash_link() {
    let home = setup_test_dir();
    cli(&home)
        .arg("calc")
        .arg("https://example.org/#/dobutamine?b=80&p=5")
        .assert()
        .success()
        .stdout(predicate::str::contains("Dobutamine"))
        .stdout(predicate::str::contains("Weight: 80.0 kg"));
}

#[test]
fn test_forward_flags_and_prep() {
    let home = setup_test_dir();
    cli(&home)
        .arg("calc")
        .arg("--drug")
        .arg("dopamine")
        .arg("--weight")
        .arg("60")
        .arg("--dose")
        .arg("5")
        .assert()
        .success()
        .stdout(predicate::str::contains("Infusion rate (mL/hr): 9.00 mL/hr"))
        .stdout(predicate::str::contains("Q: 1.800"))
        .stdout(predicate::str::contains("Drug: 8.0 mL  Solvent: 92.0 mL"))
        .stdout(predicate::str::contains("[Within range]"));
}

#[test]
fn test_total_selection() {
    let home = setup_test_dir();
    cli(&home)
        .args(["calc", "--drug", "dopamine", "--total", "250"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total (mL): (50) 100 [250] 500"))
        .stdout(predicate::str::contains("Drug: 20.0 mL  Solvent: 230.0 mL"));
}

#[test]
fn test_above_max_flagged() {
    let home = setup_test_dir();
    cli(&home)
        .args(["calc", "--drug", "levophed", "--weight", "70", "--dose", "4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[Above max]"))
        .stdout(predicate::str::contains("max infusion 315.00 mL/hr"));
}

#[test]
fn test_unknown_drug_flag_keeps_session() {
    let home = setup_test_dir();
    cli(&home)
        .args(["calc", "--drug", "propofol"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Unknown drug: propofol"))
        .stdout(predicate::str::contains("Dopamine"));
}

#[test]
fn test_unoffered_concentration_flag() {
    let home = setup_test_dir();
    cli(&home)
        .args(["calc", "--drug", "levophed", "--conc", "2:1"])
        .assert()
        .success()
        .stderr(predicate::str::contains("is not offered"))
        .stdout(predicate::str::contains("Concentration: 4:100"));
}

#[test]
fn test_thai_output() {
    let home = setup_test_dir();
    cli(&home)
        .args(["calc", "--lang", "th"])
        .assert()
        .success()
        .stdout(predicate::str::contains("อยู่ในเกณฑ์"))
        .stdout(predicate::str::contains("lang=th"));
}

#[test]
fn test_json_output() {
    let home = setup_test_dir();
    let output = cli(&home)
        .args([
            "calc", "--drug", "dopamine", "--weight", "60", "--dose", "5", "--json",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: serde_json::Value =
        serde_json::from_slice(&output).expect("calc --json should print JSON");
    assert_eq!(value["view"]["value"], "9.00 mL/hr");
    assert_eq!(value["view"]["status"], "ok");
    assert_eq!(value["view"]["severity"], "ok");
    assert_eq!(value["config"]["status"], "local");
    assert!(value["share_url"]
        .as_str()
        .unwrap()
        .contains("drug=dopamine&mode=forward"));
    assert_eq!(value["share_url_changed"], true);
}

#[test]
fn test_link_without_dose_stays_without_dose() {
    let home = setup_test_dir();
    let output = cli(&home)
        .args(["calc", "?drug=dopamine&b=70", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(
        value["share_url"],
        "https://localhost/?drug=dopamine&mode=forward&lang=en&conc=2%3A1&b=70.0"
    );
    assert_eq!(value["share_url_changed"], false);
    assert_eq!(value["view"]["value"], "—");
}

#[test]
fn test_config_file_defaults() {
    let home = setup_test_dir();
    let config_dir = home.path().join("infusion");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(
        config_dir.join("config.toml"),
        r#"
[ui]
language = "th"

[share]
base_url = "https://calc.example.org/infusion/"
"#,
    )
    .unwrap();

    cli(&home)
        .arg("calc")
        .assert()
        .success()
        .stdout(predicate::str::contains("วิธีการเตรียมยา"))
        .stdout(predicate::str::contains(
            "https://calc.example.org/infusion/?drug=dopamine",
        ));
}

#[test]
fn test_invalid_config_file_fails() {
    let home = setup_test_dir();
    let config_dir = home.path().join("infusion");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("config.toml"), "[remote]\ntimeout_secs = 0\n").unwrap();

    cli(&home).arg("calc").assert().failure();
}

#[test]
fn test_drugs_lists_builtin_table() {
    let home = setup_test_dir();
    cli(&home)
        .arg("drugs")
        .assert()
        .success()
        .stdout(predicate::str::contains("Levophed (Norepinephrine)"))
        .stdout(predicate::str::contains("[8:100, 4:100, 4:250]"))
        .stdout(predicate::str::contains("6 drugs (built-in table)"));
}
