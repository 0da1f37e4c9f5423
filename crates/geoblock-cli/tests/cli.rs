//! End-to-end tests for the geoblock binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn geoblock() -> Command {
    let mut cmd = Command::cargo_bin("geoblock").unwrap();
    cmd.env_remove("GEOBLOCK_CONFIG").env("NO_COLOR", "1");
    cmd
}

/// IPv4-only database: 8.8.8.0/24 is US, 85.214.0.0/16 is DE, everything else "-"
fn write_db(dir: &Path) -> PathBuf {
    let rows: [(Ipv4Addr, &str); 6] = [
        (Ipv4Addr::new(0, 0, 0, 0), "-"),
        (Ipv4Addr::new(8, 8, 8, 0), "US"),
        (Ipv4Addr::new(8, 8, 9, 0), "-"),
        (Ipv4Addr::new(85, 214, 0, 0), "DE"),
        (Ipv4Addr::new(85, 215, 0, 0), "-"),
        (Ipv4Addr::new(255, 255, 255, 255), "-"),
    ];

    let mut data = vec![0u8; 512];
    let mut pointers = std::collections::HashMap::new();
    for country in ["-", "US", "DE"] {
        pointers.insert(country, u32::try_from(data.len()).unwrap());
        data.push(u8::try_from(country.len()).unwrap());
        data.extend_from_slice(country.as_bytes());
    }
    let base = u32::try_from(data.len() + 1).unwrap();
    for (from, country) in rows {
        data.extend_from_slice(&u32::from(from).to_le_bytes());
        data.extend_from_slice(&pointers[country].to_le_bytes());
    }

    data[0] = 1;
    data[1] = 2;
    data[2] = 24;
    data[3] = 5;
    data[4] = 1;
    data[5..9].copy_from_slice(&5u32.to_le_bytes());
    data[9..13].copy_from_slice(&base.to_le_bytes());
    data[29] = 1;

    let path = dir.join("IP2LOCATION-LITE-DB1.IPV6.BIN");
    std::fs::write(&path, data).unwrap();
    path
}

#[test]
fn test_requires_subcommand() {
    geoblock()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_config_paths() {
    geoblock()
        .args(["config", "paths"])
        .assert()
        .success()
        .stdout(predicate::str::contains("./geoblock.toml"));
}

#[test]
fn test_config_generate_then_validate() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("geoblock.toml");

    geoblock()
        .args(["config", "generate", "--output"])
        .arg(&output)
        .assert()
        .success();
    assert!(output.is_file());

    geoblock()
        .args(["config", "validate"])
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));

    geoblock()
        .args(["config", "generate", "--output"])
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn test_config_validate_rejects_bad_status() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[response]\nstatus_code = 99\n").unwrap();

    geoblock()
        .args(["config", "validate"])
        .arg(&path)
        .assert()
        .failure();
}

#[test]
fn test_ranges_check() {
    geoblock()
        .args(["ranges", "check", "10.1.2.3", "--cidr", "10.0.0.0/8", "--cidr", "10.1.0.0/16"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/16"));

    geoblock()
        .args(["ranges", "check", "192.0.2.1", "--cidr", "10.0.0.0/8"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Match: No"));
}

#[test]
fn test_completions() {
    geoblock()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("geoblock"));
}

#[test]
fn test_db_latest_on_empty_dir() {
    let dir = TempDir::new().unwrap();
    geoblock()
        .args(["db", "latest", "--dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No DB1 databases"));
}

#[test]
fn test_db_info() {
    let dir = TempDir::new().unwrap();
    write_db(dir.path());

    geoblock()
        .args(["db", "info"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("2024.5.1"));
}

#[test]
fn test_check_json() {
    let dir = TempDir::new().unwrap();
    let db = write_db(dir.path());

    geoblock()
        .args(["check", "8.8.8.8", "85.214.1.1", "--block-country", "US", "--default-allow", "--json", "--db"])
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""ip":"8.8.8.8","allowed":false"#))
        .stdout(predicate::str::contains(r#""ip":"85.214.1.1","allowed":true"#));
}

#[test]
fn test_simulate_denies_blocked_country() {
    let dir = TempDir::new().unwrap();
    let db = write_db(dir.path());
    let config = dir.path().join("geoblock.toml");
    std::fs::write(
        &config,
        "[filter]\nblocked_countries = [\"US\"]\ndefault_allow = true\n",
    )
    .unwrap();

    geoblock()
        .arg("-c")
        .arg(&config)
        .args(["simulate", "-H", "X-Forwarded-For: 8.8.8.8", "--db"])
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("DENY 403"));

    geoblock()
        .arg("-c")
        .arg(&config)
        .args(["simulate", "-H", "X-Forwarded-For: 85.214.1.1", "--db"])
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("FORWARD"));
}
