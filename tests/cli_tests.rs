//! Integration tests for the wgtunnel binary
//!
//! Only commands that need no privileges are exercised: key helpers, config
//! checking, and listing tunnels from a temporary directory.

mod common;

use assert_cmd::Command;
use common::{PEER_KEY, PRIVATE_KEY};
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn wgtunnel() -> Command {
    Command::cargo_bin("wgtunnel").unwrap()
}

fn sample_text() -> String {
    format!(
        "[Interface]\nAddress = 10.0.0.2/32\nPrivateKey = {}\n\n[Peer]\nAllowedIPs = 0.0.0.0/0\nPublicKey = {}\n",
        PRIVATE_KEY, PEER_KEY
    )
}

/// Write an app config pointing every path into `dir`
fn app_config(dir: &Path) -> PathBuf {
    let tunnels = dir.join("tunnels");
    fs::create_dir_all(&tunnels).unwrap();
    let path = dir.join("wgtunnel.toml");
    fs::write(
        &path,
        format!(
            "[paths]\nconfig_dir = {:?}\nsettings_file = {:?}\nruntime_dir = {:?}\n",
            tunnels,
            dir.join("settings.toml"),
            dir.join("run")
        ),
    )
    .unwrap();
    path
}

#[test]
fn test_help_command() {
    wgtunnel()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("WireGuard tunnel manager"));
}

#[test]
fn test_genkey_prints_key() {
    let output = wgtunnel().arg("genkey").output().unwrap();
    assert!(output.status.success());
    let key = String::from_utf8(output.stdout).unwrap();
    assert_eq!(key.trim().len(), 44);
}

#[test]
fn test_pubkey_from_stdin() {
    let expected = libwgtunnel::crypto::public_key_for(PRIVATE_KEY).unwrap();
    wgtunnel()
        .arg("pubkey")
        .write_stdin(format!("{}\n", PRIVATE_KEY))
        .assert()
        .success()
        .stdout(format!("{}\n", expected));
}

#[test]
fn test_pubkey_rejects_garbage() {
    wgtunnel()
        .arg("pubkey")
        .write_stdin("definitely not base64")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid private key"));
}

#[test]
fn test_check_prints_normalised_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wg0.conf");
    fs::write(&path, format!("# comment\n{}", sample_text())).unwrap();

    wgtunnel()
        .arg("check")
        .arg(&path)
        .assert()
        .success()
        .stdout(sample_text());
}

#[test]
fn test_check_rejects_unknown_key() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wg0.conf");
    fs::write(&path, "[Interface]\nPostUp = echo hi\n").unwrap();

    wgtunnel()
        .arg("check")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 2"));
}

#[test]
fn test_list_stored_tunnels() {
    let dir = TempDir::new().unwrap();
    let config = app_config(dir.path());
    fs::write(dir.path().join("tunnels").join("work.conf"), sample_text()).unwrap();
    fs::write(dir.path().join("tunnels").join("Home.conf"), sample_text()).unwrap();

    wgtunnel()
        .arg("--config")
        .arg(&config)
        .arg("list")
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"Home\""))
        .stdout(predicate::str::contains("\"name\": \"work\""));
}

#[test]
fn test_show_unknown_tunnel_fails() {
    let dir = TempDir::new().unwrap();
    let config = app_config(dir.path());

    wgtunnel()
        .arg("--config")
        .arg(&config)
        .arg("show")
        .arg("missing")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found: missing"));
}

#[test]
fn test_show_prints_stored_config() {
    let dir = TempDir::new().unwrap();
    let config = app_config(dir.path());
    fs::write(dir.path().join("tunnels").join("wg0.conf"), sample_text()).unwrap();

    wgtunnel()
        .arg("--config")
        .arg(&config)
        .arg("show")
        .arg("wg0")
        .assert()
        .success()
        .stdout(sample_text());
}
