//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

fn cli_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("sleepon");
    // Keep the caller's environment out of the contract.
    cmd.env_remove("SLEEPON_ADDRESS")
        .env_remove("SLEEPON_RETRY_DELAY_MS")
        .env_remove("SLEEPON_NON_INTERACTIVE")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("sleepon"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sleepon"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn help_lists_subcommands() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("monitor")
                .and(predicate::str::contains("send"))
                .and(predicate::str::contains("decode"))
                .and(predicate::str::contains("completions")),
        );
}

// ============================================================================
// Offline decoding
// ============================================================================

#[test]
fn decode_heart_rate_frame() {
    let mut cmd = cli_cmd();
    cmd.args(["decode", "0x5b", "0x40", "0", "97", "72", "1", "0", "9"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SpO2 97%").and(predicate::str::contains("72")));
}

#[test]
fn decode_battery_hex_string() {
    let mut cmd = cli_cmd();
    cmd.args(["decode", "5b150050"])
        .assert()
        .success()
        .stdout(predicate::str::contains("battery 80%"));
}

#[test]
fn decode_json_is_valid_json() {
    let mut cmd = cli_cmd();
    let output = cmd
        .args(["decode", "--json", "0x5b", "0x15", "0", "80"])
        .output()
        .expect("command should execute");
    assert!(output.status.success());

    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(parsed["kind"], "battery");
    assert_eq!(parsed["level"], 80);
}

#[test]
fn decode_json_heart_rate_fields() {
    let mut cmd = cli_cmd();
    let output = cmd
        .args(["decode", "--json", "5b4000614801000a"])
        .output()
        .expect("command should execute");
    assert!(output.status.success());

    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(parsed["kind"], "heart_spo2");
    assert_eq!(parsed["spo2"], 97);
    assert_eq!(parsed["heart_rate"], 72);
    assert_eq!(parsed["wearing"], true);
    assert_eq!(parsed["pi"], 10);
}

#[test]
fn decode_error_keeps_stdout_clean() {
    let mut cmd = cli_cmd();
    cmd.args(["decode", "--json", "0x00", "0x15"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn decode_short_battery_frame_fails() {
    let mut cmd = cli_cmd();
    cmd.args(["decode", "0x5b", "0x15", "0"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("too short"));
}

// ============================================================================
// Exit Code Tests - Following CLI Standards Contract
// ============================================================================

/// Exit code 0: successful operations
#[test]
fn exit_code_zero_on_success() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .code(0);

    // completions bash exits 0 (doesn't require hardware)
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .code(0)
        .stdout(predicate::str::contains("sleepon"));
}

/// Exit code 2: usage error (unknown command, invalid arguments)
#[test]
fn exit_code_two_for_usage_error_unknown_command() {
    let mut cmd = cli_cmd();
    cmd.arg("unknown-command-xyz")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("unrecognized").or(predicate::str::contains("unknown")));
}

#[test]
fn exit_code_two_for_usage_error_invalid_flag() {
    let mut cmd = cli_cmd();
    cmd.arg("--invalid-flag-xyz")
        .assert()
        .failure()
        .code(2);
}

#[test]
fn exit_code_two_for_invalid_address() {
    let mut cmd = cli_cmd();
    cmd.args(["--address", "not-an-address", "monitor"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Invalid Bluetooth address"));
}

#[test]
fn exit_code_two_for_out_of_range_byte() {
    let mut cmd = cli_cmd();
    cmd.args(["send", "0x5a", "300"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn exit_code_two_for_undecodable_input() {
    let mut cmd = cli_cmd();
    cmd.args(["decode", "nope"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn exit_code_two_when_no_address_configured() {
    let dir = tempdir().expect("tempdir should be created");
    let config = dir.path().join("empty.toml");
    fs::write(&config, "").expect("write empty config");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .arg("--non-interactive")
        .arg("--config")
        .arg(&config)
        .arg("monitor")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("address"));
}

/// Invalid config files are warnings, not fatal.
#[test]
fn invalid_config_file_only_warns() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(dir.path().join("sleepon.toml"), "invalid toml [[[").expect("write invalid config");

    let mut cmd = cli_cmd();
    let output = cmd
        .current_dir(dir.path())
        .args(["decode", "5b150050"])
        .output()
        .expect("command should execute");
    assert!(
        output.status.success(),
        "command should succeed despite config warning"
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("TOML"), "should warn about invalid TOML");
}

#[cfg(not(feature = "bluez"))]
#[test]
fn hardware_commands_without_backend_fail() {
    let mut cmd = cli_cmd();
    cmd.args(["--non-interactive", "-a", "DE:7A:47:65:08:1F", "send", "0x5a", "0x14"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("bluez"));
}
