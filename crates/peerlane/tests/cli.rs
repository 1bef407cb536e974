#![cfg(feature = "cli")]

use std::path::PathBuf;
use std::process::{Command, Output};

use serde_json::Value;

fn peerlane(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_peerlane"))
        .arg("--log-level")
        .arg("error")
        .args(args)
        .output()
        .expect("peerlane should run")
}

fn json_stdout(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be json")
}

fn temp_file(tag: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "peerlane-cli-{tag}-{}-{}.json",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::write(&path, contents).expect("temp file should be writable");
    path
}

fn encode_hex(args: &[&str]) -> String {
    let mut full = vec!["--format", "json", "encode"];
    full.extend_from_slice(args);
    let out = json_stdout(&peerlane(&full));
    out["hex"].as_str().expect("hex field").to_string()
}

#[test]
fn version_prints_package_version() {
    let output = peerlane(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("peerlane {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn encoded_frame_decodes_to_the_same_header() {
    let hex = encode_hex(&[
        "--origin-uid",
        "42",
        "--serializer-id",
        "7",
        "--recipient",
        "/user/a",
        "--manifest",
        "Greeting",
        "--data",
        "hello",
    ]);

    let out = json_stdout(&peerlane(&["--format", "json", "decode", "--hex", &hex]));
    assert_eq!(out["origin_uid"], 42);
    assert_eq!(out["serializer_id"], 7);
    assert_eq!(out["recipient"]["kind"], "literal");
    assert_eq!(out["recipient"]["value"], "/user/a");
    assert_eq!(out["sender"]["kind"], "absent");
    assert_eq!(out["manifest"]["value"], "Greeting");
    assert_eq!(out["payload_size"], 5);
}

#[test]
fn advertised_recipient_is_written_as_a_code() {
    let output = peerlane(&[
        "--format",
        "json",
        "encode",
        "--recipient",
        "/user/b",
        "--actor-refs",
        "/user/a,/user/b",
        "--table-version",
        "3",
    ]);
    let out = json_stdout(&output);
    assert_eq!(out["actor_ref_table_version"], 3);
    assert_eq!(out["compressed"], serde_json::json!(["recipient"]));

    let hex = out["hex"].as_str().expect("hex field");
    let decoded = json_stdout(&peerlane(&["--format", "json", "decode", "--hex", hex]));
    assert_eq!(decoded["actor_ref_table_version"], 3);
    assert_eq!(decoded["recipient"]["kind"], "compressed");
    assert_eq!(decoded["recipient"]["code"], 1);
}

#[test]
fn unsupported_version_exits_with_data_invalid() {
    let hex = encode_hex(&["--protocol-version", "3", "--data", "x"]);
    let output = peerlane(&["decode", "--hex", &hex]);
    assert_eq!(output.status.code(), Some(60));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unsupported protocol version 3"), "{stderr}");
}

#[test]
fn invalid_hex_exits_with_data_invalid() {
    let output = peerlane(&["decode", "--hex", "zz"]);
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn invalid_config_names_the_key() {
    let path = temp_file("invalid", r#"{"canonical": {"port": 70000}}"#);
    let output = peerlane(&["config", "--file", path.to_str().expect("utf-8 path")]);
    let _ = std::fs::remove_file(&path);

    assert_eq!(output.status.code(), Some(60));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("canonical.port"), "{stderr}");
}

#[test]
fn missing_config_file_fails() {
    let output = peerlane(&["config", "--file", "/nonexistent/peerlane.json"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn config_prints_defaults() {
    let out = json_stdout(&peerlane(&["--format", "json", "config"]));
    assert_eq!(out["canonical"]["port"], 25520);
    assert_eq!(out["lanes"]["outbound-control-queue-size"], 20000);
    assert_eq!(out["compression"]["keep-old-tables"], 3);
    assert_eq!(out["association"]["handshake-timeout"], "20s");
}

#[test]
fn config_check_accepts_partial_file() {
    let path = temp_file("partial", r#"{"lanes": {"outbound-lanes": 4}}"#);
    let output = peerlane(&[
        "--format",
        "json",
        "config",
        "--check",
        "--file",
        path.to_str().expect("utf-8 path"),
    ]);
    let _ = std::fs::remove_file(&path);

    let out = json_stdout(&output);
    assert_eq!(out["valid"], true);
}

#[test]
fn simulation_compresses_after_the_first_advertisement() {
    let reports = json_stdout(&peerlane(&[
        "--format",
        "json",
        "simulate",
        "--rounds",
        "2",
        "--messages",
        "20",
        "--sample-interval",
        "1",
    ]));
    let reports = reports.as_array().expect("array of rounds");
    assert_eq!(reports.len(), 2);

    assert_eq!(reports[0]["frames"], 20);
    assert_eq!(reports[0]["compressed_fields"], 0);
    assert_eq!(reports[0]["actor_ref_table_version"], 0);

    assert_eq!(reports[1]["frames"], 20);
    assert_eq!(reports[1]["actor_ref_table_version"], 1);
    assert_eq!(reports[1]["manifest_table_version"], 1);
    assert!(reports[1]["compressed_fields"].as_u64().unwrap_or(0) > 0);
    assert_eq!(reports[1]["unavailable_fields"], 0);
}
