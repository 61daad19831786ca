use std::fs;

mod common;

use common::{parse_json, Sandbox};

#[test]
fn validate_rejects_a_plain_directory() {
    let sandbox = Sandbox::new();
    let dir = sandbox.scan_dir("scan-0001");

    let assert = sandbox
        .clint()
        .args(["--json", "validate"])
        .arg(&dir)
        .assert()
        .code(1);
    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "user-error");
    assert_eq!(payload["details"]["reason"], "not_packaged");
    assert_eq!(payload["details"]["state"], "unpackaged");
    assert!(payload["message"]
        .as_str()
        .is_some_and(|message| message.starts_with("clint validate: ")));
}

#[test]
fn bag_needs_a_catalog_before_touching_the_directory() {
    let sandbox = Sandbox::new();
    let dir = sandbox.scan_dir("scan-0002");

    let assert = sandbox
        .clint()
        .args(["--json", "bag"])
        .arg(&dir)
        .assert()
        .code(1);
    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "user-error");
    assert_eq!(payload["details"]["reason"], "missing_catalog_url");
    assert!(payload["details"]["hint"]
        .as_str()
        .is_some_and(|hint| hint.contains("CLINT_CATALOG_URL")));
    assert!(!dir.join("bagit.txt").exists());
    assert!(dir.join("mets.xml").exists());
}

#[test]
fn human_output_prints_hints() {
    let sandbox = Sandbox::new();
    let dir = sandbox.scan_dir("scan-0003");

    let assert = sandbox.clint().arg("rebag").arg(&dir).assert().code(1);
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    assert!(stdout.contains("✗ clint rebag: "), "status line missing: {stdout}");
    assert!(stdout.contains("Hint: "), "hint missing: {stdout}");
}

#[test]
fn malformed_config_is_a_failure() {
    let sandbox = Sandbox::new();
    fs::write(&sandbox.config, "[replication]\nreserved_percent = 140\n").expect("write");
    let dir = sandbox.scan_dir("scan-0004");

    let assert = sandbox
        .clint()
        .args(["--json", "validate"])
        .arg(&dir)
        .assert()
        .code(2);
    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "error");
    assert_eq!(payload["details"]["reason"], "internal_error");
}
