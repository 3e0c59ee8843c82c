//! Integration tests for unpack-cli.
//!
//! Note: Tests use `unwrap`/`expect` which is acceptable in test code.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::path::Path;
use std::path::PathBuf;
use tempfile::TempDir;
use unpack_core::Codec;
use unpack_core::test_utils::ZipTestBuilder;
use unpack_core::test_utils::compress;
use unpack_core::test_utils::create_test_tar;

fn unpack_cmd() -> Command {
    cargo_bin_cmd!("unpack")
}

fn write_fixture(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).expect("failed to write fixture");
    path
}

fn sample_tar_gz(dir: &Path) -> PathBuf {
    let tar = create_test_tar(vec![
        ("sample.txt", b"Hello from tar".as_slice()),
        ("docs/readme.md", b"# Readme".as_slice()),
    ]);
    write_fixture(dir, "sample.tar.gz", &compress(Codec::Gzip, &tar))
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

#[test]
fn test_version_flag() {
    unpack_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("unpack"));
}

#[test]
fn test_help_flag() {
    unpack_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("extract"))
        .stdout(predicate::str::contains("detect"));
}

#[test]
fn test_extract_help() {
    unpack_cmd()
        .arg("extract")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--prioritize-extension"))
        .stdout(predicate::str::contains("--tool-dir"));
}

#[test]
fn test_extract_creates_files() {
    let temp = TempDir::new().expect("failed to create temp dir");
    let artifact = sample_tar_gz(temp.path());
    let out = temp.path().join("out");

    unpack_cmd()
        .arg("extract")
        .arg(&artifact)
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Extracted sample.tar.gz"))
        .stdout(predicate::str::contains("tar"));

    assert_eq!(
        std::fs::read_to_string(out.join("sample.txt")).unwrap(),
        "Hello from tar"
    );
    assert!(out.join("docs/readme.md").exists());
}

#[test]
fn test_extract_json_output() {
    let temp = TempDir::new().expect("failed to create temp dir");
    let artifact = sample_tar_gz(temp.path());
    let out = temp.path().join("out");

    let output = unpack_cmd()
        .arg("--json")
        .arg("extract")
        .arg(&artifact)
        .arg(&out)
        .output()
        .unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["operation"], "extract");
    assert_eq!(json["status"], "success");
    assert_eq!(json["data"]["layers"], serde_json::json!(["tar"]));
    assert_eq!(json["data"]["entries"], serde_json::json!(["docs", "sample.txt"]));
}

#[test]
fn test_extract_quiet_prints_nothing() {
    let temp = TempDir::new().expect("failed to create temp dir");
    let artifact = sample_tar_gz(temp.path());

    unpack_cmd()
        .arg("--quiet")
        .arg("extract")
        .arg(&artifact)
        .arg(temp.path().join("out"))
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_extract_single_layer_leaves_inner_stream() {
    let temp = TempDir::new().expect("failed to create temp dir");
    let inner = compress(Codec::Gzip, b"release notes");
    let artifact = write_fixture(temp.path(), "notes.txt.gz.bz2", &compress(Codec::Bzip2, &inner));
    let out = temp.path().join("out");

    unpack_cmd()
        .arg("extract")
        .arg(&artifact)
        .arg(&out)
        .assert()
        .success();

    assert!(out.join("notes.txt.gz").exists());
    assert!(!out.join("notes.txt").exists());
}

#[test]
fn test_extract_nested_unwraps_every_layer() {
    let temp = TempDir::new().expect("failed to create temp dir");
    let inner = compress(Codec::Gzip, b"release notes");
    let artifact = write_fixture(temp.path(), "notes.txt.gz.bz2", &compress(Codec::Bzip2, &inner));
    let out = temp.path().join("out");

    let output = unpack_cmd()
        .arg("--json")
        .arg("extract")
        .arg("--nested")
        .arg(&artifact)
        .arg(&out)
        .output()
        .unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["data"]["layers"], serde_json::json!(["bzip2", "gzip"]));
    assert_eq!(std::fs::read(out.join("notes.txt")).unwrap(), b"release notes");
}

#[test]
fn test_extract_nested_depth_limit() {
    let temp = TempDir::new().expect("failed to create temp dir");
    let inner = compress(Codec::Gzip, b"release notes");
    let artifact = write_fixture(temp.path(), "notes.txt.gz.bz2", &compress(Codec::Bzip2, &inner));

    unpack_cmd()
        .arg("extract")
        .arg("--nested")
        .arg("--max-depth")
        .arg("1")
        .arg(&artifact)
        .arg(temp.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("--max-depth"));
}

#[test]
fn test_max_depth_requires_nested() {
    let temp = TempDir::new().expect("failed to create temp dir");
    let artifact = sample_tar_gz(temp.path());

    unpack_cmd()
        .arg("extract")
        .arg("--max-depth")
        .arg("3")
        .arg(&artifact)
        .assert()
        .failure();
}

#[test]
fn test_extract_forced_type_copies_file() {
    let temp = TempDir::new().expect("failed to create temp dir");
    let artifact = sample_tar_gz(temp.path());
    let out = temp.path().join("out");

    unpack_cmd()
        .arg("extract")
        .arg("--type")
        .arg("naked")
        .arg("--basename")
        .arg("payload.bin")
        .arg(&artifact)
        .arg(&out)
        .assert()
        .success();

    assert_eq!(
        std::fs::read(out.join("payload.bin")).unwrap(),
        std::fs::read(&artifact).unwrap()
    );
    assert!(!out.join("sample.txt").exists());
}

#[test]
fn test_extract_unknown_type_rejected() {
    let temp = TempDir::new().expect("failed to create temp dir");
    let artifact = sample_tar_gz(temp.path());

    unpack_cmd()
        .arg("extract")
        .arg("--type")
        .arg("tarball")
        .arg(&artifact)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown strategy 'tarball'"));
}

#[test]
fn test_type_conflicts_with_nested() {
    let temp = TempDir::new().expect("failed to create temp dir");
    let artifact = sample_tar_gz(temp.path());

    unpack_cmd()
        .arg("extract")
        .arg("--type")
        .arg("tar")
        .arg("--nested")
        .arg(&artifact)
        .assert()
        .failure();
}

#[test]
fn test_extract_unsupported_format_hint() {
    let temp = TempDir::new().expect("failed to create temp dir");
    let artifact = write_fixture(temp.path(), "empty.bin", b"");
    let out = temp.path().join("out");

    unpack_cmd()
        .arg("extract")
        .arg(&artifact)
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Format not recognized"))
        .stderr(predicate::str::contains("HINT"));

    assert!(!out.exists());
}

#[test]
fn test_extract_missing_artifact_fails() {
    let temp = TempDir::new().expect("failed to create temp dir");

    unpack_cmd()
        .arg("extract")
        .arg(temp.path().join("missing.tar.gz"))
        .arg(temp.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.tar.gz"));
}

#[test]
fn test_detect_by_content() {
    let temp = TempDir::new().expect("failed to create temp dir");
    let artifact = sample_tar_gz(temp.path());

    unpack_cmd()
        .arg("--quiet")
        .arg("detect")
        .arg(&artifact)
        .assert()
        .success()
        .stdout("tar\n");
}

#[test]
fn test_detect_prioritize_extension() {
    let temp = TempDir::new().expect("failed to create temp dir");
    let jar = ZipTestBuilder::new().add_file("a.txt", b"a").build();
    let artifact = write_fixture(temp.path(), "lib.jar", &jar);

    unpack_cmd()
        .arg("--quiet")
        .arg("detect")
        .arg(&artifact)
        .assert()
        .success()
        .stdout("zip\n");

    unpack_cmd()
        .arg("--quiet")
        .arg("detect")
        .arg("--prioritize-extension")
        .arg(&artifact)
        .assert()
        .success()
        .stdout("jar\n");
}

#[test]
fn test_detect_json_lists_candidates() {
    let temp = TempDir::new().expect("failed to create temp dir");
    let artifact = sample_tar_gz(temp.path());

    let output = unpack_cmd()
        .arg("--json")
        .arg("detect")
        .arg("--all")
        .arg(&artifact)
        .output()
        .unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["operation"], "detect");
    assert_eq!(json["data"]["kind"], "tar");
    let candidates = json["data"]["candidates"].as_array().unwrap();
    assert_eq!(candidates[0]["kind"], "tar");
    assert_eq!(candidates[0]["basis"], "both");
}

#[test]
fn test_detect_directory() {
    let temp = TempDir::new().expect("failed to create temp dir");
    let dir = temp.path().join("payload");
    std::fs::create_dir(&dir).unwrap();
    std::fs::write(dir.join("file.txt"), b"x").unwrap();

    unpack_cmd()
        .arg("--quiet")
        .arg("detect")
        .arg(&dir)
        .assert()
        .success()
        .stdout("directory\n");
}

#[test]
fn test_detect_unsupported_json_error() {
    let temp = TempDir::new().expect("failed to create temp dir");
    let artifact = write_fixture(temp.path(), "empty.bin", b"");

    let output = unpack_cmd()
        .arg("--json")
        .arg("detect")
        .arg(&artifact)
        .output()
        .unwrap();
    assert!(!output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["status"], "error");
    assert!(json["error"].as_str().unwrap().contains("empty.bin"));
}

#[test]
fn test_completion_bash() {
    unpack_cmd()
        .arg("completion")
        .arg("bash")
        .assert()
        .success()
        .stdout(predicate::str::contains("unpack"));
}
