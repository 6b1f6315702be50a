use std::path::{Path, PathBuf};

use assert_cmd::Command;
use nayan::{Gpt, Gpt2Config};
use nayan_transformers::weights::save_safetensors;
use predicates::prelude::*;
use tempfile::TempDir;

const TINY_CONFIG: &str = r#"{
    "n_layer": 1,
    "n_head": 2,
    "n_embd": 8,
    "block_size": 4,
    "vocab_size": 13
}"#;

fn fixture(dir: &Path) -> (PathBuf, PathBuf) {
    let config_path = dir.join("config.json");
    std::fs::write(&config_path, TINY_CONFIG).unwrap();

    let config = Gpt2Config::from_json(TINY_CONFIG).unwrap();
    let model = Gpt::with_seed(config, 0).unwrap();
    let checkpoint = dir.join("ckpt.safetensors");
    save_safetensors(&model.state_dict(), None, &checkpoint).unwrap();
    (config_path, checkpoint)
}

fn nayan() -> Command {
    Command::cargo_bin("nayan").unwrap()
}

#[test]
fn test_cli_help() {
    nayan()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"));
}

#[test]
fn test_cli_version() {
    nayan().arg("--version").assert().success();
}

#[test]
fn test_invalid_command() {
    nayan().arg("not-a-command").assert().failure();
}

#[test]
fn test_convert_writes_default_output_path() {
    let dir = TempDir::new().unwrap();
    let (config, checkpoint) = fixture(dir.path());

    nayan()
        .arg("convert")
        .arg(&checkpoint)
        .arg("--config")
        .arg(&config)
        .args(["--seed", "1", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Successfully converted model to"));

    assert!(dir.path().join("ckpt.onnx").is_file());
}

#[test]
fn test_convert_json_output() {
    let dir = TempDir::new().unwrap();
    let (config, checkpoint) = fixture(dir.path());
    let output = dir.path().join("out").join("model.onnx");

    let assert = nayan()
        .arg("convert")
        .arg(&checkpoint)
        .arg("-c")
        .arg(&config)
        .arg("-o")
        .arg(&output)
        .args(["--no-constant-folding", "--strict", "-f", "json"])
        .assert()
        .success();

    let json: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(json["success"], true);
    assert!(json["model_size_mb"].as_f64().unwrap() > 0.0);
    assert!(output.is_file());
}

#[test]
fn test_convert_missing_checkpoint_fails() {
    let dir = TempDir::new().unwrap();
    nayan()
        .arg("convert")
        .arg(dir.path().join("missing.safetensors"))
        .args(["-f", "json"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Input file not found"));
}

#[test]
fn test_convert_bad_config_reports_json_record() {
    let dir = TempDir::new().unwrap();
    let (_, checkpoint) = fixture(dir.path());
    let broken = dir.path().join("broken.json");
    std::fs::write(&broken, r#"{"n_layer": 1, "n_head": 3, "n_embd": 8, "block_size": 4, "vocab_size": 13}"#)
        .unwrap();

    for config in [dir.path().join("absent.json"), broken] {
        let assert = nayan()
            .arg("convert")
            .arg(&checkpoint)
            .arg("-c")
            .arg(&config)
            .args(["-f", "json"])
            .assert()
            .code(1);
        let json: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
        assert_eq!(json["success"], false);
        let message = json["message"].as_str().unwrap();
        assert!(message.starts_with("Failed to create model architecture: "), "{}", message);
        assert!(message.contains(config.file_name().unwrap().to_str().unwrap()), "{}", message);
    }
    assert!(!dir.path().join("ckpt.onnx").exists());
}

#[test]
fn test_convert_rejects_unknown_format() {
    let dir = TempDir::new().unwrap();
    let (_, checkpoint) = fixture(dir.path());
    nayan()
        .arg("convert")
        .arg(&checkpoint)
        .args(["-f", "yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown format"));
}

#[test]
fn test_inspect_missing_file() {
    let dir = TempDir::new().unwrap();
    let assert = nayan()
        .arg("inspect")
        .arg(dir.path().join("none.onnx"))
        .args(["--format", "json"])
        .assert()
        .code(1);
    let json: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"success": false, "message": "Model file not found"})
    );
}

#[test]
fn test_inspect_detailed() {
    let dir = TempDir::new().unwrap();
    let (config, checkpoint) = fixture(dir.path());
    let output = dir.path().join("m.onnx");
    nayan()
        .arg("convert")
        .arg(&checkpoint)
        .arg("-c")
        .arg(&config)
        .arg("-o")
        .arg(&output)
        .arg("-q")
        .assert()
        .success();

    let assert = nayan()
        .arg("inspect")
        .arg(&output)
        .args(["--detailed", "-f", "json"])
        .assert()
        .success();
    let json: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(json["inputs"][0]["name"], "input_ids");
    assert_eq!(json["outputs"][0]["dims"][2], "13");
    assert_eq!(json["opset"], 13);

    nayan()
        .arg("inspect")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("MB"));
}
