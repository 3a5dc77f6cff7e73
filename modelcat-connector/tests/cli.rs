use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const SPLITS: [&str; 3] = ["train", "validation", "test"];

fn write(path: &Path, content: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// A small detection dataset that validates with nothing to report.
fn dataset() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let mut splits = serde_json::Map::new();
    for split in SPLITS {
        splits.insert(
            split.into(),
            json!({ "name": split, "dataset_name": format!("coco_{split}.json"), "num_examples": 1 }),
        );
        let coco = json!({
            "categories": [{ "id": 1, "name": "cat", "supercategory": "animal" }],
            "images": [{ "id": 1, "file_name": format!("{split}.jpg") }],
            "annotations": [{ "id": 1, "image_id": 1, "category_id": 1, "bbox": [0, 0, 1, 1] }]
        });
        write(
            &root.join("annotations").join(format!("coco_{split}.json")),
            coco.to_string().as_bytes(),
        );
        write(
            &root.join("images").join(format!("{split}.jpg")),
            format!("image {split}").as_bytes(),
        );
    }
    let infos = json!({
        "cli-ds": {
            "task_templates": [{ "task": "detection", "labels": ["cat"] }],
            "splits": splits
        }
    });
    write(&root.join("dataset_infos.json"), infos.to_string().as_bytes());
    write(&root.join("thumbnail.jpg"), b"thumb");
    dir
}

fn bin(name: &str) -> Command {
    let mut cmd = Command::cargo_bin(name).expect("binary exists");
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn version_and_help_list_the_tools() {
    bin("modelcat")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));

    bin("modelcat")
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("setup")
                .and(predicate::str::contains("validate"))
                .and(predicate::str::contains("upload")),
        );
}

#[test]
fn validate_signs_a_clean_dataset() {
    let dir = dataset();
    bin("modelcat_validate")
        .arg("--dataset_path")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(
            predicate::str::contains("dataset validation utility")
                .and(predicate::str::is_match("Validation passed and signed: [0-9a-f]{64}").unwrap()),
        );

    let log = fs::read_to_string(dir.path().join("dataset_validator_log.txt")).unwrap();
    assert!(log.contains("Validation passed and signed: "));
}

#[test]
fn validate_warns_about_missing_thumbnail_but_still_signs() {
    let dir = dataset();
    fs::remove_file(dir.path().join("thumbnail.jpg")).unwrap();
    bin("modelcat_validate")
        .arg("--dataset-path")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(
            predicate::str::contains("WARNING: ")
                .and(predicate::str::contains("thumbnail.jpg"))
                .and(predicate::str::contains("Validation passed and signed:")),
        );
}

#[test]
fn validate_subcommand_fails_on_broken_dataset() {
    let dir = dataset();
    fs::remove_file(dir.path().join("images/train.jpg")).unwrap();
    bin("modelcat")
        .args(["validate", "-d"])
        .arg(dir.path())
        .assert()
        .failure()
        .stdout(
            predicate::str::contains("ERROR: ")
                .and(predicate::str::contains("Validation failed"))
                .and(predicate::str::contains("signed").not()),
        )
        .stderr(predicate::str::contains("critical error"));
}

#[test]
fn validate_checks_the_settings_file() {
    let dir = dataset();
    let settings = dir.path().join("settings.yaml");
    fs::write(&settings, "api_url: [unterminated").unwrap();
    bin("modelcat_validate")
        .arg("-d")
        .arg(dir.path())
        .arg("--settings")
        .arg(&settings)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse settings YAML"));

    bin("modelcat_validate")
        .arg("-d")
        .arg(dir.path())
        .arg("--settings")
        .arg(dir.path().join("absent.yaml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read settings file"));
}

#[test]
fn validate_reports_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    bin("modelcat_validate")
        .arg("-d")
        .arg(dir.path().join("missing"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn upload_without_setup_points_at_setup() {
    let dir = dataset();
    let home = tempfile::tempdir().unwrap();
    bin("modelcat_upload")
        .arg("-d")
        .arg(dir.path())
        .env("MODELCAT_HOME", home.path())
        .assert()
        .failure()
        .stdout(predicate::str::contains("dataset upload utility"))
        .stderr(predicate::str::contains("modelcat_setup"));
}

#[test]
fn upload_requires_a_dataset_path() {
    bin("modelcat_upload")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--dataset_path"));
}

#[test]
fn setup_rejects_malformed_group_id_flag() {
    let home = tempfile::tempdir().unwrap();
    let output = bin("modelcat_setup")
        .args(["--group-id", "not-a-uuid"])
        .arg("--token")
        .arg("1_1234567890abcdef1234567890abcdef12345678")
        .env("MODELCAT_HOME", home.path())
        .write_stdin("")
        .output()
        .unwrap();
    // without the AWS CLI the wizard stops earlier; either way it fails and saves nothing
    assert!(!output.status.success());
    assert!(!home.path().join("config.json").exists());
}
