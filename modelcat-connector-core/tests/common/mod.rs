//! Dataset fixtures shared by the integration tests.
#![allow(dead_code)]

use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

pub const SPLITS: [&str; 3] = ["train", "validation", "test"];
pub const DATASET_NAME: &str = "demo-ds";

pub fn write_json(path: &Path, value: &Value) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

pub fn write_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

pub fn dataset_infos(task: Value) -> Value {
    let mut splits = serde_json::Map::new();
    for split in SPLITS {
        splits.insert(
            split.to_string(),
            json!({
                "name": split,
                "dataset_name": format!("coco_{split}.json"),
                "num_examples": 1
            }),
        );
    }
    json!({
        DATASET_NAME: {
            "description": "demo dataset",
            "citation": "",
            "homepage": "",
            "license": "",
            "features": {
                "image": { "_type": "Image" },
                "labels": {
                    "_type": "Sequence",
                    "objects_bbox": { "_type": "BBoxFeature" },
                    "objects_label": { "num_classes": 2, "names": ["cat", "dog"], "_type": "ClassLabel" }
                }
            },
            "task_templates": [task],
            "splits": splits
        }
    })
}

pub fn detection_task() -> Value {
    json!({ "task": "detection", "labels": ["cat", "dog"] })
}

pub fn coco_split(split: &str) -> Value {
    json!({
        "info": { "description": split },
        "categories": [
            { "id": 1, "name": "cat", "supercategory": "animal" },
            { "id": 2, "name": "dog", "supercategory": "animal" }
        ],
        "images": [
            { "id": 1, "file_name": format!("{split}_1.jpg"), "height": 10, "width": 10 }
        ],
        "annotations": [
            { "id": 1, "image_id": 1, "category_id": 1, "bbox": [0, 0, 5, 5] }
        ]
    })
}

pub fn annotation_path(root: &Path, split: &str) -> std::path::PathBuf {
    root.join("annotations").join(format!("coco_{split}.json"))
}

/// A detection dataset that validates without findings.
pub fn clean_dataset() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_json(&root.join("dataset_infos.json"), &dataset_infos(detection_task()));
    for split in SPLITS {
        write_json(&annotation_path(root, split), &coco_split(split));
        write_file(
            &root.join("images").join(format!("{split}_1.jpg")),
            format!("pixels of {split}").as_bytes(),
        );
    }
    write_file(&root.join("thumbnail.jpg"), b"thumbnail pixels");
    dir
}
