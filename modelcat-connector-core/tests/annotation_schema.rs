use modelcat_connector_core::schemas::{CocoDataset, SchemaError};
use serde_json::{json, Value};

fn base() -> Value {
    json!({
        "info": { "year": "2025", "version": "1.0" },
        "licenses": [{ "id": 1, "name": "MIT" }],
        "categories": [{ "id": 1, "name": "cat", "supercategory": "animal" }],
        "images": [{ "id": 1, "file_name": "img_0001.jpg", "license": 1 }],
        "annotations": [{
            "id": 1,
            "image_id": 1,
            "category_id": 1,
            "bbox": [],
            "segmentation": null,
            "iscrowd": null,
            "area": null,
            "keypoints": null,
            "num_keypoints": null
        }]
    })
}

fn keypoint_base(k: usize) -> Value {
    let names: Vec<String> = (0..k).map(|i| format!("k{i}")).collect();
    let keypoints: Vec<i64> = (0..k).flat_map(|_| [0, 0, 2]).collect();
    json!({
        "info": { "year": "2025" },
        "licenses": [{ "id": 1 }],
        "categories": [{ "id": 1, "name": "person", "supercategory": "person", "keypoints": names }],
        "images": [{ "id": 1, "file_name": "img.jpg", "license": 1, "width": 100, "height": 100 }],
        "annotations": [{
            "id": 1,
            "image_id": 1,
            "category_id": 1,
            "keypoints": keypoints,
            "num_keypoints": k,
            "bbox": [],
            "iscrowd": 0
        }]
    })
}

fn issues(value: Value) -> Vec<String> {
    match CocoDataset::from_value(value) {
        Ok(_) => Vec::new(),
        Err(e) => e.issues(),
    }
}

fn assert_issue(value: Value, needle: &str) {
    let found = issues(value);
    assert!(
        found.iter().any(|i| i.contains(needle)),
        "expected an issue containing {needle:?}, got {found:?}"
    );
}

#[test]
fn minimal_datasets_are_valid() {
    let coco = CocoDataset::from_value(base()).unwrap();
    assert_eq!(coco.category_names(), vec!["cat"]);
    assert_eq!(coco.annotations[0].segmentation, vec![Vec::<f64>::new()]);
    assert!(coco.annotations[0].bbox.is_empty());

    let kp = CocoDataset::from_value(keypoint_base(4)).unwrap();
    assert_eq!(kp.categories[0].keypoint_count(), Some(4));
    assert_eq!(kp.annotations[0].visible_keypoints(), 4);
}

#[test]
fn wrongly_typed_fields_fail_to_parse() {
    let mut ds = base();
    ds["categories"][0]["keypoints"] = json!("nose");
    assert!(matches!(
        CocoDataset::from_value(ds),
        Err(SchemaError::Parse(_))
    ));

    let mut ds = base();
    ds["annotations"][0]["bbox"] = json!(["a", 1, 2, 3]);
    assert!(matches!(
        CocoDataset::from_value(ds),
        Err(SchemaError::Parse(_))
    ));
}

#[test]
fn category_keypoint_and_skeleton_rules() {
    let mut ds = base();
    ds["categories"][0]["keypoints"] = json!(["nose", " "]);
    assert_issue(ds, "keypoints entries must be non-empty strings");

    let mut ds = keypoint_base(3);
    ds["categories"][0]["skeleton"] = json!([[1, 2, 3]]);
    assert_issue(ds, "2-item list");

    let mut ds = keypoint_base(3);
    ds["categories"][0]["skeleton"] = json!([[0, 1]]);
    assert_issue(ds, "must be 1-based");

    let mut ds = keypoint_base(3);
    ds["categories"][0]["skeleton"] = json!([[1, 4]]);
    assert_issue(ds, "out of range for 3 keypoints");
}

#[test]
fn image_rules() {
    let mut ds = base();
    ds["images"][0]["license"] = json!(7);
    assert_issue(ds, "unknown license id=7");

    let mut ds = base();
    ds["images"][0]["file_name"] = json!("  ");
    assert_issue(ds, "non-empty 'file_name'");

    let mut ds = base();
    ds["images"]
        .as_array_mut()
        .unwrap()
        .push(json!({ "id": 2, "file_name": "img_0001.jpg" }));
    assert_issue(ds, "Duplicate image file_name(s): [\"img_0001.jpg\"]");
}

#[test]
fn bbox_rules() {
    let mut ds = base();
    ds["annotations"][0]["bbox"] = json!([1, 2, 3]);
    assert_issue(ds, "bbox must have 4 elements");

    let mut ds = base();
    ds["annotations"][0]["bbox"] = json!([1, -2, 3, 4]);
    assert_issue(ds, "bbox values must be non-negative");

    let mut ds = base();
    ds["annotations"][0]["bbox"] = Value::Null;
    assert!(issues(ds).is_empty());
}

#[test]
fn keypoint_annotation_rules() {
    let mut ds = base();
    ds["annotations"][0]["keypoints"] = json!([1, 2]);
    assert_issue(ds, "flat list of length 3*K");

    let mut ds = base();
    ds["annotations"][0]["keypoints"] = json!([1, 2, 3]);
    assert_issue(ds, "visibility values must be 0,1,2; got 3");

    let mut ds = base();
    ds["annotations"][0]["keypoints"] = json!([5, 0, 0]);
    assert_issue(ds, "When visibility v=0, keypoint coordinates must be (0,0).");

    let mut ds = base();
    ds["annotations"][0]["keypoints"] = json!([-1, 0, 2]);
    assert_issue(ds, "Visible keypoints must have non-negative coordinates.");

    let mut ds = base();
    ds["annotations"][0]["iscrowd"] = json!(2);
    assert_issue(ds, "iscrowd must be integer 0 or 1");
}

#[test]
fn duplicate_ids_are_reported_per_collection() {
    let mut ds = base();
    ds["licenses"].as_array_mut().unwrap().push(json!({ "id": 1 }));
    assert_issue(ds, "Duplicate license id(s): [1]");

    let mut ds = base();
    ds["images"]
        .as_array_mut()
        .unwrap()
        .push(json!({ "id": 1.0, "file_name": "other.jpg" }));
    assert_issue(ds, "Duplicate image id(s): [1]");

    let mut ds = base();
    ds["annotations"]
        .as_array_mut()
        .unwrap()
        .push(json!({ "id": "1", "image_id": 1, "category_id": 1 }));
    // "1" and 1 are different ids
    assert!(issues(ds).is_empty());
}

#[test]
fn categories_are_unique_and_contiguous() {
    let mut ds = base();
    ds["categories"]
        .as_array_mut()
        .unwrap()
        .push(json!({ "id": 2, "name": "cat", "supercategory": "animal" }));
    assert_issue(ds, "Duplicate category name(s) found: [\"cat\"]");

    let mut ds = base();
    ds["categories"][0]["id"] = json!(2);
    ds["annotations"][0]["category_id"] = json!(2);
    assert_issue(ds, "contiguous starting at 1");
}

#[test]
fn references_must_resolve() {
    let mut ds = base();
    ds["annotations"][0]["image_id"] = json!(42);
    assert_issue(ds, "references unknown image_id=42");

    let mut ds = base();
    ds["annotations"][0]["category_id"] = json!(9);
    assert_issue(ds, "references unknown category_id=9");
}

#[test]
fn keypointed_categories_constrain_annotations() {
    let mut ds = keypoint_base(4);
    ds["annotations"][0]["keypoints"] = Value::Null;
    assert_issue(ds, "must include 'keypoints'");

    let mut ds = keypoint_base(4);
    ds["annotations"][0]["keypoints"] = json!([0, 0, 2, 0, 0, 2]);
    assert_issue(ds, "keypoints length must be 12 (got 6).");

    let mut ds = keypoint_base(4);
    ds["annotations"][0]["num_keypoints"] = json!(3);
    assert_issue(ds, "num_keypoints=3 but computed visible=4.");
}

#[test]
fn parse_str_reports_syntax_errors() {
    assert!(matches!(
        CocoDataset::parse_str("{ not json"),
        Err(SchemaError::Parse(_))
    ));
}
