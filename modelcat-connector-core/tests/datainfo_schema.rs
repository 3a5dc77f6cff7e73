use modelcat_connector_core::schemas::{
    DatasetInfo, DatasetInfos, FeatureType, SchemaError, TaskKind,
};
use serde_json::{json, Value};

fn minimal_splits() -> Value {
    json!({
        "train": { "name": "train", "dataset_name": "coco_train.json", "num_examples": 100, "num_bytes": 1234 },
        "validation": { "name": "validation", "dataset_name": "coco_val.json", "num_examples": 20, "num_bytes": 234 },
        "test": { "name": "test", "dataset_name": "coco_test.json", "num_examples": 20, "num_bytes": 345 }
    })
}

fn with_template(template: Value) -> Value {
    json!({ "task_templates": [template], "splits": minimal_splits() })
}

fn issues(value: Value) -> Vec<String> {
    DatasetInfo::from_value(value)
        .err()
        .map(|e| e.issues())
        .unwrap_or_default()
}

#[test]
fn minimal_templates_parse() {
    let info =
        DatasetInfo::from_value(with_template(json!({ "task": "classification", "labels": ["cat", "dog"] })))
            .unwrap();
    let task = info.task().unwrap();
    assert_eq!(task.task, TaskKind::Classification);
    assert_eq!(task.labels, vec!["cat", "dog"]);
    assert_eq!(info.splits["validation"].dataset_name, "coco_val.json");

    let info =
        DatasetInfo::from_value(with_template(json!({ "task": "detection", "labels": ["person"] })))
            .unwrap();
    assert_eq!(info.task().unwrap().task, TaskKind::Detection);
}

#[test]
fn keypoints_need_a_positive_count() {
    for template in [
        json!({ "task": "keypoints", "labels": ["person"] }),
        json!({ "task": "keypoints", "labels": ["person"], "num_keypoints": 0 }),
        json!({ "task": "keypoints", "labels": ["person"], "num_keypoints": -3 }),
    ] {
        let found = issues(with_template(template));
        assert!(found.iter().any(|i| i.contains("num_keypoints")), "{found:?}");
    }
    assert!(issues(with_template(
        json!({ "task": "keypoints", "labels": ["person"], "num_keypoints": 17 })
    ))
    .is_empty());
}

#[test]
fn listed_annotation_fields_must_cover_the_task() {
    let cases = [
        (json!({ "task": "classification", "labels": ["x"], "annotations": ["id"] }), false),
        (json!({ "task": "detection", "labels": ["x"], "annotations": ["category_id"] }), false),
        (
            json!({ "task": "keypoints", "labels": ["x"], "num_keypoints": 5, "annotations": ["bbox", "category_id"] }),
            false,
        ),
        (
            json!({ "task": "keypoints", "labels": ["x"], "num_keypoints": 5,
                    "annotations": ["category_id", "bbox", "keypoints", "id", "area"] }),
            true,
        ),
    ];
    for (template, ok) in cases {
        assert_eq!(issues(with_template(template.clone())).is_empty(), ok, "{template}");
    }
}

#[test]
fn unknown_task_is_a_parse_error() {
    let err = DatasetInfo::from_value(with_template(json!({ "task": "segmentation", "labels": ["x"] })))
        .unwrap_err();
    assert!(matches!(err, SchemaError::Parse(_)));
}

#[test]
fn exactly_one_task_template() {
    let none = json!({ "task_templates": [], "splits": minimal_splits() });
    assert!(issues(none)
        .iter()
        .any(|i| i == "task_templates must contain exactly one element"));

    let two = json!({
        "task_templates": [
            { "task": "detection", "labels": ["a"] },
            { "task": "classification", "labels": ["b"] }
        ],
        "splits": minimal_splits()
    });
    assert!(!issues(two).is_empty());
}

#[test]
fn required_splits_are_enforced() {
    let mut payload = with_template(json!({ "task": "classification", "labels": ["x"] }));
    payload["splits"].as_object_mut().unwrap().remove("test");
    let found = issues(payload);
    assert!(found.iter().any(|i| i.contains("missing: [\"test\"]")), "{found:?}");

    let mut payload = with_template(json!({ "task": "classification", "labels": ["x"] }));
    payload["splits"] = json!({});
    assert!(issues(payload).iter().any(|i| i.contains("non-empty mapping")));

    let mut payload = with_template(json!({ "task": "classification", "labels": ["x"] }));
    payload["splits"] = json!(["train", "validation", "test"]);
    assert!(matches!(
        DatasetInfo::from_value(payload),
        Err(SchemaError::Parse(_))
    ));

    let mut payload = with_template(json!({ "task": "classification", "labels": ["x"] }));
    payload["splits"]["train"]
        .as_object_mut()
        .unwrap()
        .remove("dataset_name");
    assert!(matches!(
        DatasetInfo::from_value(payload),
        Err(SchemaError::Parse(_))
    ));
}

#[test]
fn nested_features_are_typed() {
    let mut payload = with_template(json!({ "task": "keypoints", "labels": ["person"], "num_keypoints": 2 }));
    payload["features"] = json!({
        "image": { "_type": "Image" },
        "labels": {
            "_type": "Sequence",
            "objects_bbox": { "_type": "BBoxFeature" },
            "objects_label": { "num_classes": 1, "names": ["person"], "_type": "ClassLabel" },
            "objects_keypoint": {
                "_type": "Sequence",
                "objects_label": { "num_classes": 2, "names": ["nose", "eye"], "_type": "ClassLabel" }
            }
        }
    });
    let info = DatasetInfo::from_value(payload.clone()).unwrap();
    let features = info.features.as_ref().unwrap();
    assert_eq!(features.image.as_ref().unwrap().kind, FeatureType::Image);
    let labels = features.class_labels();
    assert_eq!(labels.len(), 2);
    assert_eq!(labels[1].names.as_deref(), Some(&["nose".to_string(), "eye".to_string()][..]));

    payload["features"]["image"]["_type"] = json!("Text");
    assert!(issues(payload)
        .iter()
        .any(|i| i.contains("features.image must have _type Image")));
}

#[test]
fn dataset_infos_keep_file_order_and_prefix_issues() {
    let entry = with_template(json!({ "task": "detection", "labels": ["a"] }));
    let json = json!({ "zeta": entry.clone(), "alpha": entry }).to_string();
    let infos = DatasetInfos::parse_str(&json).unwrap();
    assert_eq!(infos.len(), 2);
    assert_eq!(infos.first().unwrap().0, "zeta");
    assert_eq!(infos.names().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
    assert!(infos.get("alpha").is_some());

    let bad = json!({ "broken": { "task_templates": [], "splits": minimal_splits() } });
    let err = DatasetInfos::from_value(bad).unwrap_err();
    assert!(err.issues()[0].starts_with("`broken`: "));

    assert!(DatasetInfos::from_value(json!([1, 2])).is_err());
}
