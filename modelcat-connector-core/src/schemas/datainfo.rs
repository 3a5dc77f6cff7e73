//! `dataset_infos.json`: dataset-level metadata, splits and the task template.

use super::{into_result, SchemaError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Splits every dataset must declare. Extra splits are allowed.
pub const REQUIRED_SPLITS: [&str; 3] = ["train", "validation", "test"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Classification,
    Detection,
    Keypoints,
}

impl TaskKind {
    /// Annotation fields a task template must list when it lists any.
    pub fn required_annotation_fields(&self) -> &'static [&'static str] {
        match self {
            TaskKind::Classification => &["category_id"],
            TaskKind::Detection => &["bbox", "category_id"],
            TaskKind::Keypoints => &["bbox", "category_id", "keypoints"],
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::Classification => "classification",
            TaskKind::Detection => "detection",
            TaskKind::Keypoints => "keypoints",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub task: TaskKind,
    pub labels: Vec<String>,
    #[serde(default)]
    pub num_keypoints: Option<i64>,
    #[serde(default)]
    pub annotations: Option<Vec<String>>,
}

impl TaskTemplate {
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.task == TaskKind::Keypoints && !matches!(self.num_keypoints, Some(n) if n > 0) {
            issues.push(
                "For task='keypoints', num_keypoints must be a positive integer.".to_string(),
            );
        }
        if let Some(fields) = &self.annotations {
            let required = self.task.required_annotation_fields();
            let missing: Vec<&str> = required
                .iter()
                .copied()
                .filter(|field| !fields.iter().any(|f| f == field))
                .collect();
            if !missing.is_empty() {
                issues.push(format!(
                    "For task='{}', annotations must include {:?}; missing: {:?}",
                    self.task, required, missing
                ));
            }
        }
        issues
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitInfo {
    pub name: String,
    /// Annotation file describing the split, e.g. `coco_train.json`.
    pub dataset_name: String,
    #[serde(default)]
    pub num_examples: Option<u64>,
    #[serde(default)]
    pub num_bytes: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureType {
    Image,
    Text,
    BBoxFeature,
    ClassLabel,
    Sequence,
}

/// A feature declaration that only carries its type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDecl {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(rename = "_type")]
    pub kind: FeatureType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassLabel {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub num_classes: Option<u64>,
    #[serde(default)]
    pub names: Option<Vec<String>>,
    #[serde(rename = "_type")]
    pub kind: FeatureType,
}

/// A per-image list of objects; nested fields describe what each object carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceFeature {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(rename = "_type")]
    pub kind: FeatureType,
    #[serde(default)]
    pub objects_bbox: Option<FeatureDecl>,
    #[serde(default)]
    pub objects_label: Option<ClassLabel>,
    #[serde(default)]
    pub objects_keypoint: Option<Box<SequenceFeature>>,
}

impl SequenceFeature {
    fn validate(&self, at: &str, issues: &mut Vec<String>) {
        expect_kind(at, self.kind, FeatureType::Sequence, issues);
        if let Some(bbox) = &self.objects_bbox {
            expect_kind(
                &format!("{at}.objects_bbox"),
                bbox.kind,
                FeatureType::BBoxFeature,
                issues,
            );
        }
        if let Some(label) = &self.objects_label {
            expect_kind(
                &format!("{at}.objects_label"),
                label.kind,
                FeatureType::ClassLabel,
                issues,
            );
        }
        if let Some(nested) = &self.objects_keypoint {
            nested.validate(&format!("{at}.objects_keypoint"), issues);
        }
    }
}

fn expect_kind(at: &str, found: FeatureType, expected: FeatureType, issues: &mut Vec<String>) {
    if found != expected {
        issues.push(format!(
            "features.{at} must have _type {expected:?}, got {found:?}"
        ));
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Features {
    #[serde(default)]
    pub image: Option<FeatureDecl>,
    #[serde(default)]
    pub labels: Option<SequenceFeature>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Features {
    fn validate(&self, issues: &mut Vec<String>) {
        if let Some(image) = &self.image {
            expect_kind("image", image.kind, FeatureType::Image, issues);
        }
        if let Some(labels) = &self.labels {
            labels.validate("labels", issues);
        }
    }

    /// Every `ClassLabel` declared anywhere in the feature tree, including
    /// loosely typed extra features.
    pub fn class_labels(&self) -> Vec<ClassLabel> {
        fn from_sequence(seq: &SequenceFeature, out: &mut Vec<ClassLabel>) {
            if let Some(label) = &seq.objects_label {
                out.push(label.clone());
            }
            if let Some(nested) = &seq.objects_keypoint {
                from_sequence(nested, out);
            }
        }
        fn from_value(value: &Value, out: &mut Vec<ClassLabel>) {
            if let Value::Object(map) = value {
                if map.get("_type").and_then(Value::as_str) == Some("ClassLabel") {
                    if let Ok(label) = serde_json::from_value::<ClassLabel>(value.clone()) {
                        out.push(label);
                    }
                }
                for nested in map.values() {
                    from_value(nested, out);
                }
            }
        }

        let mut out = Vec::new();
        if let Some(labels) = &self.labels {
            from_sequence(labels, &mut out);
        }
        for value in self.extra.values() {
            from_value(value, &mut out);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub task_templates: Vec<TaskTemplate>,
    pub splits: BTreeMap<String, SplitInfo>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub citation: String,
    #[serde(default)]
    pub homepage: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub features: Option<Features>,
    #[serde(default)]
    pub post_processed: Option<Value>,
    #[serde(default)]
    pub supervised_keys: Option<Value>,
    #[serde(default)]
    pub builder_name: Option<String>,
    #[serde(default)]
    pub config_name: Option<String>,
    #[serde(default)]
    pub version: Option<Map<String, Value>>,
    #[serde(default)]
    pub download_size: Option<u64>,
    #[serde(default)]
    pub post_processing_size: Option<u64>,
    #[serde(default)]
    pub dataset_size: Option<u64>,
    #[serde(default)]
    pub size_in_bytes: Option<u64>,
}

impl DatasetInfo {
    pub fn from_value(value: Value) -> Result<Self, SchemaError> {
        let info: DatasetInfo = serde_json::from_value(value)?;
        let issues = info.validate();
        into_result(info, issues)
    }

    pub fn parse_str(json: &str) -> Result<Self, SchemaError> {
        Self::from_value(serde_json::from_str(json)?)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.task_templates.len() != 1 {
            issues.push("task_templates must contain exactly one element".to_string());
        }
        for template in &self.task_templates {
            issues.extend(template.validate());
        }

        if self.splits.is_empty() {
            issues.push(
                "`splits` must be a non-empty mapping with keys: 'train', 'validation', 'test'."
                    .to_string(),
            );
        } else {
            let missing: Vec<&str> = REQUIRED_SPLITS
                .iter()
                .copied()
                .filter(|split| !self.splits.contains_key(*split))
                .collect();
            if !missing.is_empty() {
                issues.push(format!(
                    "splits must include {REQUIRED_SPLITS:?}; missing: {missing:?}"
                ));
            }
        }

        if let Some(features) = &self.features {
            features.validate(&mut issues);
        }
        issues
    }

    /// The single task template of a valid dataset.
    pub fn task(&self) -> Option<&TaskTemplate> {
        self.task_templates.first()
    }
}

/// The whole `dataset_infos.json` file: dataset name to metadata, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetInfos {
    entries: Vec<(String, DatasetInfo)>,
}

impl DatasetInfos {
    pub fn from_value(value: Value) -> Result<Self, SchemaError> {
        let Value::Object(map) = value else {
            return Err(SchemaError::Invalid(vec![
                "dataset_infos must be a JSON object mapping dataset names to metadata"
                    .to_string(),
            ]));
        };
        let mut entries = Vec::with_capacity(map.len());
        let mut issues = Vec::new();
        for (name, raw) in map {
            match DatasetInfo::from_value(raw) {
                Ok(info) => entries.push((name, info)),
                Err(e) => issues.extend(e.issues().into_iter().map(|i| format!("`{name}`: {i}"))),
            }
        }
        into_result(DatasetInfos { entries }, issues)
    }

    pub fn parse_str(json: &str) -> Result<Self, SchemaError> {
        Self::from_value(serde_json::from_str(json)?)
    }

    pub fn get(&self, name: &str) -> Option<&DatasetInfo> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, info)| info)
    }

    pub fn first(&self) -> Option<(&str, &DatasetInfo)> {
        self.entries
            .first()
            .map(|(name, info)| (name.as_str(), info))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
