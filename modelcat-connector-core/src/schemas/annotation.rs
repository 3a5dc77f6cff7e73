//! COCO-style annotation files (`annotations/coco_<split>.json`).
//!
//! Image paths are not checked here; resolving `file_name` against the
//! dataset root is the validator's job.

use super::{into_result, null_as_default, SchemaError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

/// Image and annotation ids may be integers, floats or strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Hashable identity of a [`RecordId`]: `1` and `1.0` are the same id, `"1"` is not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdKey {
    Num(String),
    Text(String),
}

impl RecordId {
    pub fn key(&self) -> IdKey {
        match self {
            RecordId::Int(i) => IdKey::Num(i.to_string()),
            RecordId::Float(f) if f.is_finite() && f.fract() == 0.0 => {
                IdKey::Num((*f as i64).to_string())
            }
            RecordId::Float(f) => IdKey::Num(f.to_string()),
            RecordId::Text(s) => IdKey::Text(s.clone()),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(i) => write!(f, "{i}"),
            RecordId::Float(x) => write!(f, "{x}"),
            RecordId::Text(s) => write!(f, "{s:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct License {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub supercategory: String,
    /// Keypoint labels; annotations of this category then carry `3 * K` values.
    #[serde(default)]
    pub keypoints: Option<Vec<String>>,
    /// 1-based `[from, to]` keypoint connections.
    #[serde(default)]
    pub skeleton: Option<Vec<Vec<i64>>>,
}

impl Category {
    /// Number of keypoints annotations of this category must carry, if any.
    pub fn keypoint_count(&self) -> Option<usize> {
        self.keypoints
            .as_ref()
            .map(Vec::len)
            .filter(|count| *count > 0)
    }

    fn validate(&self, issues: &mut Vec<String>) {
        if let Some(keypoints) = &self.keypoints {
            if keypoints.iter().any(|k| k.trim().is_empty()) {
                issues.push(format!(
                    "[category id={}] keypoints entries must be non-empty strings.",
                    self.id
                ));
            }
        }
        let Some(skeleton) = &self.skeleton else {
            return;
        };
        if skeleton.iter().any(|pair| pair.len() != 2) {
            issues.push(format!(
                "[category id={}] each skeleton entry must be a 2-item list [i, j].",
                self.id
            ));
            return;
        }
        let num_kp = self.keypoint_count();
        for pair in skeleton {
            let (i, j) = (pair[0], pair[1]);
            if i < 1 || j < 1 {
                issues.push(format!(
                    "[category id={}] skeleton indices must be 1-based; got [{i}, {j}] (indices must be >= 1).",
                    self.id
                ));
            } else if let Some(n) = num_kp {
                if i as usize > n || j as usize > n {
                    issues.push(format!(
                        "[category id={}] skeleton indices out of range for {n} keypoints; got [{i}, {j}] (must be <= {n}).",
                        self.id
                    ));
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: RecordId,
    pub file_name: String,
    #[serde(default)]
    pub height: Option<u64>,
    #[serde(default)]
    pub width: Option<u64>,
    #[serde(default)]
    pub license: Option<i64>,
    #[serde(default)]
    pub date_captured: Option<String>,
    #[serde(default)]
    pub coco_url: Option<String>,
    #[serde(default)]
    pub flickr_url: Option<String>,
}

fn empty_segmentation() -> Vec<Vec<f64>> {
    vec![Vec::new()]
}

fn segmentation_or_empty<'de, D>(deserializer: D) -> Result<Vec<Vec<f64>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<Vec<f64>>>::deserialize(deserializer)?.unwrap_or_else(empty_segmentation))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: RecordId,
    pub image_id: RecordId,
    pub category_id: i64,
    /// `[x, y, width, height]`, or empty when the task has no boxes.
    #[serde(default, deserialize_with = "null_as_default")]
    pub bbox: Vec<f64>,
    #[serde(
        default = "empty_segmentation",
        deserialize_with = "segmentation_or_empty"
    )]
    pub segmentation: Vec<Vec<f64>>,
    #[serde(default)]
    pub iscrowd: Option<i64>,
    #[serde(default)]
    pub area: Option<f64>,
    /// Flat `[x0, y0, v0, x1, y1, v1, ...]` with visibility `v` in `{0, 1, 2}`.
    #[serde(default)]
    pub keypoints: Option<Vec<f64>>,
    #[serde(default)]
    pub num_keypoints: Option<i64>,
}

impl Annotation {
    /// Keypoints with visibility greater than zero.
    pub fn visible_keypoints(&self) -> usize {
        self.keypoints
            .as_ref()
            .map(|kp| kp.chunks_exact(3).filter(|t| t[2].trunc() as i64 > 0).count())
            .unwrap_or(0)
    }

    fn validate(&self, issues: &mut Vec<String>) {
        let ann_id = &self.id;
        if !self.bbox.is_empty() {
            if self.bbox.len() != 4 {
                issues.push(format!(
                    "[ann id={ann_id}] bbox must have 4 elements [x, y, width, height] when provided."
                ));
            } else if self.bbox.iter().any(|v| *v < 0.0) {
                issues.push(format!("[ann id={ann_id}] bbox values must be non-negative."));
            }
        }

        if let Some(keypoints) = &self.keypoints {
            if keypoints.len() % 3 != 0 {
                issues.push(format!(
                    "[ann id={ann_id}] keypoints must be a flat list of length 3*K: [x0,y0,v0,...]."
                ));
            } else {
                for triplet in keypoints.chunks_exact(3) {
                    let (x, y, vis) = (triplet[0], triplet[1], triplet[2].trunc() as i64);
                    let problem = if !(0..=2).contains(&vis) {
                        Some(format!(
                            "[ann id={ann_id}] keypoints visibility values must be 0,1,2; got {vis}. \
                             keypoints format must be [x0,y0,v0,...]."
                        ))
                    } else if vis == 0 && (x != 0.0 || y != 0.0) {
                        Some(format!(
                            "[ann id={ann_id}] When visibility v=0, keypoint coordinates must be (0,0)."
                        ))
                    } else if vis > 0 && (x < 0.0 || y < 0.0) {
                        Some(format!(
                            "[ann id={ann_id}] Visible keypoints must have non-negative coordinates."
                        ))
                    } else {
                        None
                    };
                    if let Some(problem) = problem {
                        issues.push(problem);
                        break;
                    }
                }
            }
        }

        if let Some(iscrowd) = self.iscrowd {
            if iscrowd != 0 && iscrowd != 1 {
                issues.push(format!(
                    "[ann id={ann_id}] iscrowd must be integer 0 or 1 when provided."
                ));
            }
        }
    }
}

/// A complete annotation file for one split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoDataset {
    #[serde(default)]
    pub info: Option<Map<String, Value>>,
    #[serde(default)]
    pub licenses: Option<Vec<License>>,
    pub categories: Vec<Category>,
    pub images: Vec<Image>,
    pub annotations: Vec<Annotation>,
}

/// Values occurring more than once, each reported once, sorted.
fn find_dupes<T, I>(items: I) -> Vec<T>
where
    T: Clone + Eq + Hash + Ord,
    I: IntoIterator<Item = T>,
{
    let mut seen = HashSet::new();
    let mut dupes = BTreeSet::new();
    for item in items {
        if !seen.insert(item.clone()) {
            dupes.insert(item);
        }
    }
    dupes.into_iter().collect()
}

fn describe_keys(keys: &[IdKey]) -> String {
    let parts: Vec<String> = keys
        .iter()
        .map(|k| match k {
            IdKey::Num(n) => n.clone(),
            IdKey::Text(s) => format!("{s:?}"),
        })
        .collect();
    format!("[{}]", parts.join(", "))
}

impl CocoDataset {
    pub fn from_value(value: Value) -> Result<Self, SchemaError> {
        let dataset: CocoDataset = serde_json::from_value(value)?;
        let issues = dataset.validate();
        into_result(dataset, issues)
    }

    pub fn parse_str(json: &str) -> Result<Self, SchemaError> {
        Self::from_value(serde_json::from_str(json)?)
    }

    /// Field rules plus cross-record uniqueness and reference integrity.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        for category in &self.categories {
            category.validate(&mut issues);
        }
        for annotation in &self.annotations {
            annotation.validate(&mut issues);
        }

        let licenses = self.licenses.as_deref().unwrap_or_default();

        let dupe_names = find_dupes(self.categories.iter().map(|c| c.name.clone()));
        if !dupe_names.is_empty() {
            issues.push(format!("Duplicate category name(s) found: {dupe_names:?}"));
        }

        let expected_ids: Vec<i64> = (1..=self.categories.len() as i64).collect();
        let mut actual_ids: Vec<i64> = self.categories.iter().map(|c| c.id).collect();
        actual_ids.sort_unstable();
        if actual_ids != expected_ids {
            issues.push(format!(
                "Category ids must be contiguous starting at 1; expected {expected_ids:?}, got {actual_ids:?}"
            ));
        }

        let dupes = find_dupes(licenses.iter().map(|l| l.id));
        if !dupes.is_empty() {
            issues.push(format!("Duplicate license id(s): {dupes:?}"));
        }
        let dupes = find_dupes(self.categories.iter().map(|c| c.id));
        if !dupes.is_empty() {
            issues.push(format!("Duplicate category id(s): {dupes:?}"));
        }
        let dupes = find_dupes(self.images.iter().map(|i| i.id.key()));
        if !dupes.is_empty() {
            issues.push(format!("Duplicate image id(s): {}", describe_keys(&dupes)));
        }
        let dupes = find_dupes(self.annotations.iter().map(|a| a.id.key()));
        if !dupes.is_empty() {
            issues.push(format!(
                "Duplicate annotation id(s): {}",
                describe_keys(&dupes)
            ));
        }

        let license_ids: HashSet<i64> = licenses.iter().map(|l| l.id).collect();
        let category_kp: HashMap<i64, Option<usize>> = self
            .categories
            .iter()
            .map(|c| (c.id, c.keypoint_count()))
            .collect();
        let image_ids: HashSet<IdKey> = self.images.iter().map(|i| i.id.key()).collect();

        for image in &self.images {
            if let Some(license) = image.license {
                if !license_ids.contains(&license) {
                    issues.push(format!(
                        "Image id={} references unknown license id={license}",
                        image.id
                    ));
                }
            }
        }

        if self.images.iter().any(|i| i.file_name.trim().is_empty()) {
            issues.push("All images must have a non-empty 'file_name' string.".to_string());
        }
        let dupe_files = find_dupes(self.images.iter().map(|i| i.file_name.clone()));
        if !dupe_files.is_empty() {
            issues.push(format!("Duplicate image file_name(s): {dupe_files:?}"));
        }

        for ann in &self.annotations {
            if !image_ids.contains(&ann.image_id.key()) {
                issues.push(format!(
                    "Annotation id={} references unknown image_id={}",
                    ann.id, ann.image_id
                ));
            }
            let Some(expected_k) = category_kp.get(&ann.category_id) else {
                issues.push(format!(
                    "Annotation id={} references unknown category_id={}",
                    ann.id, ann.category_id
                ));
                continue;
            };
            let Some(expected_k) = *expected_k else {
                continue;
            };
            let Some(keypoints) = &ann.keypoints else {
                issues.push(format!(
                    "Annotation id={} (category_id={}) must include 'keypoints'.",
                    ann.id, ann.category_id
                ));
                continue;
            };
            if keypoints.len() / 3 != expected_k || keypoints.len() % 3 != 0 {
                issues.push(format!(
                    "Annotation id={}: keypoints length must be {} (got {}).",
                    ann.id,
                    expected_k * 3,
                    keypoints.len()
                ));
                continue;
            }
            if let Some(declared) = ann.num_keypoints {
                let visible = ann.visible_keypoints();
                if declared != visible as i64 {
                    issues.push(format!(
                        "Annotation id={}: num_keypoints={declared} but computed visible={visible}.",
                        ann.id
                    ));
                }
            }
        }
        issues
    }

    pub fn category_names(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.name.as_str()).collect()
    }
}
