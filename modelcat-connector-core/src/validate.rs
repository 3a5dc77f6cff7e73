//! Dataset validation.
//!
//! Walks the dataset directory, checks `dataset_infos.json`, every split's
//! annotation file and the image files they reference, and collects the
//! problems as findings. Errors are critical and block the upload; warnings
//! are reported and otherwise ignored. A run without errors is signed with
//! the dataset hash.

use crate::hashing::{combine_digests, file_sha256, HashError};
use crate::schemas::{CocoDataset, DatasetInfo, DatasetInfos, TaskKind};
use crate::signature::VALIDATOR_LOG_FILE;
use crate::walk::{collect_files, DatasetFile};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DATASET_INFOS_FILE: &str = "dataset_infos.json";
pub const THUMBNAIL_FILE: &str = "thumbnail.jpg";
pub const ANNOTATIONS_DIR: &str = "annotations";
pub const IMAGES_DIR: &str = "images";

/// Items listed per finding unless running verbose.
const EXAMPLES_SHOWN: usize = 5;

#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("dataset path {0} does not exist")]
    NotFound(PathBuf),
    #[error("dataset path {0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("failed to read dataset directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Hash(#[from] HashError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Warning => write!(f, "WARNING: {}", self.message),
            Severity::Error => write!(f, "ERROR: {}", self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetStats {
    pub files: usize,
    pub bytes: u64,
    pub images: usize,
    pub annotations: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub dataset_name: Option<String>,
    pub findings: Vec<Finding>,
    pub stats: DatasetStats,
    /// Dataset hash, present only when validation passed.
    pub signature: Option<String>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.errors() == 0
    }

    pub fn warnings(&self) -> usize {
        self.count(Severity::Warning)
    }

    pub fn errors(&self) -> usize {
        self.count(Severity::Error)
    }

    fn count(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .count()
    }

    pub fn summary(&self) -> String {
        if self.passed() {
            format!(
                "Validation finished with {} warning(s) and no critical errors.",
                self.warnings()
            )
        } else {
            format!(
                "Validation failed with {} critical error(s) and {} warning(s).",
                self.errors(),
                self.warnings()
            )
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    /// List every offending item instead of a count and a few examples.
    pub verbose: bool,
}

struct Findings {
    verbose: bool,
    items: Vec<Finding>,
}

impl Findings {
    fn push(&mut self, severity: Severity, message: String) {
        debug!(?severity, %message, "Validation finding");
        self.items.push(Finding { severity, message });
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.push(Severity::Warning, message.into());
    }

    fn error(&mut self, message: impl Into<String>) {
        self.push(Severity::Error, message.into());
    }

    /// One finding for a list of offenders, truncated unless verbose.
    fn grouped(&mut self, severity: Severity, headline: &str, items: &[String], sep: &str) {
        if items.is_empty() {
            return;
        }
        let shown = if self.verbose {
            items.len()
        } else {
            items.len().min(EXAMPLES_SHOWN)
        };
        let mut message = format!("{headline}: {}", items[..shown].join(sep));
        if shown < items.len() {
            message.push_str(&format!(
                "{sep}... and {} more (use --verbose to list all)",
                items.len() - shown
            ));
        }
        self.push(severity, message);
    }
}

/// Where an image `file_name` points, relative to the dataset root.
enum ImageLocation {
    Found(String),
    Missing,
    Invalid,
}

/// Normalised `/`-separated form of a relative path, `None` when the path is
/// absolute or leaves the root.
fn relative_key(name: &str) -> Option<String> {
    let path = Path::new(name);
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn locate(name: &str, subdir: &str, files: &HashSet<&str>) -> ImageLocation {
    let Some(key) = relative_key(name) else {
        return ImageLocation::Invalid;
    };
    let nested = format!("{subdir}/{key}");
    if files.contains(key.as_str()) {
        ImageLocation::Found(key)
    } else if files.contains(nested.as_str()) {
        ImageLocation::Found(nested)
    } else {
        ImageLocation::Missing
    }
}

fn same_names(a: &[&str], b: &[String]) -> bool {
    let a: BTreeSet<&str> = a.iter().copied().collect();
    let b: BTreeSet<&str> = b.iter().map(String::as_str).collect();
    a == b
}

pub struct DatasetValidator {
    root: PathBuf,
    options: ValidateOptions,
}

impl DatasetValidator {
    pub fn new(root: impl Into<PathBuf>, options: ValidateOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn validate(&self) -> Result<ValidationReport, ValidateError> {
        let root = &self.root;
        if !root.exists() {
            return Err(ValidateError::NotFound(root.clone()));
        }
        if !root.is_dir() {
            return Err(ValidateError::NotADirectory(root.clone()));
        }
        info!(root = %root.display(), verbose = self.options.verbose, "Validating dataset");

        let files = collect_files(root).map_err(|source| ValidateError::Io {
            path: root.clone(),
            source,
        })?;
        let files: Vec<DatasetFile> = files
            .into_iter()
            .filter(|f| f.relative_path != VALIDATOR_LOG_FILE)
            .collect();
        let file_set: HashSet<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();

        let mut stats = DatasetStats {
            files: files.len(),
            bytes: files.iter().map(|f| f.size).sum(),
            ..DatasetStats::default()
        };
        let mut findings = Findings {
            verbose: self.options.verbose,
            items: Vec::new(),
        };

        if !file_set.contains(THUMBNAIL_FILE) {
            findings.warn(format!(
                "`{THUMBNAIL_FILE}` not found in the dataset root; the dataset will be shown without a thumbnail."
            ));
        }

        let mut referenced: BTreeSet<String> = BTreeSet::new();
        referenced.insert(DATASET_INFOS_FILE.to_string());
        referenced.insert(THUMBNAIL_FILE.to_string());

        let dataset = self.load_infos(&file_set, &mut findings);
        let dataset_name = dataset.as_ref().map(|(name, _)| name.clone());

        if let Some((_, info)) = &dataset {
            self.check_class_labels(info, &mut findings);

            // image path -> splits referencing it
            let mut image_splits: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for (split_key, split) in &info.splits {
                let ann_file = match locate(&split.dataset_name, ANNOTATIONS_DIR, &file_set) {
                    ImageLocation::Found(path) => path,
                    ImageLocation::Missing | ImageLocation::Invalid => {
                        findings.error(format!(
                            "Annotation file `{}` for split `{split_key}` not found (looked in the dataset root and `{ANNOTATIONS_DIR}/`).",
                            split.dataset_name
                        ));
                        continue;
                    }
                };
                referenced.insert(ann_file.clone());
                let Some(coco) = self.load_annotations(split_key, &ann_file, &mut findings) else {
                    continue;
                };
                stats.images += coco.images.len();
                stats.annotations += coco.annotations.len();
                for path in self.check_split(split_key, info, &coco, &file_set, &mut findings) {
                    image_splits
                        .entry(path)
                        .or_default()
                        .push(split_key.clone());
                }
            }

            let shared: Vec<String> = image_splits
                .iter()
                .filter(|(_, splits)| splits.len() > 1)
                .map(|(path, splits)| format!("{path} ({})", splits.join(", ")))
                .collect();
            findings.grouped(
                Severity::Warning,
                &format!(
                    "{} image file(s) are referenced by more than one split",
                    shared.len()
                ),
                &shared,
                ", ",
            );
            referenced.extend(image_splits.into_keys());
        }

        let digests = self.check_duplicates(&files, &mut findings)?;

        if dataset.is_some() {
            let unreferenced: Vec<String> = files
                .iter()
                .map(|f| f.relative_path.clone())
                .filter(|path| !referenced.contains(path))
                .collect();
            findings.grouped(
                Severity::Warning,
                &format!(
                    "{} file(s) are not referenced by any split and will be uploaded as-is",
                    unreferenced.len()
                ),
                &unreferenced,
                ", ",
            );
        }

        let mut report = ValidationReport {
            dataset_name,
            findings: findings.items,
            stats,
            signature: None,
        };
        if report.passed() {
            let signature = combine_digests(
                files
                    .iter()
                    .zip(digests.iter())
                    .map(|(file, digest)| (file.relative_path.as_str(), digest.as_str())),
            );
            info!(%signature, warnings = report.warnings(), "Validation passed");
            report.signature = Some(signature);
        } else {
            warn!(
                errors = report.errors(),
                warnings = report.warnings(),
                "Validation failed"
            );
        }
        Ok(report)
    }

    fn load_infos(
        &self,
        file_set: &HashSet<&str>,
        findings: &mut Findings,
    ) -> Option<(String, DatasetInfo)> {
        if !file_set.contains(DATASET_INFOS_FILE) {
            findings.error(format!(
                "`{DATASET_INFOS_FILE}` not found in the dataset root."
            ));
            return None;
        }
        let path = self.root.join(DATASET_INFOS_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                findings.error(format!("Could not read `{DATASET_INFOS_FILE}`: {e}"));
                return None;
            }
        };
        let infos = match DatasetInfos::parse_str(&text) {
            Ok(infos) => infos,
            Err(e) => {
                findings.grouped(
                    Severity::Error,
                    &format!("`{DATASET_INFOS_FILE}` is invalid"),
                    &e.issues(),
                    "; ",
                );
                return None;
            }
        };
        if infos.len() != 1 {
            let names: Vec<&str> = infos.names().collect();
            findings.error(format!(
                "`{DATASET_INFOS_FILE}` must describe exactly one dataset; found {}: {names:?}",
                infos.len()
            ));
            return None;
        }
        let (name, info) = infos.first()?;
        debug!(dataset = name, splits = info.splits.len(), "Loaded dataset metadata");
        Some((name.to_string(), info.clone()))
    }

    fn load_annotations(
        &self,
        split_key: &str,
        ann_file: &str,
        findings: &mut Findings,
    ) -> Option<CocoDataset> {
        let text = match fs::read_to_string(self.root.join(ann_file)) {
            Ok(text) => text,
            Err(e) => {
                findings.error(format!(
                    "Split `{split_key}`: could not read `{ann_file}`: {e}"
                ));
                return None;
            }
        };
        match CocoDataset::parse_str(&text) {
            Ok(coco) => Some(coco),
            Err(e) => {
                let issues = e.issues();
                findings.grouped(
                    Severity::Error,
                    &format!(
                        "Split `{split_key}`: `{ann_file}` is invalid ({} problem(s))",
                        issues.len()
                    ),
                    &issues,
                    "; ",
                );
                None
            }
        }
    }

    /// Checks one split and returns the dataset paths of its images found on disk.
    fn check_split(
        &self,
        split_key: &str,
        info: &DatasetInfo,
        coco: &CocoDataset,
        file_set: &HashSet<&str>,
        findings: &mut Findings,
    ) -> Vec<String> {
        if coco.images.is_empty() {
            findings.error(format!("Split `{split_key}` contains no images."));
        }

        if let Some(split) = info.splits.get(split_key) {
            if let Some(expected) = split.num_examples {
                if expected != coco.images.len() as u64 {
                    findings.warn(format!(
                        "Split `{split_key}`: num_examples is {expected} but `{}` lists {} image(s).",
                        split.dataset_name,
                        coco.images.len()
                    ));
                }
            }
        }

        if let Some(template) = info.task() {
            let names = coco.category_names();
            if !same_names(&names, &template.labels) {
                findings.warn(format!(
                    "Split `{split_key}`: category names {names:?} do not match task labels {:?}.",
                    template.labels
                ));
            }
            self.check_task_rules(split_key, template.task, template.num_keypoints, coco, findings);
        }

        let mut found = Vec::new();
        let mut missing = Vec::new();
        let mut invalid = Vec::new();
        for image in &coco.images {
            match locate(&image.file_name, IMAGES_DIR, file_set) {
                ImageLocation::Found(path) => found.push(path),
                ImageLocation::Missing => missing.push(image.file_name.clone()),
                ImageLocation::Invalid => invalid.push(image.file_name.clone()),
            }
        }
        findings.grouped(
            Severity::Error,
            &format!(
                "Split `{split_key}`: {} image file_name(s) are absolute or point outside the dataset",
                invalid.len()
            ),
            &invalid,
            ", ",
        );
        findings.grouped(
            Severity::Error,
            &format!(
                "Split `{split_key}`: {} image file(s) not found (looked in the dataset root and `{IMAGES_DIR}/`)",
                missing.len()
            ),
            &missing,
            ", ",
        );

        let annotated: HashSet<_> = coco.annotations.iter().map(|a| a.image_id.key()).collect();
        let unannotated: Vec<String> = coco
            .images
            .iter()
            .filter(|image| !annotated.contains(&image.id.key()))
            .map(|image| image.file_name.clone())
            .collect();
        findings.grouped(
            Severity::Warning,
            &format!(
                "Split `{split_key}`: {} image(s) have no annotations",
                unannotated.len()
            ),
            &unannotated,
            ", ",
        );
        found
    }

    fn check_task_rules(
        &self,
        split_key: &str,
        task: TaskKind,
        num_keypoints: Option<i64>,
        coco: &CocoDataset,
        findings: &mut Findings,
    ) {
        match task {
            TaskKind::Detection => {
                let offenders: Vec<String> = coco
                    .annotations
                    .iter()
                    .filter(|a| a.bbox.len() != 4)
                    .map(|a| format!("id={}", a.id))
                    .collect();
                findings.grouped(
                    Severity::Error,
                    &format!(
                        "Split `{split_key}`: {} annotation(s) lack a 4-element bbox required for detection",
                        offenders.len()
                    ),
                    &offenders,
                    ", ",
                );
            }
            TaskKind::Keypoints => {
                let used: BTreeSet<i64> = coco.annotations.iter().map(|a| a.category_id).collect();
                for category in coco.categories.iter().filter(|c| used.contains(&c.id)) {
                    match category.keypoint_count() {
                        None => findings.error(format!(
                            "Split `{split_key}`: category `{}` is used by annotations but defines no keypoints.",
                            category.name
                        )),
                        Some(count) => {
                            if num_keypoints != Some(count as i64) {
                                findings.error(format!(
                                    "Split `{split_key}`: category `{}` defines {count} keypoint(s) but the task template declares num_keypoints={}.",
                                    category.name,
                                    num_keypoints.map_or_else(|| "none".to_string(), |n| n.to_string())
                                ));
                            }
                        }
                    }
                }
            }
            TaskKind::Classification => {
                let with_bbox: Vec<String> = coco
                    .annotations
                    .iter()
                    .filter(|a| !a.bbox.is_empty())
                    .map(|a| format!("id={}", a.id))
                    .collect();
                findings.grouped(
                    Severity::Warning,
                    &format!(
                        "Split `{split_key}`: {} annotation(s) carry a bbox, which is ignored for classification",
                        with_bbox.len()
                    ),
                    &with_bbox,
                    ", ",
                );
            }
        }
    }

    fn check_class_labels(&self, info: &DatasetInfo, findings: &mut Findings) {
        let Some(features) = &info.features else {
            return;
        };
        let labels = info.task().map(|t| t.labels.as_slice()).unwrap_or_default();
        for class_label in features.class_labels() {
            let Some(names) = &class_label.names else {
                continue;
            };
            if let Some(num_classes) = class_label.num_classes {
                if num_classes != names.len() as u64 {
                    findings.warn(format!(
                        "ClassLabel feature declares num_classes={num_classes} but lists {} name(s).",
                        names.len()
                    ));
                }
            }
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            if !labels.is_empty() && !same_names(&names, labels) {
                findings.warn(format!(
                    "ClassLabel feature names {names:?} do not match task labels {labels:?}."
                ));
            }
        }
    }

    /// Hashes every file once; the digests are reused for the signature.
    fn check_duplicates(
        &self,
        files: &[DatasetFile],
        findings: &mut Findings,
    ) -> Result<Vec<String>, ValidateError> {
        let mut digests = Vec::with_capacity(files.len());
        let mut by_digest: HashMap<String, Vec<&str>> = HashMap::new();
        for file in files {
            let digest = file_sha256(&file.absolute_path)?;
            if file.size > 0 {
                by_digest
                    .entry(digest.clone())
                    .or_default()
                    .push(file.relative_path.as_str());
            }
            digests.push(digest);
        }
        let mut groups: Vec<String> = by_digest
            .into_values()
            .filter(|paths| paths.len() > 1)
            .map(|paths| paths.join(" = "))
            .collect();
        groups.sort();
        findings.grouped(
            Severity::Warning,
            &format!("{} group(s) of files have identical content", groups.len()),
            &groups,
            ", ",
        );
        Ok(digests)
    }
}
