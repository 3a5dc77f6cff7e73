//! The validator log and the signature line it carries.
//!
//! A successful validation ends the log with
//! `Validation passed and signed: <sha256>`; the uploader only accepts a
//! dataset whose freshly computed hash matches that line.

use crate::config::{PACKAGE_NAME, PRODUCT_NAME};
use crate::validate::ValidationReport;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};

/// Written into the dataset root; excluded from the dataset hash.
pub const VALIDATOR_LOG_FILE: &str = "dataset_validator_log.txt";

pub const SIGNATURE_PREFIX: &str = "Validation passed and signed: ";

fn signature_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Validation passed and signed: ([0-9a-z]{64})").expect("static regex")
    })
}

/// First signature found in a validator log.
pub fn extract_signature(text: &str) -> Option<String> {
    signature_pattern()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn log_path(root: &Path) -> PathBuf {
    root.join(VALIDATOR_LOG_FILE)
}

/// Signature stored in the dataset's validator log, if any.
pub fn read_signature(root: &Path) -> std::io::Result<Option<String>> {
    let path = log_path(root);
    match fs::read_to_string(&path) {
        Ok(text) => {
            let signature = extract_signature(&text);
            debug!(path = %path.display(), found = signature.is_some(), "Read validator log");
            Ok(signature)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn render_log(report: &ValidationReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{PACKAGE_NAME} v{} - {PRODUCT_NAME} dataset validation log\n",
        env!("CARGO_PKG_VERSION")
    ));
    if let Some(name) = &report.dataset_name {
        out.push_str(&format!("dataset: {name}\n"));
    }
    out.push_str(&format!(
        "files: {}, images: {}, annotations: {}\n\n",
        report.stats.files, report.stats.images, report.stats.annotations
    ));
    for finding in &report.findings {
        out.push_str(&finding.to_string());
        out.push('\n');
    }
    out.push('\n');
    out.push_str(&report.summary());
    out.push('\n');
    if let Some(signature) = &report.signature {
        out.push_str(SIGNATURE_PREFIX);
        out.push_str(signature);
        out.push('\n');
    }
    out
}

/// Persist the log, replacing any earlier one.
pub fn write_log(root: &Path, report: &ValidationReport) -> std::io::Result<PathBuf> {
    let path = log_path(root);
    fs::write(&path, render_log(report))?;
    info!(path = %path.display(), signed = report.signature.is_some(), "Wrote validator log");
    Ok(path)
}
