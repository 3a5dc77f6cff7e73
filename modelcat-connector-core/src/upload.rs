//! Upload of a validated dataset.
//!
//! [`DatasetUploader::prepare`] runs every precondition (storage CLI and
//! profile present, signature matching the current dataset content, bucket
//! access) before anything is transferred; [`DatasetUploader::upload`] then
//! syncs the files, registers the dataset and queues its analysis job.

use crate::config::{ConfigError, ConnectorSettings, GroupId, PlatformConfig, PRODUCT_NAME};
use crate::contract::{AnalysisRequest, ApiError, ObjectStorage, PlatformApi, StorageError};
use crate::hashing::{hash_dataset, HashError};
use crate::signature::read_signature;
use crate::storage::{check_s3_access, RetryPolicy};
use crate::validate::DATASET_INFOS_FILE;
use crate::walk::{count_files, format_size};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Path does not exist: {0}")]
    PathNotFound(PathBuf),
    #[error("`awscli` does not seem installed on the system. Please run `modelcat_setup` to properly configure your machine.")]
    StorageCliMissing,
    #[error("Error locating user credentials for AWS profile `{0}`. Please run `modelcat_setup` to properly configure your ModelCat access")]
    ProfileNotConfigured(String),
    #[error("Dataset boiler plate not found: {0}")]
    MissingDatasetInfos(PathBuf),
    #[error("Dataset validation mark not found. Please run `modelcat_validate` first.")]
    NotValidated,
    #[error("Validation marks mismatch. Expected {computed}, found {signed}")]
    SignatureMismatch { computed: String, signed: String },
    #[error("{path} must be a JSON object with one dataset entry")]
    NoDatasetEntry { path: PathBuf },
    #[error("dataset name `{0}` has no characters left after normalisation (allowed: A-Z a-z 0-9 _ . -)")]
    EmptyDatasetName(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error("AWS access failed: {0}")]
    Storage(#[from] StorageError),
    #[error("ModelCat API error: {0}")]
    Api(#[from] ApiError),
}

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Skip the signature check. The dataset may then be rejected by the platform.
    pub ignore_validation: bool,
    pub s3_retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub dataset_uuid: String,
    pub dataset_name: String,
    pub s3_uri: String,
    pub dataset_url: String,
    pub files: usize,
    pub bytes: u64,
}

/// Drop every character outside `[A-Za-z0-9_.-]`.
pub fn normalize_dataset_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect()
}

/// A dataset that passed every upload precondition.
pub struct DatasetUploader<'a, S: ?Sized> {
    root: PathBuf,
    group_id: GroupId,
    settings: &'a ConnectorSettings,
    storage: &'a S,
    dataset_infos: Value,
    dataset_name: String,
    s3_uri: String,
}

impl<'a, S> DatasetUploader<'a, S>
where
    S: ObjectStorage + ?Sized,
{
    pub async fn prepare(
        root: impl Into<PathBuf>,
        platform: &PlatformConfig,
        settings: &'a ConnectorSettings,
        storage: &'a S,
        options: UploadOptions,
    ) -> Result<Self, UploadError> {
        let root = root.into();
        let group_id = platform.group_id()?;
        info!(%group_id, root = %root.display(), "Preparing upload");

        if !root.exists() {
            return Err(UploadError::PathNotFound(root));
        }

        if storage.is_installed().await.is_none() {
            return Err(UploadError::StorageCliMissing);
        }
        if !storage.check_profile(&settings.aws_profile).await {
            return Err(UploadError::ProfileNotConfigured(
                settings.aws_profile.clone(),
            ));
        }

        let infos_path = root.join(DATASET_INFOS_FILE);
        if !infos_path.is_file() {
            return Err(UploadError::MissingDatasetInfos(infos_path));
        }
        verify_signature(&root, options.ignore_validation)?;

        let dataset_infos = read_dataset_infos(&infos_path)?;
        let raw_name = dataset_infos
            .as_object()
            .and_then(|map| map.keys().next())
            .ok_or_else(|| UploadError::NoDatasetEntry {
                path: infos_path.clone(),
            })?;
        let dataset_name = normalize_dataset_name(raw_name);
        if dataset_name.is_empty() {
            return Err(UploadError::EmptyDatasetName(raw_name.clone()));
        }
        if &dataset_name != raw_name {
            debug!(raw = %raw_name, normalized = %dataset_name, "Normalized dataset name");
        }

        let s3_uri = settings.s3_uri_for(&group_id, &dataset_name);
        check_s3_access(
            storage,
            &settings.account_uri(&group_id),
            &settings.aws_profile,
            options.s3_retry,
        )
        .await?;

        Ok(Self {
            root,
            group_id,
            settings,
            storage,
            dataset_infos,
            dataset_name,
            s3_uri,
        })
    }

    pub fn dataset_name(&self) -> &str {
        &self.dataset_name
    }

    pub fn s3_uri(&self) -> &str {
        &self.s3_uri
    }

    pub async fn upload<A>(&self, api: &A) -> Result<UploadReport, UploadError>
    where
        A: PlatformApi + ?Sized,
    {
        info!(s3_uri = %self.s3_uri, "Uploading dataset");
        let (files, bytes) = count_files(&self.root).map_err(|source| UploadError::Io {
            path: self.root.clone(),
            source,
        })?;
        println!("Found {files} files in the dataset: {}", format_size(bytes));
        println!();

        let outcome = self
            .storage
            .sync(&self.root, &self.s3_uri, &self.settings.aws_profile, files)
            .await?;
        info!(uploaded = outcome.uploaded, expected = files, "Files synced");

        println!("Registering dataset in {PRODUCT_NAME} platform...");
        let registered = api
            .register_dataset(&self.dataset_name, &self.s3_uri, self.dataset_infos.clone())
            .await?;
        info!(uuid = %registered.uuid, dataset = %self.dataset_name, "Dataset registered");

        println!("Running Dataset Analysis immediately after registration...");
        api.submit_dataset_analysis(AnalysisRequest {
            dataset_uri: self.s3_uri.clone(),
            group_id: self.group_id.to_string(),
            dataset_name: self.dataset_name.clone(),
        })
        .await?;

        Ok(UploadReport {
            dataset_uuid: registered.uuid,
            dataset_name: self.dataset_name.clone(),
            s3_uri: self.s3_uri.clone(),
            dataset_url: self.settings.dataset_url(&self.group_id, &self.dataset_name),
            files,
            bytes,
        })
    }
}

fn verify_signature(root: &Path, ignore_validation: bool) -> Result<(), UploadError> {
    if ignore_validation {
        warn!(
            "Signature validation skipped (overridden by user). Your dataset may not work on {PRODUCT_NAME}"
        );
        return Ok(());
    }

    println!("Verifying dataset signature...");
    let signed = read_signature(root)
        .map_err(|source| UploadError::Io {
            path: root.to_path_buf(),
            source,
        })?
        .ok_or(UploadError::NotValidated)?;
    let computed = hash_dataset(root)?;
    info!(%signed, %computed, "Comparing dataset signature");
    if computed != signed {
        return Err(UploadError::SignatureMismatch { computed, signed });
    }
    println!("Done!");
    Ok(())
}

fn read_dataset_infos(path: &Path) -> Result<Value, UploadError> {
    let text = fs::read_to_string(path).map_err(|source| UploadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| UploadError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_keeps_safe_characters_only() {
        assert_eq!(normalize_dataset_name("my dataset/v1.0"), "mydatasetv1.0");
        assert_eq!(normalize_dataset_name("coco_2017-mini"), "coco_2017-mini");
        assert_eq!(normalize_dataset_name("ÄÖÜ"), "");
    }
}
