//! # contract: seams to the outside world
//!
//! The connector talks to three collaborators it does not own:
//!
//! - the platform HTTP API ([`PlatformApi`]), which authenticates the user,
//!   hands out temporary storage credentials and registers datasets;
//! - object storage ([`ObjectStorage`]), reached through the AWS CLI;
//! - the person at the terminal ([`Prompter`]).
//!
//! Each is a trait annotated for `mockall`, so the setup and upload flows can
//! be driven end to end in tests without network, AWS or stdin.

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

/// The authenticated user, as returned by `GET /api/users/me`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: Value,
    pub full_name: String,
    pub email: String,
    pub origin: Value,
    pub groups: Vec<Value>,
}

/// Temporary access keys scoped to one group's storage prefix.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageCredentials {
    pub group_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub expiration_date: String,
}

impl std::fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("group_id", &self.group_id)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("expiration_date", &self.expiration_date)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredDataset {
    pub uuid: String,
}

/// A "Dataset Analysis" job submitted right after registration.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub dataset_uri: String,
    pub group_id: String,
    pub dataset_name: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("API returned error: {0}")]
    Rejected(String),
    #[error("API request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to parse API response: {0}")]
    Decode(String),
    #[error("missing required fields in API response: {0:?}")]
    MissingFields(Vec<String>),
    #[error("no data returned from API")]
    Empty,
}

/// The platform's HTTP API.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn get_me(&self) -> Result<UserProfile, ApiError>;

    async fn get_storage_credentials(&self, group_id: &str)
        -> Result<StorageCredentials, ApiError>;

    /// Register an uploaded dataset, passing `dataset_infos.json` through untouched.
    async fn register_dataset(
        &self,
        name: &str,
        s3_uri: &str,
        dataset_infos: Value,
    ) -> Result<RegisteredDataset, ApiError>;

    async fn submit_dataset_analysis(&self, request: AnalysisRequest) -> Result<(), ApiError>;
}

/// AWS CLI profile values written during setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSettings {
    pub profile: String,
    pub region: String,
    pub output_format: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncOutcome {
    pub uploaded: usize,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },
}

/// Object storage as seen through a named CLI profile.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Version string of the installed CLI, `None` when it is not installed.
    async fn is_installed(&self) -> Option<String>;

    async fn check_profile(&self, profile: &str) -> bool;

    async fn configure_profile(
        &self,
        settings: &ProfileSettings,
        credentials: &StorageCredentials,
    ) -> Result<(), StorageError>;

    async fn list_prefix(&self, s3_uri: &str, profile: &str) -> Result<Vec<String>, StorageError>;

    /// Mirror `local_root` to `s3_uri`, reporting progress against `expected_files`.
    async fn sync(
        &self,
        local_root: &Path,
        s3_uri: &str,
        profile: &str,
        expected_files: usize,
    ) -> Result<SyncOutcome, StorageError>;
}

/// Line-oriented questions to the user.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait Prompter: Send + Sync {
    fn ask(&self, prompt: &str) -> std::io::Result<String>;

    /// Like [`Prompter::ask`], for answers that must not end up in logs.
    fn ask_secret(&self, prompt: &str) -> std::io::Result<String>;
}
