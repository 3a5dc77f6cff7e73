//! Connector settings, account identifiers and the persisted platform config.
//!
//! [`ConnectorSettings`] describes *where* the connector talks to (API host,
//! bucket, AWS CLI profile). [`PlatformConfig`] is the small JSON file that
//! `modelcat_setup` writes and `modelcat_upload` reads back.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

pub const PRODUCT_NAME: &str = "ModelCat";
pub const PACKAGE_NAME: &str = "modelcat-connector";

pub const DEFAULT_API_URL: &str = "https://app.modelcat.ai";
pub const DEFAULT_S3_BUCKET: &str = "modelcat-datasets";
pub const DEFAULT_AWS_PROFILE: &str = "modelcat";
pub const DEFAULT_AWS_REGION: &str = "us-east-1";
pub const DEFAULT_AWS_FORMAT: &str = "json";

/// File name of the persisted platform config inside the config directory.
pub const PLATFORM_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot locate a home directory; set MODELCAT_HOME to choose a config directory")]
    NoHomeDirectory,
    #[error("ModelCat configuration not found at {path}. Please run `modelcat_setup` first")]
    NotConfigured { path: PathBuf },
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed configuration file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(
        "Provided `ModelCat Group ID` ({0}) does not have a correct format. \
         It should be a valid UUID e.g. \"461b1b66-8787-11ed-aff3-07f20767316e\""
    )]
    InvalidGroupId(String),
    #[error(
        "`ModelCat OAuth Token` should be an integer followed by an underscore, followed by \
         a 40 character string e.g.: 1_1234567890abcdef1234567890abcdef12345678"
    )]
    InvalidOAuthToken,
}

/// Where the connector sends things. Every field has a production default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorSettings {
    pub api_url: String,
    pub s3_bucket: String,
    pub aws_profile: String,
    pub aws_region: String,
    pub aws_output_format: String,
    /// Overrides `$HOME/.modelcat` when set.
    pub config_dir: Option<PathBuf>,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            s3_bucket: DEFAULT_S3_BUCKET.to_string(),
            aws_profile: DEFAULT_AWS_PROFILE.to_string(),
            aws_region: DEFAULT_AWS_REGION.to_string(),
            aws_output_format: DEFAULT_AWS_FORMAT.to_string(),
            config_dir: None,
        }
    }
}

impl ConnectorSettings {
    pub fn trace_loaded(&self) {
        info!(
            api_url = %self.api_url,
            s3_bucket = %self.s3_bucket,
            aws_profile = %self.aws_profile,
            "Loaded connector settings"
        );
        debug!(?self, "Connector settings loaded (full debug)");
    }

    /// Resolve the directory holding `config.json`.
    pub fn config_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.config_dir {
            return Ok(dir.clone());
        }
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .ok_or(ConfigError::NoHomeDirectory)?;
        Ok(PathBuf::from(home).join(format!(".{}", PRODUCT_NAME.to_lowercase())))
    }

    /// Prefix every dataset of the group lives under.
    pub fn account_uri(&self, group_id: &GroupId) -> String {
        format!("s3://{}/account/{}/", self.s3_bucket, group_id)
    }

    pub fn s3_uri_for(&self, group_id: &GroupId, dataset_name: &str) -> String {
        format!(
            "s3://{}/account/{}/datasets/{}/",
            self.s3_bucket, group_id, dataset_name
        )
    }

    /// Browser URL of an uploaded dataset.
    pub fn dataset_url(&self, group_id: &GroupId, dataset_name: &str) -> String {
        format!(
            "{}/datasets/{}/{}",
            self.api_url.trim_end_matches('/'),
            group_id,
            dataset_name
        )
    }
}

/// A platform group (account) identifier. Always a UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(Uuid);

impl GroupId {
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl FromStr for GroupId {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(raw.trim())
            .map(GroupId)
            .map_err(|_| ConfigError::InvalidGroupId(raw.to_string()))
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+_[a-f0-9]{40}$").expect("static regex"))
}

/// OAuth token issued by the platform: `<digits>_<40 hex chars>`.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthToken(String);

impl OAuthToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OAuthToken {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if token_pattern().is_match(raw) {
            Ok(OAuthToken(raw.to_string()))
        } else {
            Err(ConfigError::InvalidOAuthToken)
        }
    }
}

impl fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OAuthToken(****)")
    }
}

/// Persisted result of the setup wizard.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub group_id: String,
    pub oauth_token: String,
}

impl fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("group_id", &self.group_id)
            .field("oauth_token", &"****")
            .finish()
    }
}

impl PlatformConfig {
    pub fn new(group_id: &GroupId, oauth_token: &OAuthToken) -> Self {
        Self {
            group_id: group_id.to_string(),
            oauth_token: oauth_token.as_str().to_string(),
        }
    }

    pub fn group_id(&self) -> Result<GroupId, ConfigError> {
        self.group_id.parse()
    }

    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(PLATFORM_CONFIG_FILE)
    }

    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let path = Self::path_in(dir);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                error!(path = %path.display(), "Platform config not found");
                return Err(ConfigError::NotConfigured { path });
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        let config: PlatformConfig = serde_json::from_str(&content)
            .map_err(|source| ConfigError::Malformed { path: path.clone(), source })?;
        info!(path = %path.display(), group_id = %config.group_id, "Loaded platform config");
        Ok(config)
    }

    /// Write `config.json`, creating the directory if needed. Returns the file path.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, ConfigError> {
        fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = Self::path_in(dir);
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Malformed {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), "Saved platform config");
        Ok(path)
    }
}
