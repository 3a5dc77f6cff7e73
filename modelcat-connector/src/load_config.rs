/// `load_config` module: builds [`ConnectorSettings`] from an optional YAML
/// file plus environment overrides.
///
/// Precedence, lowest first: built-in defaults, the YAML file passed with
/// `--settings`, then `MODELCAT_*` environment variables (a `.env` file is
/// loaded by the binaries before this runs).
///
/// All keys are optional:
///
/// ```yaml
/// api_url: https://app.modelcat.ai
/// s3_bucket: modelcat-datasets
/// aws_profile: modelcat
/// aws_region: us-east-1
/// aws_output_format: json
/// config_dir: /home/me/.modelcat
/// ```
use anyhow::{Context, Result};
use modelcat_connector_core::config::ConnectorSettings;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const ENV_API_URL: &str = "MODELCAT_API_URL";
pub const ENV_S3_BUCKET: &str = "MODELCAT_S3_BUCKET";
pub const ENV_AWS_PROFILE: &str = "MODELCAT_AWS_PROFILE";
pub const ENV_AWS_REGION: &str = "MODELCAT_AWS_REGION";
pub const ENV_HOME: &str = "MODELCAT_HOME";

/// Defaults, overlaid by the YAML file at `path` (if any), overlaid by the environment.
pub fn load_settings<P: AsRef<Path>>(path: Option<P>) -> Result<ConnectorSettings> {
    let mut settings = match path {
        Some(path) => read_settings_file(path.as_ref())?,
        None => ConnectorSettings::default(),
    };
    apply_env_overrides(&mut settings);
    settings.trace_loaded();
    Ok(settings)
}

fn read_settings_file(path: &Path) -> Result<ConnectorSettings> {
    info!(settings_path = ?path, "Loading settings from file");
    let content = fs::read_to_string(path)
        .map_err(|e| {
            error!(error = ?e, settings_path = ?path, "Failed to read settings file");
            e
        })
        .with_context(|| format!("Failed to read settings file {}", path.display()))?;

    // an empty file is valid and means "all defaults"
    if content.trim().is_empty() {
        return Ok(ConnectorSettings::default());
    }
    let settings: ConnectorSettings = serde_yaml::from_str(&content)
        .map_err(|e| {
            error!(error = ?e, settings_path = ?path, "Failed to parse settings YAML");
            e
        })
        .with_context(|| format!("Failed to parse settings YAML {}", path.display()))?;
    info!(settings_path = ?path, "Parsed settings YAML successfully");
    Ok(settings)
}

fn apply_env_overrides(settings: &mut ConnectorSettings) {
    let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

    if let Some(v) = non_empty(ENV_API_URL) {
        info!(key = ENV_API_URL, "Environment override");
        settings.api_url = v;
    }
    if let Some(v) = non_empty(ENV_S3_BUCKET) {
        info!(key = ENV_S3_BUCKET, "Environment override");
        settings.s3_bucket = v;
    }
    if let Some(v) = non_empty(ENV_AWS_PROFILE) {
        info!(key = ENV_AWS_PROFILE, "Environment override");
        settings.aws_profile = v;
    }
    if let Some(v) = non_empty(ENV_AWS_REGION) {
        info!(key = ENV_AWS_REGION, "Environment override");
        settings.aws_region = v;
    }
    if let Some(v) = non_empty(ENV_HOME) {
        info!(key = ENV_HOME, "Environment override");
        settings.config_dir = Some(PathBuf::from(v));
    }
}
