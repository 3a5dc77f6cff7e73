//! AWS CLI adapter for [`ObjectStorage`].
//!
//! Every operation shells out to `aws`, the same way the rest of the
//! connector expects users to have it installed and configured.

use crate::contract::{ObjectStorage, ProfileSettings, StorageCredentials, StorageError, SyncOutcome};
use async_trait::async_trait;
use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long to keep retrying S3 access while fresh keys propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 6,
            delay: Duration::from_secs(20),
        }
    }
}

/// File name from an `aws s3 sync` progress line such as
/// `upload: images/a.jpg to s3://bucket/prefix/images/a.jpg`.
pub fn parse_sync_line(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("upload: ")?;
    let file = match rest.find(" to ") {
        Some(idx) => &rest[..idx],
        None => rest,
    };
    let file = file.trim();
    (!file.is_empty()).then_some(file)
}

/// Lines of `aws s3 sync` stderr kept in a failure message.
const STDERR_TAIL_LINES: usize = 20;

fn stderr_tail(stderr: &[u8], lines: usize) -> String {
    let text = String::from_utf8_lossy(stderr);
    let all: Vec<&str> = text.trim().lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

pub struct AwsCli {
    program: PathBuf,
}

impl Default for AwsCli {
    fn default() -> Self {
        Self::new()
    }
}

impl AwsCli {
    pub fn new() -> Self {
        Self::with_program("aws")
    }

    /// Use a different executable, e.g. a wrapper script.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn describe<I, S>(&self, args: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(
            args.into_iter()
                .map(|a| a.as_ref().to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }

    /// Run to completion and return stdout lines.
    fn run(&self, args: &[&str]) -> Result<Vec<String>, StorageError> {
        let command = self.describe(args);
        debug!(subcommand = ?&args[..args.len().min(2)], "Running storage command");
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|source| StorageError::Spawn {
                command: command.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(StorageError::CommandFailed {
                command,
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect())
    }
}

#[async_trait]
impl ObjectStorage for AwsCli {
    async fn is_installed(&self) -> Option<String> {
        match self.run(&["--version"]) {
            Ok(lines) => {
                let version = lines.join(" ").trim().to_string();
                info!(%version, "awscli installation found");
                Some(version)
            }
            Err(e) => {
                info!(error = %e, "awscli not available");
                None
            }
        }
    }

    async fn check_profile(&self, profile: &str) -> bool {
        match self.run(&["configure", "list", "--profile", profile]) {
            Ok(_) => true,
            Err(e) => {
                info!(profile, error = %e, "AWS profile not configured");
                false
            }
        }
    }

    async fn configure_profile(
        &self,
        settings: &ProfileSettings,
        credentials: &StorageCredentials,
    ) -> Result<(), StorageError> {
        let values = [
            ("region", settings.region.as_str()),
            ("output", settings.output_format.as_str()),
            ("aws_access_key_id", credentials.access_key_id.as_str()),
            ("aws_secret_access_key", credentials.secret_access_key.as_str()),
        ];
        for (key, value) in values {
            // the value may be a secret; keep it out of error messages
            let command = format!("aws configure set {key} --profile {}", settings.profile);
            self.run(&["configure", "set", key, value, "--profile", &settings.profile])
                .map_err(|e| match e {
                    StorageError::CommandFailed { code, stderr, .. } => {
                        StorageError::CommandFailed {
                            command: command.clone(),
                            code,
                            stderr,
                        }
                    }
                    StorageError::Spawn { source, .. } => StorageError::Spawn {
                        command: command.clone(),
                        source,
                    },
                })?;
            debug!(key, profile = %settings.profile, "Configured AWS profile value");
        }
        info!(profile = %settings.profile, "AWS profile configured");
        Ok(())
    }

    async fn list_prefix(&self, s3_uri: &str, profile: &str) -> Result<Vec<String>, StorageError> {
        let lines = self.run(&["s3", "ls", s3_uri, "--profile", profile])?;
        Ok(lines.into_iter().map(|l| l.trim().to_string()).collect())
    }

    async fn sync(
        &self,
        local_root: &Path,
        s3_uri: &str,
        profile: &str,
        expected_files: usize,
    ) -> Result<SyncOutcome, StorageError> {
        let root = local_root.to_string_lossy();
        let args = ["s3", "sync", &*root, s3_uri, "--profile", profile];
        let command = self.describe(args);
        info!(%command, "Starting sync");

        let spawn_err = |source| StorageError::Spawn {
            command: command.clone(),
            source,
        };
        let mut child = Command::new(&self.program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_err)?;

        // drained on its own thread so a chatty stderr cannot stall stdout
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf);
                buf
            })
        });

        let mut outcome = SyncOutcome::default();
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let line = line.map_err(spawn_err)?;
                debug!(%line, "sync output");
                if let Some(file) = parse_sync_line(&line) {
                    outcome.uploaded += 1;
                    println!(
                        "[{}/{}] Uploading file: {}",
                        outcome.uploaded, expected_files, file
                    );
                } else if line.starts_with("upload: ") {
                    warn!(%line, "Failed parsing sync line");
                }
            }
        }
        let status = child.wait().map_err(spawn_err)?;
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if !status.success() {
            return Err(StorageError::CommandFailed {
                command,
                code: status.code().unwrap_or(-1),
                stderr: stderr_tail(&stderr, STDERR_TAIL_LINES),
            });
        }
        if !stderr.is_empty() {
            debug!(bytes = stderr.len(), "sync wrote to stderr");
        }
        info!(uploaded = outcome.uploaded, "Sync finished");
        Ok(outcome)
    }
}

/// List `s3_uri`, retrying per `policy` until it succeeds.
pub async fn check_s3_access<S>(
    storage: &S,
    s3_uri: &str,
    profile: &str,
    policy: RetryPolicy,
) -> Result<Vec<String>, StorageError>
where
    S: ObjectStorage + ?Sized,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match storage.list_prefix(s3_uri, profile).await {
            Ok(listing) => {
                println!("S3 access verified");
                return Ok(listing);
            }
            Err(e) if attempt < attempts => {
                warn!(attempt, attempts, error = %e, s3_uri, "S3 access check failed, retrying");
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(e) => {
                println!("Cannot obtain AWS access: {e}");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockObjectStorage;

    #[test]
    fn parses_upload_lines() {
        assert_eq!(
            parse_sync_line("upload: images/a b.jpg to s3://b/account/g/datasets/d/images/a b.jpg"),
            Some("images/a b.jpg")
        );
        assert_eq!(parse_sync_line("upload: thumbnail.jpg"), Some("thumbnail.jpg"));
        assert_eq!(parse_sync_line("Completed 1 file(s)"), None);
        assert_eq!(parse_sync_line("upload: "), None);
    }

    #[tokio::test]
    async fn missing_program_is_not_installed() {
        let cli = AwsCli::with_program("/nonexistent/aws-cli-for-tests");
        assert_eq!(cli.is_installed().await, None);
        assert!(!cli.check_profile("modelcat").await);
    }

    #[cfg(unix)]
    fn fake_aws(dir: &Path, body: &str) -> AwsCli {
        use std::os::unix::fs::PermissionsExt;
        let script = dir.join("aws");
        std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        AwsCli::with_program(script)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sync_survives_a_flood_of_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let cli = fake_aws(
            dir.path(),
            "head -c 200000 /dev/zero | tr '\\0' w >&2\necho 'upload: a.jpg to s3://b/a.jpg'",
        );
        let outcome = cli
            .sync(dir.path(), "s3://b/", "modelcat", 1)
            .await
            .unwrap();
        assert_eq!(outcome.uploaded, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_sync_reports_the_end_of_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let cli = fake_aws(
            dir.path(),
            "for i in $(seq 1 100); do echo \"warning: skipped $i\" >&2; done\necho 'fatal error: denied' >&2\nexit 2",
        );
        let err = cli
            .sync(dir.path(), "s3://b/", "modelcat", 1)
            .await
            .unwrap_err();
        match err {
            StorageError::CommandFailed { code, stderr, .. } => {
                assert_eq!(code, 2);
                assert!(stderr.ends_with("fatal error: denied"));
                assert!(!stderr.contains("skipped 50"));
                assert_eq!(stderr.lines().count(), STDERR_TAIL_LINES);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn s3_access_retries_until_success() {
        let mut storage = MockObjectStorage::new();
        let mut calls = 0;
        storage
            .expect_list_prefix()
            .times(3)
            .returning(move |_, _| {
                calls += 1;
                if calls < 3 {
                    Err(StorageError::CommandFailed {
                        command: "aws s3 ls".into(),
                        code: 255,
                        stderr: "AccessDenied".into(),
                    })
                } else {
                    Ok(vec!["PRE datasets/".into()])
                }
            });
        let policy = RetryPolicy {
            attempts: 6,
            delay: Duration::ZERO,
        };
        let listing = check_s3_access(&storage, "s3://b/account/g/", "modelcat", policy)
            .await
            .unwrap();
        assert_eq!(listing, vec!["PRE datasets/".to_string()]);
    }

    #[tokio::test]
    async fn s3_access_gives_up_after_attempts() {
        let mut storage = MockObjectStorage::new();
        storage.expect_list_prefix().times(2).returning(|_, _| {
            Err(StorageError::CommandFailed {
                command: "aws s3 ls".into(),
                code: 255,
                stderr: "AccessDenied".into(),
            })
        });
        let policy = RetryPolicy {
            attempts: 2,
            delay: Duration::ZERO,
        };
        let err = check_s3_access(&storage, "s3://b/account/g/", "modelcat", policy)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("AccessDenied"));
    }
}
