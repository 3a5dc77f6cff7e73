//! Content hashing: per-file SHA-256 and the dataset signature hash.

use crate::signature::VALIDATOR_LOG_FILE;
use crate::walk::collect_files;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum HashError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

const CHUNK_SIZE: usize = 64 * 1024;

/// Streaming SHA-256 of a file, lowercase hex.
pub fn file_sha256(path: &Path) -> Result<String, HashError> {
    let io_err = |source| HashError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = BufReader::new(File::open(path).map_err(io_err)?);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let read = reader.read(&mut buf).map_err(io_err)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Fold `(relative_path, file digest)` pairs, already in path order, into
/// the dataset hash.
pub fn combine_digests<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut hasher = Sha256::new();
    for (relative_path, digest) in entries {
        hasher.update(relative_path.as_bytes());
        hasher.update([0u8]);
        hasher.update(digest.as_bytes());
        hasher.update([b'\n']);
    }
    format!("{:x}", hasher.finalize())
}

/// Signature hash of a dataset directory.
///
/// Covers the relative path and content of every file except the validator
/// log, in sorted path order, so it only depends on what would be uploaded.
pub fn hash_dataset(root: &Path) -> Result<String, HashError> {
    let files = collect_files(root).map_err(|source| HashError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    let mut digests = Vec::with_capacity(files.len());
    for file in files
        .iter()
        .filter(|f| f.relative_path != VALIDATOR_LOG_FILE)
    {
        let digest = file_sha256(&file.absolute_path)?;
        debug!(file = %file.relative_path, %digest, "Hashed dataset file");
        digests.push((file.relative_path.as_str(), digest));
    }
    let sha = combine_digests(digests.iter().map(|(path, digest)| (*path, digest.as_str())));
    info!(files = digests.len(), %sha, root = %root.display(), "Computed dataset hash");
    Ok(sha)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample_dataset() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("images")).unwrap();
        fs::write(dir.path().join("dataset_infos.json"), b"{}").unwrap();
        fs::write(dir.path().join("images/a.jpg"), b"aaaa").unwrap();
        dir
    }

    #[test]
    fn file_sha256_matches_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(
            file_sha256(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn dataset_hash_is_location_independent() {
        let a = sample_dataset();
        let b = sample_dataset();
        let ha = hash_dataset(a.path()).unwrap();
        assert_eq!(ha.len(), 64);
        assert_eq!(ha, hash_dataset(b.path()).unwrap());
    }

    #[test]
    fn dataset_hash_ignores_validator_log() {
        let dir = sample_dataset();
        let before = hash_dataset(dir.path()).unwrap();
        fs::write(dir.path().join(VALIDATOR_LOG_FILE), b"anything").unwrap();
        assert_eq!(before, hash_dataset(dir.path()).unwrap());
    }

    #[test]
    fn dataset_hash_tracks_content_and_names() {
        let dir = sample_dataset();
        let original = hash_dataset(dir.path()).unwrap();

        fs::write(dir.path().join("images/a.jpg"), b"aaab").unwrap();
        let modified = hash_dataset(dir.path()).unwrap();
        assert_ne!(original, modified);

        fs::rename(dir.path().join("images/a.jpg"), dir.path().join("images/b.jpg")).unwrap();
        assert_ne!(modified, hash_dataset(dir.path()).unwrap());
    }
}
