//! Enumerate the files of a dataset directory.

use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// A regular file found under the dataset root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetFile {
    /// Path relative to the dataset root, `/`-separated on every platform.
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub size: u64,
}

/// Recursively collect every file under `root`, sorted by relative path.
///
/// Symlinks to files are listed like the files they point to. Symlinked
/// directories are not descended into, so link cycles cannot repeat entries.
pub fn collect_files(root: &Path) -> std::io::Result<Vec<DatasetFile>> {
    fn visit_dir(dir: &Path, root: &Path, results: &mut Vec<DatasetFile>) -> std::io::Result<()> {
        for entry_res in std::fs::read_dir(dir)? {
            let entry = entry_res?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            let is_file = if file_type.is_symlink() {
                match std::fs::metadata(&path) {
                    Ok(target) if target.is_file() => true,
                    Ok(_) => {
                        debug!(path = %path.display(), "Not following directory symlink");
                        false
                    }
                    Err(e) => {
                        debug!(path = %path.display(), error = %e, "Skipping dangling symlink");
                        false
                    }
                }
            } else {
                file_type.is_file()
            };
            if file_type.is_dir() {
                visit_dir(&path, root, results)?;
            } else if is_file {
                let Ok(rel_path) = path.strip_prefix(root) else {
                    continue;
                };
                let segments: Vec<String> = rel_path
                    .components()
                    .map(|comp| comp.as_os_str().to_string_lossy().into_owned())
                    .collect();
                if segments.is_empty() {
                    continue;
                }
                let size = std::fs::metadata(&path)?.len();
                results.push(DatasetFile {
                    relative_path: segments.join("/"),
                    absolute_path: path,
                    size,
                });
            } else if !file_type.is_symlink() {
                debug!(path = %path.display(), "Skipping non-regular entry");
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    if let Err(e) = visit_dir(root, root, &mut files) {
        error!(error = ?e, root = %root.display(), "Failed to walk dataset directory");
        return Err(e);
    }
    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    info!(count = files.len(), root = %root.display(), "Collected dataset files");
    Ok(files)
}

/// Number of files and their total size in bytes.
pub fn count_files(root: &Path) -> std::io::Result<(usize, u64)> {
    let files = collect_files(root)?;
    let size = files.iter().map(|f| f.size).sum();
    Ok((files.len(), size))
}

/// Human readable size with binary units, e.g. `1.5 KB`.
pub fn format_size(size_bytes: u64) -> String {
    const UNITS: [&str; 9] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];
    if size_bytes == 0 {
        return "0B".to_string();
    }
    let mut unit = 0;
    let mut scaled = size_bytes as f64;
    while scaled >= 1024.0 && unit < UNITS.len() - 1 {
        scaled /= 1024.0;
        unit += 1;
    }
    let rounded = (scaled * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}
