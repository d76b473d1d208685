//! Hive-style partition layout: maps `(snapshot_id, network, is_valid)` to
//! a directory path, and caches the set of leaf directories and fact files
//! per snapshot.
//!
//! ```text
//! <base>/
//!   snapshot_id=<N>/
//!     _SUMMARY.json
//!     validation_index.parquet
//!     network=<S>/
//!       is_valid=<true|false>/
//!         part-00000.parquet
//! ```

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use vstat_core::{EngineError, PartitionKey, Result};

const SUMMARY_FILE: &str = "_SUMMARY.json";
const INDEX_FILE: &str = "validation_index.parquet";
const PART_PREFIX: &str = "part-";
const PART_SUFFIX: &str = ".parquet";

/// Maps snapshot/partition identity to on-disk paths, caching directory
/// listings per snapshot until invalidated by a write or an explicit
/// `clean`.
pub struct PartitionLayout {
    base_path: PathBuf,
    dir_cache: DashMap<i64, Vec<PathBuf>>,
}

impl PartitionLayout {
    /// Build a layout manager rooted at `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        PartitionLayout {
            base_path: base_path.into(),
            dir_cache: DashMap::new(),
        }
    }

    /// Root directory of this snapshot: `<base>/snapshot_id=<N>`.
    pub fn snapshot_dir(&self, snapshot_id: i64) -> PathBuf {
        self.base_path.join(format!("snapshot_id={snapshot_id}"))
    }

    /// Path of the leaf partition directory for `key`.
    pub fn partition_dir(&self, key: &PartitionKey) -> PathBuf {
        self.snapshot_dir(key.snapshot_id).join(key.relative_dir())
    }

    /// Path of the summary sidecar for a snapshot.
    pub fn summary_path(&self, snapshot_id: i64) -> PathBuf {
        self.snapshot_dir(snapshot_id).join(SUMMARY_FILE)
    }

    /// Path of the lightweight index sidecar for a snapshot.
    pub fn index_path(&self, snapshot_id: i64) -> PathBuf {
        self.snapshot_dir(snapshot_id).join(INDEX_FILE)
    }

    /// Format a `part-NNNNN.parquet` file name for `counter`.
    pub fn part_file_name(counter: u32) -> String {
        format!("{PART_PREFIX}{counter:05}{PART_SUFFIX}")
    }

    /// Path of a specific part file within `key`'s partition directory.
    pub fn part_file_path(&self, key: &PartitionKey, counter: u32) -> PathBuf {
        self.partition_dir(key).join(Self::part_file_name(counter))
    }

    /// List every leaf partition directory for `snapshot_id`: a two-level
    /// scan of `network=*` then `is_valid=*` subdirectories. A missing
    /// snapshot directory is not an error; it yields an empty list. Results
    /// are cached until [`Self::invalidate`] is called for this snapshot.
    pub fn partition_dirs(&self, snapshot_id: i64) -> Result<Vec<PathBuf>> {
        if let Some(cached) = self.dir_cache.get(&snapshot_id) {
            return Ok(cached.clone());
        }
        let dirs = self.scan_partition_dirs(snapshot_id)?;
        self.dir_cache.insert(snapshot_id, dirs.clone());
        Ok(dirs)
    }

    fn scan_partition_dirs(&self, snapshot_id: i64) -> Result<Vec<PathBuf>> {
        let snapshot_dir = self.snapshot_dir(snapshot_id);
        let mut leaves = Vec::new();
        let network_dirs = match list_subdirs(&snapshot_dir)? {
            Some(dirs) => dirs,
            None => return Ok(leaves),
        };
        for network_dir in network_dirs {
            if let Some(is_valid_dirs) = list_subdirs(&network_dir)? {
                leaves.extend(is_valid_dirs);
            }
        }
        leaves.sort();
        Ok(leaves)
    }

    /// List every `part-*.parquet` file under `snapshot_id`'s partitions,
    /// sorted deterministically by path (required for the pagination law).
    pub fn fact_files(&self, snapshot_id: i64) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for dir in self.partition_dirs(snapshot_id)? {
            files.extend(list_part_files(&dir)?);
        }
        files.sort();
        Ok(files)
    }

    /// List `part-*.parquet` files under one partition directory only
    /// (used by the buffered writer to compute the next file counter).
    pub fn part_files_in(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        list_part_files(dir)
    }

    /// Invalidate the cached directory listing for `snapshot_id`. Must be
    /// called after any write to the snapshot or on `clean`/`delete`.
    pub fn invalidate(&self, snapshot_id: i64) {
        self.dir_cache.remove(&snapshot_id);
    }

    /// The root directory this layout manager owns.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

fn list_subdirs(dir: &Path) -> Result<Option<Vec<PathBuf>>> {
    if !dir.exists() {
        return Ok(None);
    }
    let mut out = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|e| EngineError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            out.push(path);
        }
    }
    out.sort();
    Ok(Some(out))
}

fn list_part_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|e| EngineError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::io(dir, e))?;
        let path = entry.path();
        let is_part_file = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(PART_PREFIX) && n.ends_with(PART_SUFFIX))
            .unwrap_or(false);
        if is_part_file {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_snapshot_yields_empty_list() {
        let dir = tempdir().unwrap();
        let layout = PartitionLayout::new(dir.path());
        assert!(layout.partition_dirs(1).unwrap().is_empty());
    }

    #[test]
    fn part_file_name_is_zero_padded() {
        assert_eq!(PartitionLayout::part_file_name(0), "part-00000.parquet");
        assert_eq!(PartitionLayout::part_file_name(42), "part-00042.parquet");
    }

    #[test]
    fn partition_dirs_scans_two_levels_and_caches() {
        let dir = tempdir().unwrap();
        let layout = PartitionLayout::new(dir.path());
        let key = PartitionKey {
            snapshot_id: 1,
            network: "NET".to_string(),
            is_valid: true,
        };
        std::fs::create_dir_all(layout.partition_dir(&key)).unwrap();
        let dirs = layout.partition_dirs(1).unwrap();
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0], layout.partition_dir(&key));

        // A new partition created after the cache is warm is invisible
        // until invalidate() is called.
        let key2 = PartitionKey {
            snapshot_id: 1,
            network: "NET".to_string(),
            is_valid: false,
        };
        std::fs::create_dir_all(layout.partition_dir(&key2)).unwrap();
        assert_eq!(layout.partition_dirs(1).unwrap().len(), 1);
        layout.invalidate(1);
        assert_eq!(layout.partition_dirs(1).unwrap().len(), 2);
    }
}
