use std::path::{Path, PathBuf};

use quota_core::Partition;
use walkdir::WalkDir;

/// File name under which one partition's raw sacct payload is cached.
pub fn payload_file_name(partition: Partition) -> String {
    format!("sacct_{}.json", partition.as_str())
}

/// Locates a cached payload file for a partition anywhere under `data_dir`.
pub fn find_payload_file(data_dir: &Path, partition: Partition) -> Option<PathBuf> {
    let wanted = payload_file_name(partition);
    WalkDir::new(data_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .find(|entry| {
            entry.file_type().is_file() && entry.file_name().to_string_lossy() == wanted
        })
        .map(|entry| entry.into_path())
}
