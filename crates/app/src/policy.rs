use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use quota_core::PolicySet;

use crate::error::{AppError, Result};

/// Writes the embedded defaults next to the db on first start so
/// administrators have a file to edit.
pub fn apply_policy_defaults(defaults_path: &Path) -> Result<()> {
    if defaults_path.exists() {
        return Ok(());
    }
    write_policy_defaults(defaults_path, &load_initial_policy()?)
}

/// Loads the quota policy for a run: the admin-managed file when present,
/// otherwise the embedded defaults.
pub fn load_policy_set(defaults_path: &Path) -> Result<PolicySet> {
    if defaults_path.exists() {
        return load_policy_defaults(defaults_path);
    }
    load_initial_policy()
}

pub fn load_policy_defaults(path: &Path) -> Result<PolicySet> {
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).map_err(AppError::from)
}

pub fn load_initial_policy() -> Result<PolicySet> {
    let data = include_str!("../initial-policy.json");
    serde_json::from_str(data).map_err(AppError::from)
}

pub fn write_policy_defaults(path: &Path, policies: &PolicySet) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, policies).map_err(AppError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults_parse() {
        let policies = load_initial_policy().expect("defaults");
        assert!(policies.default.quota_gpu_hours > 0.0);
        assert!(policies.default.warn_fraction > 0.0 && policies.default.warn_fraction < 1.0);
    }

    #[test]
    fn defaults_file_round_trips() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("policy.json");
        apply_policy_defaults(&path).expect("apply");
        assert!(path.exists());

        let loaded = load_policy_set(&path).expect("load");
        assert_eq!(loaded, load_initial_policy().expect("defaults"));
    }
}
