use std::path::PathBuf;
use std::process::Command;

use chrono::{DateTime, Utc};
use ingest::RawPayload;
use quota_core::Partition;

use crate::error::{AppError, Result};
use crate::util::time::sacct_time;

/// One accounting fetch: a partition, a time range, and optionally a single
/// user (the self-check path; admin pipelines fetch all users).
#[derive(Clone, Debug)]
pub struct AccountingQuery {
    pub partition: Partition,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub user: Option<String>,
}

/// Boundary to the cluster accounting system. Implementations fetch one raw
/// payload per query; normalization happens in the ingest crate.
pub trait AccountingSource {
    fn fetch(&self, query: &AccountingQuery) -> Result<RawPayload>;
}

/// Shells out to `sacct --json` for each query.
pub struct SacctClient {
    binary: String,
}

impl SacctClient {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl AccountingSource for SacctClient {
    fn fetch(&self, query: &AccountingQuery) -> Result<RawPayload> {
        let mut command = Command::new(&self.binary);
        match &query.user {
            Some(user) => command.arg("-u").arg(user),
            None => command.arg("--allusers"),
        };
        command
            .arg("-S")
            .arg(sacct_time(query.start))
            .arg("-E")
            .arg(sacct_time(query.end))
            .arg(format!("--partition={}", query.partition.as_str()))
            .arg("--json");

        let output = command
            .output()
            .map_err(|err| AppError::Fetch(format!("spawn {}: {}", self.binary, err)))?;
        if !output.status.success() {
            return Err(AppError::Fetch(format!(
                "{} exited with {} for partition {}",
                self.binary,
                output.status,
                query.partition.as_str()
            )));
        }
        let body = String::from_utf8(output.stdout)
            .map_err(|err| AppError::Fetch(format!("non-utf8 sacct output: {}", err)))?;
        Ok(RawPayload {
            partition: query.partition,
            body,
        })
    }
}

/// Reads previously fetched payload files from a data directory instead of
/// calling sacct (the `--data-dir` / cached-data mode). Time range and user
/// filters are ignored; the cache is whatever the last fetch wrote.
pub struct CachedDirSource {
    data_dir: PathBuf,
}

impl CachedDirSource {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }
}

impl AccountingSource for CachedDirSource {
    fn fetch(&self, query: &AccountingQuery) -> Result<RawPayload> {
        let path = ingest::find_payload_file(&self.data_dir, query.partition).ok_or_else(|| {
            AppError::Fetch(format!(
                "no cached payload for partition {} under {}",
                query.partition.as_str(),
                self.data_dir.display()
            ))
        })?;
        let body = std::fs::read_to_string(&path)?;
        Ok(RawPayload {
            partition: query.partition,
            body,
        })
    }
}

/// Fetches every partition for one admin pipeline run.
pub fn fetch_snapshot(
    source: &dyn AccountingSource,
    partitions: &[Partition],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<RawPayload>> {
    partitions
        .iter()
        .map(|&partition| {
            source.fetch(&AccountingQuery {
                partition,
                start,
                end,
                user: None,
            })
        })
        .collect()
}
