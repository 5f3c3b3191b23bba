use std::collections::BTreeMap;
use std::fmt::Write;
use std::fs;
use std::path::Path;

use quota_core::{JobRecord, Partition};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::parser::parse_payload;
use crate::paths::find_payload_file;
use crate::types::{NormalizeError, NormalizeStats, PayloadFingerprint, RawPayload, Result};

struct PartitionBatch {
    records: Vec<JobRecord>,
    records_seen: usize,
    issues: Vec<crate::types::NormalizeIssue>,
    fingerprint: PayloadFingerprint,
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(&mut out, "{:02x}", byte);
    }
    out
}

fn fingerprint(payload: &RawPayload) -> PayloadFingerprint {
    let mut hasher = Sha256::new();
    hasher.update(payload.body.as_bytes());
    PayloadFingerprint {
        partition: payload.partition.as_str().to_string(),
        sha256: hex_digest(&hasher.finalize()),
        bytes: payload.body.len() as u64,
    }
}

fn normalize_one(payload: &RawPayload) -> Result<PartitionBatch> {
    let fingerprint = fingerprint(payload);
    let value: serde_json::Value = serde_json::from_str(&payload.body)?;
    let parsed = parse_payload(payload.partition, &value)?;
    Ok(PartitionBatch {
        records: parsed.records,
        records_seen: parsed.records_seen,
        issues: parsed.issues,
        fingerprint,
    })
}

/// Normalizes a full fetch (one payload per partition) into a deduplicated
/// `JobRecord` snapshot. Partition payloads are parsed in parallel; a payload
/// that is malformed as a whole fails the snapshot, while individual bad
/// records are skipped and counted.
pub fn normalize_snapshot(payloads: &[RawPayload]) -> Result<(Vec<JobRecord>, NormalizeStats)> {
    let batches = payloads
        .par_iter()
        .map(normalize_one)
        .collect::<Result<Vec<_>>>()?;

    let mut stats = NormalizeStats {
        partitions_seen: batches.len(),
        ..NormalizeStats::default()
    };
    let mut merged: BTreeMap<(Partition, String), JobRecord> = BTreeMap::new();
    for batch in batches {
        stats.records_seen += batch.records_seen;
        stats.records_skipped += batch.issues.len();
        stats.fingerprints.push(batch.fingerprint);
        for issue in &batch.issues {
            warn!(
                partition = %issue.partition,
                job_id = issue.job_id.as_deref().unwrap_or("?"),
                "skipped malformed record: {}",
                issue.message
            );
        }
        stats.issues.extend(batch.issues);
        for record in batch.records {
            let key = (record.partition, record.job_id.clone());
            match merged.get(&key) {
                // A record that reached its end is the most complete view of
                // the job; never displace it with an earlier duplicate.
                Some(existing) if existing.end_time.is_some() && record.end_time.is_none() => {
                    stats.records_deduplicated += 1;
                }
                Some(_) => {
                    stats.records_deduplicated += 1;
                    merged.insert(key, record);
                }
                None => {
                    merged.insert(key, record);
                }
            }
        }
    }
    Ok((merged.into_values().collect(), stats))
}

/// Reads cached payload files (`sacct_<partition>.json`) from a data
/// directory. A partition without a cached file is reported, not fatal, so a
/// partial cache can still be examined.
pub fn load_cached_payloads(data_dir: &Path, partitions: &[Partition]) -> Result<Vec<RawPayload>> {
    let mut payloads = Vec::new();
    for &partition in partitions {
        let Some(path) = find_payload_file(data_dir, partition) else {
            warn!(partition = partition.as_str(), "no cached payload file");
            continue;
        };
        let body = fs::read_to_string(&path)?;
        payloads.push(RawPayload { partition, body });
    }
    if payloads.is_empty() {
        return Err(NormalizeError::MalformedPayload {
            partition: "*".to_string(),
            reason: format!("no cached payload files under {}", data_dir.display()),
        });
    }
    Ok(payloads)
}
