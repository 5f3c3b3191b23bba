use std::fs;

use ingest::{load_cached_payloads, normalize_snapshot, payload_file_name, RawPayload};
use quota_core::{JobState, Partition};
use tempfile::tempdir;

fn payload_body(jobs: &str) -> String {
    format!(r#"{{ "meta": {{}}, "jobs": [{jobs}] }}"#)
}

fn job_json(id: u64, state: &str, submission: i64, start: i64, end: i64, elapsed: f64) -> String {
    format!(
        r#"{{
            "job_id": {id},
            "account": "astro",
            "user": "jdoe",
            "state": {{ "current": ["{state}"] }},
            "time": {{
                "submission": {submission},
                "start": {start},
                "end": {end},
                "elapsed": {elapsed},
                "limit": {{ "set": true, "infinite": false, "number": 360 }}
            }},
            "tres": {{ "allocated": [ {{ "type": "gres", "name": "gpu", "count": 2 }} ] }}
        }}"#
    )
}

#[test]
fn snapshot_merges_partitions_and_reports_fingerprints() {
    let payloads = vec![
        RawPayload {
            partition: Partition::Core,
            body: payload_body(&job_json(1, "COMPLETED", 1_760_000_000, 1_760_000_600, 1_760_007_800, 7_200.0)),
        },
        RawPayload {
            partition: Partition::Campus,
            body: payload_body(&job_json(2, "PENDING", 1_760_000_000, 0, 0, 0.0)),
        },
    ];

    let (records, stats) = normalize_snapshot(&payloads).expect("snapshot");
    assert_eq!(records.len(), 2);
    assert_eq!(stats.partitions_seen, 2);
    assert_eq!(stats.records_seen, 2);
    assert_eq!(stats.records_skipped, 0);
    assert_eq!(stats.fingerprints.len(), 2);
    assert!(stats.fingerprints.iter().all(|fp| fp.sha256.len() == 64));

    let pending = records
        .iter()
        .find(|record| record.partition == Partition::Campus)
        .expect("campus record");
    assert_eq!(pending.state, JobState::Pending);
    assert_eq!(pending.gpu_hours_charged, 0.0);
}

#[test]
fn duplicate_job_ids_prefer_the_ended_record() {
    // The same job reported twice in one fetch: once mid-run, once finished.
    let ended = job_json(7, "COMPLETED", 1_760_000_000, 1_760_000_600, 1_760_007_800, 7_200.0);
    let running = job_json(7, "RUNNING", 1_760_000_000, 1_760_000_600, 0, 3_600.0);

    let payloads = vec![RawPayload {
        partition: Partition::Core,
        body: payload_body(&format!("{ended}, {running}")),
    }];
    let (records, stats) = normalize_snapshot(&payloads).expect("snapshot");
    assert_eq!(records.len(), 1);
    assert_eq!(stats.records_deduplicated, 1);
    assert!(records[0].end_time.is_some());
    assert_eq!(records[0].state, JobState::Completed);

    // Order reversed: last-write-wins still keeps the ended record.
    let payloads = vec![RawPayload {
        partition: Partition::Core,
        body: payload_body(&format!("{running}, {ended}")),
    }];
    let (records, _) = normalize_snapshot(&payloads).expect("snapshot");
    assert_eq!(records.len(), 1);
    assert!(records[0].end_time.is_some());
}

#[test]
fn malformed_records_are_skipped_not_fatal() {
    let good = job_json(9, "RUNNING", 1_760_000_000, 1_760_000_600, 0, 600.0);
    let payloads = vec![RawPayload {
        partition: Partition::Core,
        body: payload_body(&format!(r#"{good}, {{ "job_id": 10 }}"#)),
    }];
    let (records, stats) = normalize_snapshot(&payloads).expect("snapshot");
    assert_eq!(records.len(), 1);
    assert_eq!(stats.records_skipped, 1);
    assert_eq!(stats.issues.len(), 1);
    assert_eq!(stats.issues[0].job_id.as_deref(), Some("10"));
}

#[test]
fn malformed_payload_fails_the_snapshot() {
    let payloads = vec![RawPayload {
        partition: Partition::Core,
        body: r#"{ "meta": {} }"#.to_string(),
    }];
    assert!(normalize_snapshot(&payloads).is_err());
}

#[test]
fn cached_payloads_load_from_data_dir() {
    let dir = tempdir().expect("temp dir");
    fs::write(
        dir.path().join(payload_file_name(Partition::Core)),
        payload_body(&job_json(3, "COMPLETED", 1_760_000_000, 1_760_000_600, 1_760_007_800, 7_200.0)),
    )
    .expect("write payload");

    let partitions = [Partition::Core, Partition::Premium];
    let payloads = load_cached_payloads(dir.path(), &partitions).expect("load");
    // Only the partition with a cached file is loaded.
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].partition, Partition::Core);

    let (records, _) = normalize_snapshot(&payloads).expect("snapshot");
    assert_eq!(records.len(), 1);
}

#[test]
fn empty_cache_dir_is_an_error() {
    let dir = tempdir().expect("temp dir");
    assert!(load_cached_payloads(dir.path(), &[Partition::Core]).is_err());
}
