use chrono::{DateTime, Utc};
use quota_core::{JobRecord, JobState, Partition};
use serde_json::Value;

use crate::types::{NormalizeError, NormalizeIssue};

fn value_to_f64(value: &Value) -> Option<f64> {
    if let Some(value) = value.as_f64() {
        return Some(value);
    }
    if let Some(value) = value.as_i64() {
        return Some(value as f64);
    }
    if let Some(value) = value.as_u64() {
        return Some(value as f64);
    }
    None
}

/// sacct encodes "not set" limits as objects with `set: false`; the numeric
/// payload lives under `number` (minutes).
fn limit_minutes(value: &Value) -> Option<f64> {
    if value
        .get("set")
        .and_then(|flag| flag.as_bool())
        .is_some_and(|set| !set)
    {
        return None;
    }
    value.get("number").and_then(value_to_f64)
}

/// Epoch-second timestamps; sacct reports 0 for a job that has not reached
/// that lifecycle point yet.
fn timestamp_field(job: &Value, key: &str) -> Option<DateTime<Utc>> {
    let secs = job.get("time")?.get(key)?.as_i64()?;
    if secs <= 0 {
        return None;
    }
    DateTime::<Utc>::from_timestamp(secs, 0)
}

/// Sums allocated GPUs over the TRES list (`type == "gres"`, `name == "gpu"`).
fn gpu_count(job: &Value) -> f64 {
    let Some(allocated) = job
        .get("tres")
        .and_then(|tres| tres.get("allocated"))
        .and_then(|value| value.as_array())
    else {
        return 0.0;
    };
    allocated
        .iter()
        .filter(|entry| {
            entry.get("type").and_then(|v| v.as_str()) == Some("gres")
                && entry.get("name").and_then(|v| v.as_str()) == Some("gpu")
        })
        .filter_map(|entry| entry.get("count").and_then(value_to_f64))
        .sum()
}

fn state_label(job: &Value) -> Option<&str> {
    let current = job.get("state")?.get("current")?;
    match current {
        Value::Array(items) => items.first().and_then(|value| value.as_str()),
        Value::String(label) => Some(label.as_str()),
        _ => None,
    }
}

fn map_state(label: &str) -> Option<JobState> {
    // "CANCELLED by <uid>" carries the cancelling uid as a suffix.
    let label = label.split_whitespace().next()?;
    match label {
        "PENDING" | "REQUEUED" | "SUSPENDED" => Some(JobState::Pending),
        "RUNNING" => Some(JobState::Running),
        "COMPLETED" => Some(JobState::Completed),
        "FAILED" | "TIMEOUT" | "NODE_FAIL" | "OUT_OF_MEMORY" | "PREEMPTED" => {
            Some(JobState::Failed)
        }
        "CANCELLED" => Some(JobState::Cancelled),
        _ => None,
    }
}

fn job_id(job: &Value) -> Option<String> {
    match job.get("job_id") {
        Some(Value::Number(id)) => Some(id.to_string()),
        Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
        _ => None,
    }
}

/// Converts one sacct job entry into a `JobRecord`. Returns the reason when a
/// required field is missing or unrecognized so the caller can record it.
pub(crate) fn job_from_value(
    partition: Partition,
    job: &Value,
) -> std::result::Result<JobRecord, String> {
    let job_id = job_id(job).ok_or("missing job_id")?;
    let user = job
        .get("user")
        .and_then(|value| value.as_str())
        .ok_or("missing user")?
        .to_string();
    let account = match job.get("account").and_then(|value| value.as_str()) {
        Some(account) if !account.is_empty() => account.to_string(),
        // Some records leave the account blank; usage is billed to the user.
        _ => user.clone(),
    };
    let label = state_label(job).ok_or("missing state.current")?;
    let state = map_state(label).ok_or_else(|| format!("unrecognized state {label:?}"))?;
    let submit_time = timestamp_field(job, "submission").ok_or("missing time.submission")?;
    let mut start_time = timestamp_field(job, "start");
    let end_time = timestamp_field(job, "end");
    // A pending job must not carry a start timestamp, whatever sacct says.
    if state == JobState::Pending {
        start_time = None;
    }
    // Clamp clock skew so wait times stay non-negative.
    if let Some(start) = start_time
        && start < submit_time
    {
        start_time = Some(submit_time);
    }

    let n_gpus = gpu_count(job);
    let elapsed_secs = job
        .get("time")
        .and_then(|time| time.get("elapsed"))
        .and_then(value_to_f64)
        .ok_or("missing time.elapsed")?;
    let limit_mins = job
        .get("time")
        .and_then(|time| time.get("limit"))
        .and_then(limit_minutes)
        .unwrap_or(0.0);

    Ok(JobRecord {
        job_id,
        account,
        user,
        partition,
        submit_time,
        start_time,
        end_time,
        gpu_hours_requested: limit_mins * n_gpus / 60.0,
        gpu_hours_charged: elapsed_secs * n_gpus / 3600.0,
        state,
    })
}

#[derive(Debug)]
pub(crate) struct ParsedPayload {
    pub records: Vec<JobRecord>,
    pub records_seen: usize,
    pub issues: Vec<NormalizeIssue>,
}

/// Parses one partition's `sacct --json` payload. Individual bad records are
/// skipped and reported as issues; a payload without a `jobs` array is
/// malformed as a whole.
pub(crate) fn parse_payload(
    partition: Partition,
    payload: &Value,
) -> crate::types::Result<ParsedPayload> {
    let jobs = payload
        .get("jobs")
        .and_then(|value| value.as_array())
        .ok_or_else(|| NormalizeError::MalformedPayload {
            partition: partition.as_str().to_string(),
            reason: "top-level jobs array missing".to_string(),
        })?;

    let mut records = Vec::with_capacity(jobs.len());
    let mut issues = Vec::new();
    for job in jobs {
        match job_from_value(partition, job) {
            Ok(record) => records.push(record),
            Err(reason) => issues.push(NormalizeIssue {
                partition: partition.as_str().to_string(),
                job_id: job_id(job),
                message: reason,
            }),
        }
    }
    Ok(ParsedPayload {
        records,
        records_seen: jobs.len(),
        issues,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sacct_job(
        id: u64,
        state: &str,
        submission: i64,
        start: i64,
        end: i64,
        elapsed: f64,
        gpus: u64,
    ) -> Value {
        serde_json::json!({
            "job_id": id,
            "account": "astro",
            "user": "jdoe",
            "state": { "current": [state] },
            "time": {
                "submission": submission,
                "start": start,
                "end": end,
                "elapsed": elapsed,
                "limit": { "set": true, "infinite": false, "number": 720 }
            },
            "tres": { "allocated": [
                { "type": "gres", "name": "gpu", "count": gpus },
                { "type": "cpu", "name": "", "count": 16 }
            ]}
        })
    }

    #[test]
    fn parses_completed_job() {
        let job = sacct_job(
            41,
            "COMPLETED",
            1_760_000_000,
            1_760_003_600,
            1_760_010_800,
            7_200.0,
            4,
        );
        let record = job_from_value(Partition::Core, &job).expect("record");
        assert_eq!(record.job_id, "41");
        assert_eq!(record.account, "astro");
        assert_eq!(record.user, "jdoe");
        assert_eq!(record.state, JobState::Completed);
        // 7200s elapsed on 4 GPUs = 8 GPU-hours charged.
        assert!((record.gpu_hours_charged - 8.0).abs() < 1e-9);
        // 720 minutes limit on 4 GPUs = 48 GPU-hours requested.
        assert!((record.gpu_hours_requested - 48.0).abs() < 1e-9);
        assert_eq!(record.wait_hours(), Some(1.0));
    }

    #[test]
    fn pending_job_has_no_start() {
        let job = sacct_job(42, "PENDING", 1_760_000_000, 0, 0, 0.0, 2);
        let record = job_from_value(Partition::Campus, &job).expect("record");
        assert_eq!(record.state, JobState::Pending);
        assert_eq!(record.start_time, None);
        assert_eq!(record.end_time, None);
        assert_eq!(record.gpu_hours_charged, 0.0);
        assert!((record.gpu_hours_requested - 24.0).abs() < 1e-9);
    }

    #[test]
    fn cancelled_by_uid_maps_to_cancelled() {
        let job = sacct_job(
            43,
            "CANCELLED by 31415",
            1_760_000_000,
            1_760_000_100,
            1_760_000_200,
            100.0,
            1,
        );
        let record = job_from_value(Partition::Core, &job).expect("record");
        assert_eq!(record.state, JobState::Cancelled);
    }

    #[test]
    fn timeout_maps_to_failed() {
        let job = sacct_job(
            44,
            "TIMEOUT",
            1_760_000_000,
            1_760_000_100,
            1_760_043_300,
            43_200.0,
            1,
        );
        let record = job_from_value(Partition::Core, &job).expect("record");
        assert_eq!(record.state, JobState::Failed);
    }

    #[test]
    fn unknown_state_is_rejected() {
        let job = sacct_job(45, "BOOSTED", 1_760_000_000, 0, 0, 0.0, 1);
        let err = job_from_value(Partition::Core, &job).expect_err("reject");
        assert!(err.contains("BOOSTED"));
    }

    #[test]
    fn blank_account_falls_back_to_user() {
        let mut job = sacct_job(46, "RUNNING", 1_760_000_000, 1_760_000_100, 0, 600.0, 1);
        job["account"] = Value::String(String::new());
        let record = job_from_value(Partition::Core, &job).expect("record");
        assert_eq!(record.account, "jdoe");
    }

    #[test]
    fn start_before_submit_is_clamped() {
        let job = sacct_job(47, "RUNNING", 1_760_000_000, 1_759_999_000, 0, 600.0, 1);
        let record = job_from_value(Partition::Core, &job).expect("record");
        assert_eq!(record.start_time, Some(record.submit_time));
        assert_eq!(record.wait_hours(), Some(0.0));
    }

    #[test]
    fn unset_limit_means_zero_requested() {
        let mut job = sacct_job(48, "PENDING", 1_760_000_000, 0, 0, 0.0, 2);
        job["time"]["limit"] = serde_json::json!({ "set": false, "infinite": false, "number": 0 });
        let record = job_from_value(Partition::Core, &job).expect("record");
        assert_eq!(record.gpu_hours_requested, 0.0);
    }

    #[test]
    fn payload_without_jobs_is_malformed() {
        let payload = serde_json::json!({ "meta": {} });
        let err = parse_payload(Partition::Core, &payload).expect_err("malformed");
        assert!(matches!(err, NormalizeError::MalformedPayload { .. }));
    }

    #[test]
    fn bad_records_are_skipped_and_counted() {
        let payload = serde_json::json!({ "jobs": [
            sacct_job(50, "COMPLETED", 1_760_000_000, 1_760_000_100, 1_760_003_700, 3_600.0, 1),
            { "job_id": 51, "user": "jdoe" },
            sacct_job(52, "MYSTERY", 1_760_000_000, 0, 0, 0.0, 1),
        ]});
        let parsed = parse_payload(Partition::Core, &payload).expect("parsed");
        assert_eq!(parsed.records_seen, 3);
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.issues.len(), 2);
        assert_eq!(parsed.issues[0].job_id.as_deref(), Some("51"));
    }
}
