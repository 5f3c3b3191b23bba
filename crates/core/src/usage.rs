use crate::model::{JobRecord, SizeClass, UsageKey, UsageSummary, Window};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateOptions {
    pub small_job_max_gpu_hours: f64,
    pub long_wait_hours: f64,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        AggregateOptions {
            small_job_max_gpu_hours: 50.0,
            long_wait_hours: 6.0,
        }
    }
}

pub fn classify_size(effective_gpu_hours: f64, small_max_gpu_hours: f64) -> SizeClass {
    if effective_gpu_hours > small_max_gpu_hours {
        SizeClass::Large
    } else {
        SizeClass::Small
    }
}

pub fn job_in_window(job: &JobRecord, window: &Window, now: DateTime<Utc>) -> bool {
    match job.activity_interval(now) {
        Some((start, end)) => {
            if end > start {
                window.overlaps(start, end)
            } else {
                window.contains(start)
            }
        }
        None => window.contains(job.submit_time),
    }
}

#[derive(Debug, Default)]
struct Bucket {
    total_gpu_hours: f64,
    job_count: u64,
    waits: Vec<f64>,
}

pub fn aggregate(
    records: &[JobRecord],
    windows: &[Window],
    now: DateTime<Utc>,
    options: &AggregateOptions,
) -> BTreeMap<UsageKey, UsageSummary> {
    let mut out = BTreeMap::new();
    for window in windows {
        let mut buckets: BTreeMap<UsageKey, Bucket> = BTreeMap::new();
        for job in records {
            if !job_in_window(job, window, now) {
                continue;
            }
            let class = classify_size(job.effective_gpu_hours(), options.small_job_max_gpu_hours);
            // Each job lands in its own bucket and in the rollup buckets.
            for account in [None, Some(job.account.clone())] {
                for size_class in [None, Some(class)] {
                    let key = UsageKey {
                        account: account.clone(),
                        partition: job.partition,
                        window_label: window.label.clone(),
                        size_class,
                    };
                    let bucket = buckets.entry(key).or_default();
                    bucket.total_gpu_hours += job.gpu_hours_charged;
                    bucket.job_count += 1;
                    if let Some(wait) = job.wait_hours() {
                        bucket.waits.push(wait);
                    }
                }
            }
        }
        for (key, bucket) in buckets {
            out.insert(key, finalize(bucket, window, options));
        }
    }
    out
}

fn finalize(bucket: Bucket, window: &Window, options: &AggregateOptions) -> UsageSummary {
    let mut waits = bucket.waits;
    let mean = mean(&waits);
    let pct = pct_over(&waits, options.long_wait_hours);
    let median = median(&mut waits);
    UsageSummary {
        total_gpu_hours: bucket.total_gpu_hours,
        job_count: bucket.job_count,
        started_job_count: waits.len() as u64,
        mean_wait_hours: mean,
        median_wait_hours: median,
        pct_wait_over_threshold: pct,
        window_start: window.start,
        window_end: window.end,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

fn pct_over(values: &[f64], threshold_hours: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let over = values.iter().filter(|wait| **wait > threshold_hours).count();
    Some(over as f64 * 100.0 / values.len() as f64)
}
