use crate::model::{
    JobRecord, Partition, QuotaPeriod, QuotaPolicy, SizeClass, UsageKey, UsageSummary, Window,
};
use crate::usage::job_in_window;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UtilizationRow {
    pub partition: Partition,
    pub gpu_hours: f64,
    pub gpu_hours_prev: f64,
    pub job_count: u64,
    pub job_count_prev: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaitRow {
    pub partition: Partition,
    pub size_class: SizeClass,
    pub job_count: u64,
    pub job_count_prev: u64,
    pub median_wait_hours: Option<f64>,
    pub median_wait_hours_prev: Option<f64>,
    pub pct_long_wait: Option<f64>,
    pub pct_long_wait_prev: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageReport {
    pub window: Window,
    pub previous_window: Window,
    pub utilization: Vec<UtilizationRow>,
    pub waits: Vec<WaitRow>,
}

/// Builds the periodic report tables from cluster-wide rollup buckets,
/// comparing the current window against the previous one.
pub fn build_usage_report(
    summaries: &BTreeMap<UsageKey, UsageSummary>,
    current: &Window,
    previous: &Window,
    partitions: &[Partition],
) -> UsageReport {
    let lookup = |partition: Partition, label: &str, size_class: Option<SizeClass>| {
        summaries.get(&UsageKey {
            account: None,
            partition,
            window_label: label.to_string(),
            size_class,
        })
    };

    let mut utilization = Vec::new();
    let mut waits = Vec::new();
    for &partition in partitions {
        let cur = lookup(partition, &current.label, None);
        let prev = lookup(partition, &previous.label, None);
        utilization.push(UtilizationRow {
            partition,
            gpu_hours: cur.map(|s| s.total_gpu_hours).unwrap_or(0.0),
            gpu_hours_prev: prev.map(|s| s.total_gpu_hours).unwrap_or(0.0),
            job_count: cur.map(|s| s.job_count).unwrap_or(0),
            job_count_prev: prev.map(|s| s.job_count).unwrap_or(0),
        });
        for size_class in [SizeClass::Small, SizeClass::Large] {
            let cur = lookup(partition, &current.label, Some(size_class));
            let prev = lookup(partition, &previous.label, Some(size_class));
            waits.push(WaitRow {
                partition,
                size_class,
                job_count: cur.map(|s| s.job_count).unwrap_or(0),
                job_count_prev: prev.map(|s| s.job_count).unwrap_or(0),
                median_wait_hours: cur.and_then(|s| s.median_wait_hours),
                median_wait_hours_prev: prev.and_then(|s| s.median_wait_hours),
                pct_long_wait: cur.and_then(|s| s.pct_wait_over_threshold),
                pct_long_wait_prev: prev.and_then(|s| s.pct_wait_over_threshold),
            });
        }
    }
    utilization.sort_by(|a, b| {
        b.gpu_hours
            .partial_cmp(&a.gpu_hours)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    UsageReport {
        window: current.clone(),
        previous_window: previous.clone(),
        utilization,
        waits,
    }
}

pub const FORECAST_HORIZONS_HOURS: [i64; 4] = [12, 24, 72, 168];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub hours_ahead: i64,
    pub available_gpu_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaCheck {
    pub account: String,
    pub partition: Partition,
    pub window: Window,
    pub quota_gpu_hours: f64,
    pub used_gpu_hours: f64,
    pub remaining_gpu_hours: f64,
    pub quota_period: QuotaPeriod,
    pub forecast: Vec<ForecastPoint>,
}

/// Self-check for one account on one partition. For rolling quota periods it
/// also projects how much quota frees up as old jobs fall out of the window.
pub fn build_quota_check(
    records: &[JobRecord],
    account: &str,
    partition: Partition,
    policy: &QuotaPolicy,
    window: &Window,
    now: DateTime<Utc>,
) -> QuotaCheck {
    let used = account_usage(records, account, partition, window, now);
    let remaining = (policy.quota_gpu_hours - used).max(0.0);
    let forecast = match policy.quota_period {
        QuotaPeriod::RollingDays(_) if !policy.is_unlimited() => FORECAST_HORIZONS_HOURS
            .iter()
            .map(|&hours_ahead| {
                let shifted_start = window.start + chrono::Duration::hours(hours_ahead);
                let still_counted: f64 = records
                    .iter()
                    .filter(|job| job.account == account && job.partition == partition)
                    .filter(|job| {
                        job.activity_interval(now)
                            .map(|(_, end)| end > shifted_start)
                            .unwrap_or(false)
                    })
                    .map(|job| job.gpu_hours_charged)
                    .sum();
                ForecastPoint {
                    hours_ahead,
                    available_gpu_hours: (policy.quota_gpu_hours - still_counted)
                        .clamp(0.0, policy.quota_gpu_hours),
                }
            })
            .collect(),
        _ => Vec::new(),
    };
    QuotaCheck {
        account: account.to_string(),
        partition,
        window: window.clone(),
        quota_gpu_hours: policy.quota_gpu_hours,
        used_gpu_hours: used,
        remaining_gpu_hours: remaining,
        quota_period: policy.quota_period,
        forecast,
    }
}

fn account_usage(
    records: &[JobRecord],
    account: &str,
    partition: Partition,
    window: &Window,
    now: DateTime<Utc>,
) -> f64 {
    records
        .iter()
        .filter(|job| job.account == account && job.partition == partition)
        .filter(|job| job_in_window(job, window, now))
        .map(|job| job.gpu_hours_charged)
        .sum()
}

pub fn render_progress_bar(fraction: f64, slots: usize) -> String {
    let clamped = fraction.clamp(0.0, 1.0);
    let filled = (clamped * slots as f64).round() as usize;
    let mut bar = String::with_capacity(slots + 2);
    bar.push('[');
    for index in 0..slots {
        bar.push(if index < filled { '#' } else { '-' });
    }
    bar.push(']');
    bar
}

/// "+12%" against the previous value, empty when there is no baseline.
pub fn format_pct_change(current: f64, previous: f64) -> String {
    if previous <= 0.0 {
        return String::new();
    }
    let change = ((current - previous) / previous * 100.0).round();
    if change >= 0.0 {
        format!("+{change:.0}%")
    } else {
        format!("{change:.0}%")
    }
}

/// "1h15", "15min" or "< 1min".
pub fn format_duration_short(hours: f64) -> String {
    let total_minutes = (hours * 60.0).round() as i64;
    if total_minutes < 1 {
        return "< 1min".to_string();
    }
    if total_minutes < 60 {
        return format!("{total_minutes}min");
    }
    format!("{}h{:02}", total_minutes / 60, total_minutes % 60)
}

pub fn format_gpu_hours(value: f64) -> String {
    if value >= 1000.0 {
        format!("{:.0}k", value / 1000.0)
    } else {
        format!("{value:.0}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricScope {
    All,
    Small,
    Large,
}

impl MetricScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricScope::All => "all",
            MetricScope::Small => "small",
            MetricScope::Large => "large",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub name: String,
    pub value: f64,
    pub date: NaiveDate,
    pub partition: Option<Partition>,
    pub scope: MetricScope,
}

/// Flattens one day's rollup buckets into dashboard metric records. Counts
/// are emitted as zero for idle partitions so the series stays continuous;
/// wait statistics are omitted when no job started.
pub fn build_daily_metrics(
    summaries: &BTreeMap<UsageKey, UsageSummary>,
    day_label: &str,
    date: NaiveDate,
    partitions: &[Partition],
) -> Vec<MetricRecord> {
    let mut records = Vec::new();
    let mut total_gpu_hours = 0.0;
    let mut total_jobs = 0u64;

    for &partition in partitions {
        for (scope, size_class) in [
            (MetricScope::All, None),
            (MetricScope::Small, Some(SizeClass::Small)),
            (MetricScope::Large, Some(SizeClass::Large)),
        ] {
            let summary = summaries.get(&UsageKey {
                account: None,
                partition,
                window_label: day_label.to_string(),
                size_class,
            });
            let gpu_hours = summary.map(|s| s.total_gpu_hours).unwrap_or(0.0);
            let job_count = summary.map(|s| s.job_count).unwrap_or(0);
            if scope == MetricScope::All {
                total_gpu_hours += gpu_hours;
                total_jobs += job_count;
            }
            records.push(metric("gpu_hours_total", gpu_hours, date, Some(partition), scope));
            records.push(metric("job_count", job_count as f64, date, Some(partition), scope));
            if let Some(median) = summary.and_then(|s| s.median_wait_hours) {
                records.push(metric("median_wait_hours", median, date, Some(partition), scope));
            }
            if let Some(pct) = summary.and_then(|s| s.pct_wait_over_threshold) {
                records.push(metric("long_wait_pct", pct, date, Some(partition), scope));
            }
        }
    }

    records.push(metric("gpu_hours_total", total_gpu_hours, date, None, MetricScope::All));
    records.push(metric("job_count", total_jobs as f64, date, None, MetricScope::All));
    records
}

fn metric(
    name: &str,
    value: f64,
    date: NaiveDate,
    partition: Option<Partition>,
    scope: MetricScope,
) -> MetricRecord {
    MetricRecord {
        name: name.to_string(),
        value,
        date,
        partition,
        scope,
    }
}
