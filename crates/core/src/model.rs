use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Partition {
    #[serde(rename = "pli-c")]
    Core,
    #[serde(rename = "pli")]
    Campus,
    #[serde(rename = "pli-lc")]
    LargeCampus,
    #[serde(rename = "pli-p")]
    Premium,
}

impl Partition {
    pub const ALL: [Partition; 4] = [
        Partition::Core,
        Partition::Campus,
        Partition::LargeCampus,
        Partition::Premium,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Core => "pli-c",
            Partition::Campus => "pli",
            Partition::LargeCampus => "pli-lc",
            Partition::Premium => "pli-p",
        }
    }

    pub fn parse(value: &str) -> Option<Partition> {
        match value {
            "pli-c" => Some(Partition::Core),
            "pli" => Some(Partition::Campus),
            "pli-lc" => Some(Partition::LargeCampus),
            "pli-p" => Some(Partition::Premium),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeClass {
    Small,
    Large,
}

impl SizeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeClass::Small => "small",
            SizeClass::Large => "large",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub account: String,
    pub user: String,
    pub partition: Partition,
    pub submit_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub gpu_hours_requested: f64,
    pub gpu_hours_charged: f64,
    pub state: JobState,
}

impl JobRecord {
    pub fn effective_gpu_hours(&self) -> f64 {
        if self.start_time.is_some() {
            self.gpu_hours_charged
        } else {
            self.gpu_hours_requested
        }
    }

    pub fn wait_hours(&self) -> Option<f64> {
        let start = self.start_time?;
        let seconds = (start - self.submit_time).num_seconds();
        Some((seconds.max(0) as f64) / 3600.0)
    }

    pub fn activity_interval(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.start_time?;
        Some((start, self.end_time.unwrap_or(now)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub label: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn new(label: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Window {
        Window {
            label: label.into(),
            start,
            end,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start < self.end && end > self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaPeriod {
    RollingDays(u32),
    CalendarMonth,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuotaPolicy {
    pub quota_gpu_hours: f64,
    pub warn_fraction: f64,
    pub breach_grace_hours: f64,
    pub notify_cooldown_hours: f64,
    pub quota_period: QuotaPeriod,
}

impl QuotaPolicy {
    pub fn is_unlimited(&self) -> bool {
        self.quota_gpu_hours <= 0.0
    }
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        QuotaPolicy {
            quota_gpu_hours: 500.0,
            warn_fraction: 0.8,
            breach_grace_hours: 24.0,
            notify_cooldown_hours: 24.0,
            quota_period: QuotaPeriod::RollingDays(30),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicySet {
    pub default: QuotaPolicy,
    #[serde(default)]
    pub accounts: BTreeMap<String, QuotaPolicy>,
}

impl PolicySet {
    pub fn resolve(&self, account: &str) -> (QuotaPolicy, bool) {
        match self.accounts.get(account) {
            Some(policy) => (*policy, false),
            None => (self.default, true),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QuotaStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "WARN")]
    Warn,
    #[serde(rename = "BREACH")]
    Breach,
}

impl QuotaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaStatus::Ok => "OK",
            QuotaStatus::Warn => "WARN",
            QuotaStatus::Breach => "BREACH",
        }
    }

    pub fn parse(value: &str) -> Option<QuotaStatus> {
        match value {
            "OK" => Some(QuotaStatus::Ok),
            "WARN" => Some(QuotaStatus::Warn),
            "BREACH" => Some(QuotaStatus::Breach),
            _ => None,
        }
    }
}

/// Aggregation bucket identity. `None` dimensions are rollups: a `None`
/// account covers every account, a `None` size class every job size.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UsageKey {
    pub account: Option<String>,
    pub partition: Partition,
    pub window_label: String,
    pub size_class: Option<SizeClass>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub total_gpu_hours: f64,
    pub job_count: u64,
    pub started_job_count: u64,
    pub mean_wait_hours: Option<f64>,
    pub median_wait_hours: Option<f64>,
    pub pct_wait_over_threshold: Option<f64>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaVerdict {
    pub account: String,
    pub partition: Partition,
    pub window_label: String,
    pub status: QuotaStatus,
    pub usage_fraction: f64,
    pub gpu_hours_used: f64,
    pub quota_gpu_hours: f64,
    /// False while a breach is still inside its grace period.
    pub actionable: bool,
    pub first_observed_at: DateTime<Utc>,
    pub last_observed_at: DateTime<Utc>,
}

/// Per-key notification ledger persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationState {
    pub account: String,
    pub partition: Partition,
    pub window_label: String,
    pub last_status: QuotaStatus,
    pub last_notified_at: Option<DateTime<Utc>>,
    pub consecutive_breach_observations: u32,
    pub first_breach_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Escalation,
    Reminder,
    Resolved,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Escalation => "escalation",
            NotificationKind::Reminder => "reminder",
            NotificationKind::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub account: String,
    pub partition: Partition,
    pub window_label: String,
    pub severity: QuotaStatus,
    pub kind: NotificationKind,
    pub gpu_hours_used: f64,
    pub quota_gpu_hours: f64,
    pub usage_fraction: f64,
    pub issued_at: DateTime<Utc>,
}
