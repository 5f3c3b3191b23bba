pub mod model;
pub mod notify;
pub mod quota;
pub mod report;
pub mod usage;

pub use model::{
    JobRecord, JobState, Notification, NotificationKind, NotificationState, Partition, PolicySet,
    QuotaPeriod, QuotaPolicy, QuotaStatus, QuotaVerdict, SizeClass, UsageKey, UsageSummary, Window,
};
pub use notify::{NotifyDecision, decide};
pub use quota::{Evaluation, evaluate, status_for_usage};
pub use report::{
    FORECAST_HORIZONS_HOURS, ForecastPoint, MetricRecord, MetricScope, QuotaCheck, UsageReport,
    UtilizationRow, WaitRow, build_daily_metrics, build_quota_check, build_usage_report,
    format_duration_short, format_gpu_hours, format_pct_change, render_progress_bar,
};
pub use usage::{AggregateOptions, aggregate, classify_size, job_in_window};
