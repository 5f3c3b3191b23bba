use chrono::{DateTime, Duration, Utc};
use tracing::info;

use ingest::normalize_snapshot;
use quota_core::{MetricRecord, Window, aggregate, build_daily_metrics};

use crate::error::{AppError, Result};
use crate::metrics::MetricsSink;
use crate::sacct::{AccountingSource, fetch_snapshot};
use crate::services::SharedConfig;
use crate::util::time::day_window;

/// Spools per-day dashboard metrics. A normal run covers yesterday; a
/// history rewrite covers the trailing `history_days` days, oldest first, so
/// the uploader overwrites day by day in order.
#[derive(Clone)]
pub struct DashboardService {
    config: SharedConfig,
}

impl DashboardService {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    pub fn run(
        &self,
        source: &dyn AccountingSource,
        sink: &dyn MetricsSink,
        history_days: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<MetricRecord>> {
        let days = history_days.max(1) as i64;
        let yesterday = (now - Duration::days(1)).date_naive();
        let windows: Vec<Window> = (0..days)
            .rev()
            .map(|back| day_window(yesterday - Duration::days(back)))
            .collect::<Result<_>>()?;
        let (first, last) = match (windows.first(), windows.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(AppError::InvalidInput("empty metrics range".to_string())),
        };
        let partitions = &self.config.partitions.report_partitions;

        let payloads = fetch_snapshot(source, partitions, first.start, last.end)?;
        let (records, _) = normalize_snapshot(&payloads)?;
        let summaries = aggregate(&records, &windows, now, &self.config.report.options());

        let mut metrics = Vec::new();
        for window in &windows {
            metrics.extend(build_daily_metrics(
                &summaries,
                &window.label,
                window.start.date_naive(),
                partitions,
            ));
        }
        sink.export(&metrics)?;
        info!(days, records = metrics.len(), "dashboard metrics spooled");
        Ok(metrics)
    }
}
