use chrono::{DateTime, Utc};
use tracing::info;

use ingest::normalize_snapshot;
use quota_core::{UsageReport, aggregate, build_usage_report};

use crate::error::Result;
use crate::sacct::{AccountingSource, fetch_snapshot};
use crate::services::SharedConfig;
use crate::util::time::trailing_window;

const REPORT_DAYS: i64 = 30;

/// Builds the periodic utilization and wait-time report over every reporting
/// partition: the trailing 30 days against the 30 before that.
#[derive(Clone)]
pub struct ReportService {
    config: SharedConfig,
}

impl ReportService {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, source: &dyn AccountingSource, now: DateTime<Utc>) -> Result<UsageReport> {
        let current = trailing_window("30d", REPORT_DAYS, 0, now);
        let previous = trailing_window("prev-30d", REPORT_DAYS, REPORT_DAYS, now);
        let partitions = &self.config.partitions.report_partitions;

        let payloads = fetch_snapshot(source, partitions, previous.start, now)?;
        let (records, stats) = normalize_snapshot(&payloads)?;
        info!(
            records = stats.records_seen,
            skipped = stats.records_skipped,
            "report snapshot normalized"
        );

        let summaries = aggregate(
            &records,
            &[current.clone(), previous.clone()],
            now,
            &self.config.report.options(),
        );
        Ok(build_usage_report(&summaries, &current, &previous, partitions))
    }
}
