use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use ingest::normalize_snapshot;
use quota_core::{QuotaPeriod, aggregate, decide, evaluate};

use crate::error::Result;
use crate::notifier::{Notifier, render_dispatch};
use crate::policy::load_policy_set;
use crate::sacct::{AccountingSource, fetch_snapshot};
use crate::services::{SharedConfig, open_db};
use crate::util::time::{QUOTA_WINDOW_LABEL, quota_period_window};

/// Outcome of one admin monitor run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MonitorRunStats {
    pub accounts_evaluated: usize,
    pub notifications_sent: usize,
    pub notifications_failed: usize,
    /// Keys whose state update failed; they are retried on the next run.
    pub keys_skipped: usize,
    pub records_seen: usize,
    pub records_skipped: usize,
}

/// The cron pipeline: fetch accounting data for the quota partition, evaluate
/// every account against policy, and deliver whatever the deduplicator says
/// is due. State is committed before delivery is attempted, so a crash
/// mid-run drops a message rather than repeating one.
#[derive(Clone)]
pub struct MonitorService {
    config: SharedConfig,
}

impl MonitorService {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    pub fn run(
        &self,
        source: &dyn AccountingSource,
        notifier: &dyn Notifier,
        now: DateTime<Utc>,
    ) -> Result<MonitorRunStats> {
        let policies = load_policy_set(&self.config.policy_defaults_path)?;
        let window = quota_period_window(policies.default.quota_period, now)?;
        let partition = self.config.partitions.quota_partition;

        let payloads = fetch_snapshot(source, &[partition], window.start, now)?;
        let (records, normalize_stats) = normalize_snapshot(&payloads)?;
        let summaries = aggregate(
            &records,
            std::slice::from_ref(&window),
            now,
            &self.config.monitor.options(),
        );

        let mut db = open_db(&self.config)?;
        let prior = db.list_notification_states(QUOTA_WINDOW_LABEL)?;
        let evaluation = evaluate(&summaries, QUOTA_WINDOW_LABEL, &policies, &prior, now);

        for account in &evaluation.policy_fallbacks {
            db.record_policy_fallback(account, now)?;
        }

        let mut stats = MonitorRunStats {
            accounts_evaluated: evaluation.verdicts.len(),
            records_seen: normalize_stats.records_seen,
            records_skipped: normalize_stats.records_skipped,
            ..MonitorRunStats::default()
        };

        for verdict in &evaluation.verdicts {
            let (policy, _) = policies.resolve(&verdict.account);
            let update = db.update_notification_state(
                &verdict.account,
                verdict.partition,
                &verdict.window_label,
                |prev| {
                    let decision = decide(prev, verdict, &policy, now);
                    (decision.state, decision.notification)
                },
            );
            let notification = match update {
                Ok(notification) => notification,
                Err(err) => {
                    warn!(
                        account = verdict.account.as_str(),
                        partition = verdict.partition.as_str(),
                        error = %err,
                        "state update failed; key skipped this run"
                    );
                    stats.keys_skipped += 1;
                    continue;
                }
            };
            let Some(notification) = notification else {
                continue;
            };
            let dispatch = render_dispatch(&notification);
            match notifier.notify(&dispatch) {
                Ok(()) => {
                    db.record_notification(&notification, true, None)?;
                    stats.notifications_sent += 1;
                }
                Err(err) => {
                    warn!(
                        account = notification.account.as_str(),
                        error = %err,
                        "notification delivery failed"
                    );
                    db.record_notification(&notification, false, Some(&err.to_string()))?;
                    stats.notifications_failed += 1;
                }
            }
        }

        let cutoff = now - Duration::days(period_days(policies.default.quota_period));
        let purged = db.purge_clear_states(cutoff)?;

        info!(
            accounts = stats.accounts_evaluated,
            sent = stats.notifications_sent,
            failed = stats.notifications_failed,
            skipped = stats.keys_skipped,
            purged,
            "monitor run complete"
        );
        Ok(stats)
    }
}

fn period_days(period: QuotaPeriod) -> i64 {
    match period {
        QuotaPeriod::RollingDays(days) => days as i64,
        QuotaPeriod::CalendarMonth => 31,
    }
}
