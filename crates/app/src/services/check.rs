use chrono::{DateTime, Utc};

use ingest::normalize_snapshot;
use quota_core::{Partition, QuotaCheck, build_quota_check};

use crate::error::Result;
use crate::policy::load_policy_set;
use crate::sacct::{AccountingQuery, AccountingSource};
use crate::services::SharedConfig;
use crate::util::time::quota_period_window;

/// Self-check for a single user: how much of the quota is used and when
/// capacity frees up. Reads nothing from the db; the answer comes straight
/// from accounting data and policy.
#[derive(Clone)]
pub struct CheckService {
    config: SharedConfig,
}

impl CheckService {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    pub fn run(
        &self,
        source: &dyn AccountingSource,
        account: &str,
        partition: Option<Partition>,
        now: DateTime<Utc>,
    ) -> Result<QuotaCheck> {
        let policies = load_policy_set(&self.config.policy_defaults_path)?;
        let (policy, _) = policies.resolve(account);
        let partition = partition.unwrap_or(self.config.partitions.quota_partition);
        let window = quota_period_window(policy.quota_period, now)?;

        let payload = source.fetch(&AccountingQuery {
            partition,
            start: window.start,
            end: now,
            user: Some(account.to_string()),
        })?;
        let (records, _) = normalize_snapshot(&[payload])?;

        Ok(build_quota_check(
            &records, account, partition, &policy, &window, now,
        ))
    }
}
