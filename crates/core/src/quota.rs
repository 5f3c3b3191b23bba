use crate::model::{
    NotificationState, Partition, PolicySet, QuotaPolicy, QuotaStatus, QuotaVerdict, UsageKey,
    UsageSummary,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub verdicts: Vec<QuotaVerdict>,
    /// Accounts with usage that fell back to the default policy this run.
    pub policy_fallbacks: Vec<String>,
}

pub fn status_for_usage(gpu_hours_used: f64, policy: &QuotaPolicy) -> (QuotaStatus, f64) {
    if policy.is_unlimited() {
        return (QuotaStatus::Ok, 0.0);
    }
    let fraction = gpu_hours_used / policy.quota_gpu_hours;
    let status = if fraction >= 1.0 {
        QuotaStatus::Breach
    } else if fraction >= policy.warn_fraction {
        QuotaStatus::Warn
    } else {
        QuotaStatus::Ok
    };
    (status, fraction)
}

pub fn evaluate(
    summaries: &BTreeMap<UsageKey, UsageSummary>,
    window_label: &str,
    policies: &PolicySet,
    prior_states: &[NotificationState],
    now: DateTime<Utc>,
) -> Evaluation {
    let prior: BTreeMap<(&str, Partition), &NotificationState> = prior_states
        .iter()
        .filter(|state| state.window_label == window_label)
        .map(|state| ((state.account.as_str(), state.partition), state))
        .collect();

    let mut evaluation = Evaluation::default();
    let mut seen: BTreeSet<(&str, Partition)> = BTreeSet::new();

    for (key, summary) in summaries {
        if key.window_label != window_label || key.size_class.is_some() {
            continue;
        }
        let Some(account) = key.account.as_deref() else {
            continue;
        };
        let (policy, fallback) = policies.resolve(account);
        if fallback
            && summary.total_gpu_hours > 0.0
            && !evaluation.policy_fallbacks.iter().any(|name| name == account)
        {
            evaluation.policy_fallbacks.push(account.to_string());
        }
        let (status, fraction) = status_for_usage(summary.total_gpu_hours, &policy);
        let state = prior.get(&(account, key.partition)).copied();
        let actionable =
            status == QuotaStatus::Breach && breach_grace_elapsed(state, &policy, now);
        let first_observed_at = match (status, state) {
            (QuotaStatus::Breach, Some(st)) if st.consecutive_breach_observations > 0 => {
                st.first_breach_at.unwrap_or(now)
            }
            _ => now,
        };
        seen.insert((account, key.partition));
        evaluation.verdicts.push(QuotaVerdict {
            account: account.to_string(),
            partition: key.partition,
            window_label: window_label.to_string(),
            status,
            usage_fraction: fraction,
            gpu_hours_used: summary.total_gpu_hours,
            quota_gpu_hours: policy.quota_gpu_hours,
            actionable,
            first_observed_at,
            last_observed_at: now,
        });
    }

    // A key holding non-OK state with no usage left in the window resolves
    // to OK so the deduplicator can close it out.
    for state in prior_states {
        if state.window_label != window_label || state.last_status == QuotaStatus::Ok {
            continue;
        }
        if seen.contains(&(state.account.as_str(), state.partition)) {
            continue;
        }
        let (policy, _) = policies.resolve(&state.account);
        evaluation.verdicts.push(QuotaVerdict {
            account: state.account.clone(),
            partition: state.partition,
            window_label: window_label.to_string(),
            status: QuotaStatus::Ok,
            usage_fraction: 0.0,
            gpu_hours_used: 0.0,
            quota_gpu_hours: policy.quota_gpu_hours,
            actionable: false,
            first_observed_at: now,
            last_observed_at: now,
        });
    }

    evaluation
}

fn breach_grace_elapsed(
    state: Option<&NotificationState>,
    policy: &QuotaPolicy,
    now: DateTime<Utc>,
) -> bool {
    if policy.breach_grace_hours <= 0.0 {
        return true;
    }
    let Some(state) = state else {
        return false;
    };
    if state.consecutive_breach_observations == 0 {
        return false;
    }
    match state.first_breach_at {
        Some(first) => hours_between(first, now) >= policy.breach_grace_hours,
        None => false,
    }
}

pub(crate) fn hours_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_seconds() as f64 / 3600.0
}
