use crate::model::{
    Notification, NotificationKind, NotificationState, QuotaPolicy, QuotaStatus, QuotaVerdict,
};
use crate::quota::hours_between;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct NotifyDecision {
    /// Updated state to persist, or None when nothing changed.
    pub state: Option<NotificationState>,
    pub notification: Option<Notification>,
}

/// One state-machine step for a single (account, partition, window) key.
/// The caller persists `state` before attempting delivery.
pub fn decide(
    prev: Option<&NotificationState>,
    verdict: &QuotaVerdict,
    policy: &QuotaPolicy,
    now: DateTime<Utc>,
) -> NotifyDecision {
    let effective = effective_status(verdict);
    let stored = prev.map(|state| state.last_status).unwrap_or(QuotaStatus::Ok);

    let (breach_count, first_breach_at) = if verdict.status == QuotaStatus::Breach {
        match prev {
            Some(state) if state.consecutive_breach_observations > 0 => (
                state.consecutive_breach_observations.saturating_add(1),
                state.first_breach_at.or(Some(now)),
            ),
            _ => (1, Some(now)),
        }
    } else {
        (0, None)
    };

    let mut next = NotificationState {
        account: verdict.account.clone(),
        partition: verdict.partition,
        window_label: verdict.window_label.clone(),
        last_status: stored,
        last_notified_at: prev.and_then(|state| state.last_notified_at),
        consecutive_breach_observations: breach_count,
        first_breach_at,
        updated_at: now,
    };

    let fire = if effective > stored {
        Some(NotificationKind::Escalation)
    } else if effective == stored && effective != QuotaStatus::Ok {
        match next.last_notified_at {
            Some(last) if hours_between(last, now) < policy.notify_cooldown_hours => None,
            _ => Some(NotificationKind::Reminder),
        }
    } else if effective == QuotaStatus::Ok && stored != QuotaStatus::Ok {
        Some(NotificationKind::Resolved)
    } else {
        // Improvement short of OK keeps the stored status (hysteresis).
        None
    };

    if let Some(kind) = fire {
        next.last_status = effective;
        next.last_notified_at = Some(now);
        if effective == QuotaStatus::Ok {
            next.consecutive_breach_observations = 0;
            next.first_breach_at = None;
        }
        let notification = Notification {
            account: verdict.account.clone(),
            partition: verdict.partition,
            window_label: verdict.window_label.clone(),
            severity: effective,
            kind,
            gpu_hours_used: verdict.gpu_hours_used,
            quota_gpu_hours: verdict.quota_gpu_hours,
            usage_fraction: verdict.usage_fraction,
            issued_at: now,
        };
        return NotifyDecision {
            state: Some(next),
            notification: Some(notification),
        };
    }

    let bookkeeping_changed = match prev {
        Some(state) => {
            state.consecutive_breach_observations != next.consecutive_breach_observations
                || state.first_breach_at != next.first_breach_at
        }
        None => false,
    };
    NotifyDecision {
        state: bookkeeping_changed.then_some(next),
        notification: None,
    }
}

fn effective_status(verdict: &QuotaVerdict) -> QuotaStatus {
    if verdict.status == QuotaStatus::Breach && !verdict.actionable {
        QuotaStatus::Warn
    } else {
        verdict.status
    }
}
