use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use quota_app::{
    AppConfig, AppState, Dispatch, Notifier, Result, write_policy_defaults,
};
use quota_app::sacct::{AccountingQuery, AccountingSource};
use quota_core::{NotificationKind, Partition, PolicySet, QuotaPeriod, QuotaPolicy, QuotaStatus};
use quota_db::Db;

/// Serves a generated sacct payload: one completed job per configured
/// account, sized to the requested GPU-hours.
struct FixtureSource {
    usage_gpu_hours: Mutex<BTreeMap<String, f64>>,
    now: DateTime<Utc>,
}

impl FixtureSource {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            usage_gpu_hours: Mutex::new(BTreeMap::new()),
            now,
        }
    }

    fn set_usage(&self, account: &str, gpu_hours: f64) {
        self.usage_gpu_hours
            .lock()
            .expect("fixture lock")
            .insert(account.to_string(), gpu_hours);
    }
}

impl AccountingSource for FixtureSource {
    fn fetch(&self, _query: &AccountingQuery) -> Result<ingest::RawPayload> {
        let usage = self.usage_gpu_hours.lock().expect("fixture lock");
        let jobs: Vec<serde_json::Value> = usage
            .iter()
            .enumerate()
            .map(|(index, (account, &gpu_hours))| {
                let elapsed = (gpu_hours * 3600.0).round() as i64;
                let end = self.now - Duration::hours(1);
                let start = end - Duration::seconds(elapsed);
                let submit = start - Duration::minutes(5);
                serde_json::json!({
                    "job_id": 1000 + index,
                    "account": account,
                    "user": account,
                    "state": { "current": ["COMPLETED"] },
                    "time": {
                        "submission": submit.timestamp(),
                        "start": start.timestamp(),
                        "end": end.timestamp(),
                        "elapsed": elapsed,
                        "limit": { "set": true, "infinite": false, "number": 14_400 }
                    },
                    "tres": { "allocated": [
                        { "type": "gres", "name": "gpu", "count": 1 }
                    ]}
                })
            })
            .collect();
        Ok(ingest::RawPayload {
            partition: Partition::Core,
            body: serde_json::json!({ "jobs": jobs }).to_string(),
        })
    }
}

#[derive(Default)]
struct RecordingNotifier {
    dispatches: Mutex<Vec<Dispatch>>,
    fail: Mutex<bool>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<Dispatch> {
        self.dispatches.lock().expect("notifier lock").clone()
    }

    fn set_fail(&self, fail: bool) {
        *self.fail.lock().expect("notifier lock") = fail;
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, dispatch: &Dispatch) -> Result<()> {
        if *self.fail.lock().expect("notifier lock") {
            return Err(quota_app::AppError::Message("smtp down".to_string()));
        }
        self.dispatches
            .lock()
            .expect("notifier lock")
            .push(dispatch.clone());
        Ok(())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    state: AppState,
}

fn policy(quota: f64, grace_hours: f64) -> QuotaPolicy {
    QuotaPolicy {
        quota_gpu_hours: quota,
        warn_fraction: 0.8,
        breach_grace_hours: grace_hours,
        notify_cooldown_hours: 24.0,
        quota_period: QuotaPeriod::RollingDays(30),
    }
}

fn setup(policies: &PolicySet) -> Harness {
    let dir = tempfile::tempdir().expect("temp dir");
    let paths = quota_app::AppPaths::new(dir.path().to_path_buf());
    write_policy_defaults(&paths.policy_defaults_path, policies).expect("policy file");
    let state = AppState::new(AppConfig::new(&paths));
    state.setup_db().expect("setup db");
    Harness { _dir: dir, state }
}

fn ts(value: &str) -> DateTime<Utc> {
    value.parse().expect("timestamp")
}

#[test]
fn warn_fires_once_then_stays_quiet_within_cooldown() {
    let harness = setup(&PolicySet {
        default: policy(100.0, 0.0),
        accounts: BTreeMap::new(),
    });
    let now = ts("2026-03-05T12:00:00Z");
    let source = FixtureSource::new(now);
    source.set_usage("astro", 85.0);
    let notifier = RecordingNotifier::default();

    let stats = harness
        .state
        .services
        .monitor
        .run(&source, &notifier, now)
        .expect("first run");
    assert_eq!(stats.notifications_sent, 1);
    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].severity, QuotaStatus::Warn);
    assert_eq!(sent[0].recipient, "astro");

    // Same usage an hour later is still within the cooldown.
    let later = now + Duration::hours(1);
    let source = FixtureSource::new(later);
    source.set_usage("astro", 86.0);
    let stats = harness
        .state
        .services
        .monitor
        .run(&source, &notifier, later)
        .expect("second run");
    assert_eq!(stats.notifications_sent, 0);
    assert_eq!(notifier.sent().len(), 1);
}

#[test]
fn breach_escalates_past_warn_and_resolves() {
    let harness = setup(&PolicySet {
        default: policy(100.0, 0.0),
        accounts: BTreeMap::new(),
    });
    let notifier = RecordingNotifier::default();

    let t0 = ts("2026-03-05T12:00:00Z");
    let source = FixtureSource::new(t0);
    source.set_usage("astro", 85.0);
    harness
        .state
        .services
        .monitor
        .run(&source, &notifier, t0)
        .expect("warn run");

    // Zero grace makes the breach immediately actionable.
    let t1 = t0 + Duration::hours(2);
    let source = FixtureSource::new(t1);
    source.set_usage("astro", 120.0);
    let stats = harness
        .state
        .services
        .monitor
        .run(&source, &notifier, t1)
        .expect("breach run");
    assert_eq!(stats.notifications_sent, 1);

    // Usage falls out of the window; the key closes with a resolution.
    let t2 = t1 + Duration::hours(2);
    let source = FixtureSource::new(t2);
    source.set_usage("astro", 10.0);
    harness
        .state
        .services
        .monitor
        .run(&source, &notifier, t2)
        .expect("resolve run");

    let sent = notifier.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].severity, QuotaStatus::Warn);
    assert_eq!(sent[1].severity, QuotaStatus::Breach);
    assert!(sent[1].subject.contains("exceeded"));
    assert_eq!(sent[2].severity, QuotaStatus::Ok);
    assert!(sent[2].subject.contains("back under limit"));

    // Steady OK afterwards stays silent.
    let t3 = t2 + Duration::hours(2);
    let source = FixtureSource::new(t3);
    source.set_usage("astro", 10.0);
    let stats = harness
        .state
        .services
        .monitor
        .run(&source, &notifier, t3)
        .expect("quiet run");
    assert_eq!(stats.notifications_sent, 0);
}

#[test]
fn breach_inside_grace_notifies_at_warn_severity() {
    let harness = setup(&PolicySet {
        default: policy(100.0, 24.0),
        accounts: BTreeMap::new(),
    });
    let now = ts("2026-03-05T12:00:00Z");
    let source = FixtureSource::new(now);
    source.set_usage("astro", 120.0);
    let notifier = RecordingNotifier::default();

    harness
        .state
        .services
        .monitor
        .run(&source, &notifier, now)
        .expect("run");
    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].severity, QuotaStatus::Warn);
    assert!(sent[0].subject.contains("warning"));
}

#[test]
fn default_policy_fallback_is_audited() {
    let harness = setup(&PolicySet {
        default: policy(100.0, 0.0),
        accounts: BTreeMap::new(),
    });
    let now = ts("2026-03-05T12:00:00Z");
    let source = FixtureSource::new(now);
    source.set_usage("astro", 10.0);

    harness
        .state
        .services
        .monitor
        .run(&source, &RecordingNotifier::default(), now)
        .expect("run");

    let db = Db::open(&harness.state.config.db_path).expect("open db");
    let fallbacks = db.list_policy_fallbacks(10).expect("fallbacks");
    assert_eq!(fallbacks.len(), 1);
    assert_eq!(fallbacks[0].0, "astro");
}

#[test]
fn failed_delivery_is_audited_and_not_retried_within_cooldown() {
    let harness = setup(&PolicySet {
        default: policy(100.0, 0.0),
        accounts: BTreeMap::new(),
    });
    let now = ts("2026-03-05T12:00:00Z");
    let source = FixtureSource::new(now);
    source.set_usage("astro", 85.0);
    let notifier = RecordingNotifier::default();
    notifier.set_fail(true);

    let stats = harness
        .state
        .services
        .monitor
        .run(&source, &notifier, now)
        .expect("failing run");
    assert_eq!(stats.notifications_sent, 0);
    assert_eq!(stats.notifications_failed, 1);

    let db = Db::open(&harness.state.config.db_path).expect("open db");
    let audit = db.list_notifications("astro", 10).expect("audit");
    assert_eq!(audit.len(), 1);
    assert!(!audit[0].delivered);
    assert_eq!(audit[0].delivery_error.as_deref(), Some("smtp down"));
    assert_eq!(audit[0].kind, NotificationKind::Escalation.as_str());

    // State was committed before delivery, so the next run inside the
    // cooldown does not repeat the message.
    notifier.set_fail(false);
    let later = now + Duration::hours(1);
    let source = FixtureSource::new(later);
    source.set_usage("astro", 86.0);
    let stats = harness
        .state
        .services
        .monitor
        .run(&source, &notifier, later)
        .expect("retry run");
    assert_eq!(stats.notifications_sent, 0);
    assert!(notifier.sent().is_empty());
}

#[test]
fn per_account_policy_overrides_default() {
    let mut accounts = BTreeMap::new();
    accounts.insert("bigs".to_string(), policy(1_000.0, 0.0));
    let harness = setup(&PolicySet {
        default: policy(100.0, 0.0),
        accounts,
    });
    let now = ts("2026-03-05T12:00:00Z");
    let source = FixtureSource::new(now);
    source.set_usage("bigs", 500.0);
    source.set_usage("astro", 90.0);
    let notifier = RecordingNotifier::default();

    let stats = harness
        .state
        .services
        .monitor
        .run(&source, &notifier, now)
        .expect("run");
    assert_eq!(stats.notifications_sent, 1);
    let sent = notifier.sent();
    assert_eq!(sent[0].recipient, "astro");

    let db = Db::open(&harness.state.config.db_path).expect("open db");
    let fallbacks = db.list_policy_fallbacks(10).expect("fallbacks");
    assert_eq!(fallbacks.len(), 1);
    assert_eq!(fallbacks[0].0, "astro");
}
