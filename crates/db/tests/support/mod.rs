#![allow(dead_code)]

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use quota_core::{NotificationState, Partition, QuotaStatus};
use quota_db::Db;
use tempfile::TempDir;

pub struct TestDb {
    pub _dir: TempDir,
    pub db: Db,
    pub path: PathBuf,
}

pub fn setup_db() -> TestDb {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("test.sqlite");
    let mut db = Db::open(&path).expect("open db");
    db.migrate().expect("migrate db");
    TestDb {
        _dir: dir,
        db,
        path,
    }
}

pub fn ts(value: &str) -> DateTime<Utc> {
    value.parse().expect("timestamp")
}

pub fn make_state(account: &str, status: QuotaStatus, updated_at: &str) -> NotificationState {
    NotificationState {
        account: account.to_string(),
        partition: Partition::Core,
        window_label: "quota-period".to_string(),
        last_status: status,
        last_notified_at: Some(ts(updated_at)),
        consecutive_breach_observations: if status == QuotaStatus::Breach { 1 } else { 0 },
        first_breach_at: (status == QuotaStatus::Breach).then(|| ts(updated_at)),
        updated_at: ts(updated_at),
    }
}
