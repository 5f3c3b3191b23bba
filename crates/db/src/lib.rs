use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use quota_core::{Notification, NotificationState, Partition, QuotaStatus};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

pub const MIGRATION_0001: &str = include_str!("../migrations/0001_init.sql");
pub const MIGRATION_0002: &str = include_str!("../migrations/0002_add_policy_fallback_audit.sql");

pub const MIGRATIONS: &[(&str, &str)] = &[
    ("0001_init", MIGRATION_0001),
    ("0002_add_policy_fallback_audit", MIGRATION_0002),
];

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("time parse error: {0}")]
    TimeParse(#[from] chrono::ParseError),
    #[error("invalid stored value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// One delivered (or attempted) notification, as recorded in the audit log.
#[derive(Debug, Clone)]
pub struct NotificationAuditRow {
    pub account: String,
    pub partition: Partition,
    pub window_label: String,
    pub severity: QuotaStatus,
    pub kind: String,
    pub issued_at: DateTime<Utc>,
    pub delivered: bool,
    pub delivery_error: Option<String>,
}

pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        conn.pragma_update(None, "cache_size", -20_000)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        // Overlapping invocations block on the writer instead of failing.
        conn.busy_timeout(std::time::Duration::from_secs(10))?;
        Ok(Self { conn })
    }

    pub fn migrate(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        for (_name, sql) in MIGRATIONS {
            tx.execute_batch(sql)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_notification_state(
        &self,
        account: &str,
        partition: Partition,
        window_label: &str,
    ) -> Result<Option<NotificationState>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT account, partition, window_label, last_status, last_notified_at,
                   consecutive_breach_observations, first_breach_at, updated_at
            FROM notification_state
            WHERE account = ?1 AND partition = ?2 AND window_label = ?3
            "#,
        )?;
        let row = stmt
            .query_row(params![account, partition.as_str(), window_label], |row| {
                collect_state_row(row)
            })
            .optional()?;
        row.map(build_state).transpose()
    }

    pub fn list_notification_states(&self, window_label: &str) -> Result<Vec<NotificationState>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT account, partition, window_label, last_status, last_notified_at,
                   consecutive_breach_observations, first_breach_at, updated_at
            FROM notification_state
            WHERE window_label = ?1
            ORDER BY account, partition
            "#,
        )?;
        let rows = stmt.query_map(params![window_label], |row| collect_state_row(row))?;
        let mut states = Vec::new();
        for row in rows {
            states.push(build_state(row?)?);
        }
        Ok(states)
    }

    pub fn put_notification_state(&mut self, state: &NotificationState) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO notification_state (
              account, partition, window_label, last_status, last_notified_at,
              consecutive_breach_observations, first_breach_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (account, partition, window_label) DO UPDATE SET
              last_status = excluded.last_status,
              last_notified_at = excluded.last_notified_at,
              consecutive_breach_observations = excluded.consecutive_breach_observations,
              first_breach_at = excluded.first_breach_at,
              updated_at = excluded.updated_at
            "#,
            params![
                state.account,
                state.partition.as_str(),
                state.window_label,
                state.last_status.as_str(),
                state.last_notified_at.map(format_ts),
                state.consecutive_breach_observations,
                state.first_breach_at.map(format_ts),
                format_ts(state.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Per-key read-modify-write under an IMMEDIATE transaction, so two
    /// overlapping invocations cannot both decide against the same stale
    /// state. The closure returns the state to persist (None = unchanged)
    /// plus an arbitrary decision value handed back to the caller.
    pub fn update_notification_state<T>(
        &mut self,
        account: &str,
        partition: Partition,
        window_label: &str,
        decide: impl FnOnce(Option<&NotificationState>) -> (Option<NotificationState>, T),
    ) -> Result<T> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let prev = {
            let mut stmt = tx.prepare(
                r#"
                SELECT account, partition, window_label, last_status, last_notified_at,
                       consecutive_breach_observations, first_breach_at, updated_at
                FROM notification_state
                WHERE account = ?1 AND partition = ?2 AND window_label = ?3
                "#,
            )?;
            let row = stmt
                .query_row(params![account, partition.as_str(), window_label], |row| {
                    collect_state_row(row)
                })
                .optional()?;
            row.map(build_state).transpose()?
        };
        let (next, outcome) = decide(prev.as_ref());
        if let Some(state) = next {
            tx.execute(
                r#"
                INSERT INTO notification_state (
                  account, partition, window_label, last_status, last_notified_at,
                  consecutive_breach_observations, first_breach_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT (account, partition, window_label) DO UPDATE SET
                  last_status = excluded.last_status,
                  last_notified_at = excluded.last_notified_at,
                  consecutive_breach_observations = excluded.consecutive_breach_observations,
                  first_breach_at = excluded.first_breach_at,
                  updated_at = excluded.updated_at
                "#,
                params![
                    state.account,
                    state.partition.as_str(),
                    state.window_label,
                    state.last_status.as_str(),
                    state.last_notified_at.map(format_ts),
                    state.consecutive_breach_observations,
                    state.first_breach_at.map(format_ts),
                    format_ts(state.updated_at),
                ],
            )?;
        }
        tx.commit()?;
        Ok(outcome)
    }

    /// Drops rows that have sat at OK since before `cutoff`; resolved keys do
    /// not accumulate forever.
    pub fn purge_clear_states(&mut self, cutoff: DateTime<Utc>) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM notification_state WHERE last_status = 'OK' AND updated_at < ?1",
            params![format_ts(cutoff)],
        )?;
        Ok(removed)
    }

    pub fn record_notification(
        &mut self,
        notification: &Notification,
        delivered: bool,
        delivery_error: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO notification_audit (
              account, partition, window_label, severity, kind, gpu_hours_used,
              quota_gpu_hours, usage_fraction, issued_at, delivered, delivery_error
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                notification.account,
                notification.partition.as_str(),
                notification.window_label,
                notification.severity.as_str(),
                notification.kind.as_str(),
                notification.gpu_hours_used,
                notification.quota_gpu_hours,
                notification.usage_fraction,
                format_ts(notification.issued_at),
                delivered,
                delivery_error,
            ],
        )?;
        Ok(())
    }

    pub fn list_notifications(
        &self,
        account: &str,
        limit: usize,
    ) -> Result<Vec<NotificationAuditRow>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT account, partition, window_label, severity, kind, issued_at,
                   delivered, delivery_error
            FROM notification_audit
            WHERE account = ?1
            ORDER BY issued_at DESC, id DESC
            LIMIT ?2
            "#,
        )?;
        let rows = stmt.query_map(params![account, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, bool>(6)?,
                row.get::<_, Option<String>>(7)?,
            ))
        })?;
        let mut audits = Vec::new();
        for row in rows {
            let (account, partition, window_label, severity, kind, issued_at, delivered, error) =
                row?;
            audits.push(NotificationAuditRow {
                account,
                partition: parse_partition(&partition)?,
                window_label,
                severity: parse_status(&severity)?,
                kind,
                issued_at: parse_ts(&issued_at)?,
                delivered,
                delivery_error: error,
            });
        }
        Ok(audits)
    }

    pub fn record_policy_fallback(
        &mut self,
        account: &str,
        observed_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO policy_fallback_audit (account, observed_at) VALUES (?1, ?2)",
            params![account, format_ts(observed_at)],
        )?;
        Ok(())
    }

    pub fn list_policy_fallbacks(&self, limit: usize) -> Result<Vec<(String, DateTime<Utc>)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT account, observed_at FROM policy_fallback_audit
            ORDER BY observed_at DESC, id DESC
            LIMIT ?1
            "#,
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut fallbacks = Vec::new();
        for row in rows {
            let (account, observed_at) = row?;
            fallbacks.push((account, parse_ts(&observed_at)?));
        }
        Ok(fallbacks)
    }
}

type StateRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    u32,
    Option<String>,
    String,
);

fn collect_state_row(row: &Row<'_>) -> rusqlite::Result<StateRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn build_state(row: StateRow) -> Result<NotificationState> {
    let (account, partition, window_label, status, notified, breaches, first_breach, updated) = row;
    Ok(NotificationState {
        account,
        partition: parse_partition(&partition)?,
        window_label,
        last_status: parse_status(&status)?,
        last_notified_at: notified.as_deref().map(parse_ts).transpose()?,
        consecutive_breach_observations: breaches,
        first_breach_at: first_breach.as_deref().map(parse_ts).transpose()?,
        updated_at: parse_ts(&updated)?,
    })
}

fn parse_partition(value: &str) -> Result<Partition> {
    Partition::parse(value)
        .ok_or_else(|| DbError::InvalidValue(format!("unknown partition {value:?}")))
}

fn parse_status(value: &str) -> Result<QuotaStatus> {
    QuotaStatus::parse(value)
        .ok_or_else(|| DbError::InvalidValue(format!("unknown status {value:?}")))
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}
