use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use quota_core::{QuotaPeriod, Window};

use crate::error::{AppError, Result};

pub const QUOTA_WINDOW_LABEL: &str = "quota-period";

/// Window the quota is evaluated over, ending at `now`.
pub fn quota_period_window(period: QuotaPeriod, now: DateTime<Utc>) -> Result<Window> {
    let start = match period {
        QuotaPeriod::RollingDays(days) => now - Duration::days(days as i64),
        QuotaPeriod::CalendarMonth => Utc
            .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
            .single()
            .ok_or_else(|| AppError::InvalidInput("invalid month start".to_string()))?,
    };
    Ok(Window::new(QUOTA_WINDOW_LABEL, start, now))
}

/// Trailing window of `days` days ending `offset_days` days before `now`.
/// `trailing_window("30d", 30, 0, now)` is the last 30 days,
/// `trailing_window("prev-30d", 30, 30, now)` the 30 before that.
pub fn trailing_window(
    label: &str,
    days: i64,
    offset_days: i64,
    now: DateTime<Utc>,
) -> Window {
    let end = now - Duration::days(offset_days);
    Window::new(label, end - Duration::days(days), end)
}

pub fn day_label(date: NaiveDate) -> String {
    format!("day-{}", date.format("%Y-%m-%d"))
}

/// Midnight-to-midnight UTC window for one calendar day.
pub fn day_window(date: NaiveDate) -> Result<Window> {
    let start = date
        .and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| AppError::InvalidInput(format!("invalid date {date}")))?;
    Ok(Window::new(day_label(date), start, start + Duration::days(1)))
}

/// Timestamp format sacct accepts for -S/-E.
pub fn sacct_time(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d-%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(value: &str) -> DateTime<Utc> {
        value.parse().expect("timestamp")
    }

    #[test]
    fn rolling_window_spans_trailing_days() {
        let now = ts("2026-03-05T12:00:00Z");
        let window = quota_period_window(QuotaPeriod::RollingDays(30), now).expect("window");
        assert_eq!(window.label, QUOTA_WINDOW_LABEL);
        assert_eq!(window.start, ts("2026-02-03T12:00:00Z"));
        assert_eq!(window.end, now);
    }

    #[test]
    fn calendar_month_window_starts_on_the_first() {
        let now = ts("2026-03-05T12:00:00Z");
        let window = quota_period_window(QuotaPeriod::CalendarMonth, now).expect("window");
        assert_eq!(window.start, ts("2026-03-01T00:00:00Z"));
        assert_eq!(window.end, now);
    }

    #[test]
    fn trailing_windows_are_adjacent() {
        let now = ts("2026-03-05T12:00:00Z");
        let current = trailing_window("30d", 30, 0, now);
        let previous = trailing_window("prev-30d", 30, 30, now);
        assert_eq!(previous.end, current.start);
    }

    #[test]
    fn day_window_is_one_day() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 4).expect("date");
        let window = day_window(date).expect("window");
        assert_eq!(window.label, "day-2026-03-04");
        assert_eq!(window.start, ts("2026-03-04T00:00:00Z"));
        assert_eq!(window.end, ts("2026-03-05T00:00:00Z"));
    }

    #[test]
    fn sacct_time_format() {
        assert_eq!(sacct_time(ts("2026-03-05T09:30:00Z")), "2026-03-05-09:30:00");
    }
}
