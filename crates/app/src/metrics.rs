use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use quota_core::MetricRecord;

use crate::error::Result;

/// Export boundary for dashboard metrics. The pipeline computes records; the
/// sink decides where they go.
pub trait MetricsSink {
    fn export(&self, records: &[MetricRecord]) -> Result<()>;
}

/// Appends one JSON object per line to a spool file. An external uploader
/// ships the spool to the dashboard and truncates it.
pub struct JsonlMetricsSink {
    path: PathBuf,
}

impl JsonlMetricsSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl MetricsSink for JsonlMetricsSink {
    fn export(&self, records: &[MetricRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = BufWriter::new(file);
        for record in records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use quota_core::{MetricScope, Partition};

    fn record(name: &str, value: f64) -> MetricRecord {
        MetricRecord {
            name: name.to_string(),
            value,
            date: NaiveDate::from_ymd_opt(2026, 3, 4).expect("date"),
            partition: Some(Partition::Core),
            scope: MetricScope::All,
        }
    }

    #[test]
    fn spool_appends_one_line_per_record() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("metrics.jsonl");
        let sink = JsonlMetricsSink::new(path.clone());

        sink.export(&[record("gpu_hours_total", 12.5)]).expect("export");
        sink.export(&[record("job_count", 3.0)]).expect("export");

        let contents = std::fs::read_to_string(&path).expect("read spool");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: MetricRecord = serde_json::from_str(lines[0]).expect("json line");
        assert_eq!(first, record("gpu_hours_total", 12.5));
    }
}
