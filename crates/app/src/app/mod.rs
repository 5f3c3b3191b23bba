use std::path::PathBuf;

use quota_db::Db;

use crate::config::{AggregateSettings, PartitionConfig};
use crate::error::{AppError, Result};
use crate::metrics::JsonlMetricsSink;
use crate::notifier::{CommandNotifier, Notifier, StdoutNotifier};
use crate::policy;
use crate::sacct::{AccountingSource, CachedDirSource, SacctClient};
use crate::services::AppServices;
use crate::startup::AppPaths;

/// Everything one invocation needs to know: where state lives, how to reach
/// the accounting system, and which thresholds apply where.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub policy_defaults_path: PathBuf,
    pub metrics_spool_path: PathBuf,
    /// When set, read cached payload files from this directory instead of
    /// calling sacct.
    pub data_dir: Option<PathBuf>,
    pub sacct_binary: String,
    /// Sendmail-style delivery command; None means print to stdout.
    pub notify_command: Option<Vec<String>>,
    pub partitions: PartitionConfig,
    pub monitor: AggregateSettings,
    pub report: AggregateSettings,
}

impl AppConfig {
    pub fn new(paths: &AppPaths) -> Self {
        Self {
            db_path: paths.db_path.clone(),
            policy_defaults_path: paths.policy_defaults_path.clone(),
            metrics_spool_path: paths.metrics_spool_path.clone(),
            data_dir: None,
            sacct_binary: "sacct".to_string(),
            notify_command: None,
            partitions: PartitionConfig::default(),
            monitor: AggregateSettings::monitor_default(),
            report: AggregateSettings::report_default(),
        }
    }
}

/// Application state shared by frontends (CLI, cron entry points).
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub services: AppServices,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let services = AppServices::new(&config);
        Self { config, services }
    }

    pub fn setup_db(&self) -> Result<()> {
        crate::startup::setup_db(&self.config.db_path)
    }

    pub fn initialize(&self) -> Result<()> {
        self.setup_db()
            .map_err(|err| AppError::Message(format!("initialize db: {}", err)))?;
        self.apply_policy_defaults()?;
        Ok(())
    }

    pub fn open_db(&self) -> Result<Db> {
        Ok(Db::open(&self.config.db_path)?)
    }

    pub fn apply_policy_defaults(&self) -> Result<()> {
        policy::apply_policy_defaults(&self.config.policy_defaults_path)
    }

    pub fn accounting_source(&self) -> Box<dyn AccountingSource> {
        match &self.config.data_dir {
            Some(dir) => Box::new(CachedDirSource::new(dir.clone())),
            None => Box::new(SacctClient::new(self.config.sacct_binary.clone())),
        }
    }

    pub fn notifier(&self, dry_run: bool) -> Box<dyn Notifier> {
        match (&self.config.notify_command, dry_run) {
            (Some(command), false) => Box::new(CommandNotifier::new(command.clone())),
            _ => Box::new(StdoutNotifier),
        }
    }

    pub fn metrics_sink(&self) -> JsonlMetricsSink {
        JsonlMetricsSink::new(self.config.metrics_spool_path.clone())
    }
}
