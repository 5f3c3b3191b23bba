pub mod app;
pub mod config;
pub mod error;
pub mod metrics;
pub mod notifier;
pub mod policy;
pub mod sacct;
pub mod services;
pub mod startup;
pub mod util;

pub use app::{AppConfig, AppState};
pub use config::{AggregateSettings, PartitionConfig};
pub use error::{AppError, Result};
pub use metrics::{JsonlMetricsSink, MetricsSink};
pub use notifier::{CommandNotifier, Dispatch, Notifier, StdoutNotifier, render_dispatch};
pub use policy::{
    apply_policy_defaults, load_initial_policy, load_policy_defaults, load_policy_set,
    write_policy_defaults,
};
pub use sacct::{AccountingQuery, AccountingSource, CachedDirSource, SacctClient, fetch_snapshot};
pub use services::{AppServices, MonitorRunStats};
pub use startup::{AppPaths, ensure_app_data_dir};
pub use util::time::{QUOTA_WINDOW_LABEL, quota_period_window};
