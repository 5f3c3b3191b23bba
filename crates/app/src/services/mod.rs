mod check;
mod dashboard;
mod monitor;
mod report;

use std::sync::Arc;

use crate::app::AppConfig;
use crate::error::Result;
use quota_db::Db;

pub use check::CheckService;
pub use dashboard::DashboardService;
pub use monitor::{MonitorRunStats, MonitorService};
pub use report::ReportService;

type SharedConfig = Arc<AppConfig>;

/// Service registry for app-level operations.
#[derive(Clone)]
pub struct AppServices {
    pub monitor: MonitorService,
    pub check: CheckService,
    pub report: ReportService,
    pub dashboard: DashboardService,
}

impl AppServices {
    pub fn new(config: &AppConfig) -> Self {
        let shared = Arc::new(config.clone());
        Self {
            monitor: MonitorService::new(shared.clone()),
            check: CheckService::new(shared.clone()),
            report: ReportService::new(shared.clone()),
            dashboard: DashboardService::new(shared),
        }
    }
}

fn open_db(config: &SharedConfig) -> Result<Db> {
    Ok(Db::open(&config.db_path)?)
}
