use std::path::PathBuf;

use quota_db::Db;

use crate::error::Result;

#[derive(Clone, Debug)]
pub struct AppPaths {
    pub app_data_dir: PathBuf,
    pub db_path: PathBuf,
    pub policy_defaults_path: PathBuf,
    pub metrics_spool_path: PathBuf,
}

impl AppPaths {
    pub fn new(app_data_dir: PathBuf) -> Self {
        let db_path = app_data_dir.join("pli-quota.sqlite");
        let policy_defaults_path = app_data_dir.join("pli-quota-policy.json");
        let metrics_spool_path = app_data_dir.join("pli-quota-metrics.jsonl");
        Self {
            app_data_dir,
            db_path,
            policy_defaults_path,
            metrics_spool_path,
        }
    }
}

pub fn ensure_app_data_dir(paths: &AppPaths) -> Result<()> {
    std::fs::create_dir_all(&paths.app_data_dir)?;
    Ok(())
}

pub fn setup_db(path: &std::path::Path) -> Result<()> {
    let mut db = Db::open(path)?;
    db.migrate()?;
    Ok(())
}
