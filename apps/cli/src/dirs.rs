use std::path::PathBuf;

const APP_DIR_NAME: &str = "pli-quota";
const DB_FILE_NAME: &str = "pli-quota.sqlite";

#[derive(Debug, Clone)]
pub struct DataDirResolution {
    pub dir: PathBuf,
    pub matched_existing: bool,
}

/// Where db, policy file and metrics spool live. An existing install wins;
/// otherwise the XDG data home is used.
pub fn resolve_app_data_dir() -> Result<DataDirResolution, String> {
    let base = data_home()?;
    let dir = base.join(APP_DIR_NAME);
    let matched_existing = dir.join(DB_FILE_NAME).exists();
    Ok(DataDirResolution {
        dir,
        matched_existing,
    })
}

fn data_home() -> Result<PathBuf, String> {
    if let Ok(dir) = std::env::var("XDG_DATA_HOME")
        && !dir.is_empty()
    {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").map_err(|err| format!("resolve HOME: {}", err))?;
    Ok(PathBuf::from(home).join(".local").join("share"))
}
