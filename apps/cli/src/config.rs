use std::fs;
use std::path::PathBuf;

use quota_app::AggregateSettings;
use serde::{Deserialize, Serialize};

const CONFIG_DIR_NAME: &str = "pli-quota";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default = "default_sacct_binary")]
    pub sacct_binary: String,
    /// Sendmail-style command; the recipient and subject are appended and
    /// the message body is piped to stdin. Unset means print to stdout.
    #[serde(default)]
    pub notify_command: Option<Vec<String>>,
    #[serde(default = "AggregateSettings::monitor_default")]
    pub monitor: AggregateSettings,
    #[serde(default = "AggregateSettings::report_default")]
    pub report: AggregateSettings,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            sacct_binary: default_sacct_binary(),
            notify_command: None,
            monitor: AggregateSettings::monitor_default(),
            report: AggregateSettings::report_default(),
        }
    }
}

fn default_sacct_binary() -> String {
    "sacct".to_string()
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: CliConfig,
    pub paths: ConfigPaths,
    pub created: bool,
}

pub fn load_or_create() -> Result<ConfigLoad, String> {
    let dir = config_dir()?;
    fs::create_dir_all(&dir)
        .map_err(|err| format!("create config dir {}: {}", dir.display(), err))?;
    let file = dir.join(CONFIG_FILE_NAME);
    let paths = ConfigPaths { file };

    if paths.file.exists() {
        let contents = fs::read_to_string(&paths.file)
            .map_err(|err| format!("read config {}: {}", paths.file.display(), err))?;
        let config: CliConfig = toml::from_str(&contents)
            .map_err(|err| format!("parse config {}: {}", paths.file.display(), err))?;
        return Ok(ConfigLoad {
            config,
            paths,
            created: false,
        });
    }

    let config = CliConfig::default();
    let contents =
        toml::to_string_pretty(&config).map_err(|err| format!("serialize config: {}", err))?;
    fs::write(&paths.file, contents)
        .map_err(|err| format!("write config {}: {}", paths.file.display(), err))?;

    Ok(ConfigLoad {
        config,
        paths,
        created: true,
    })
}

fn config_dir() -> Result<PathBuf, String> {
    if let Ok(dir) = std::env::var("XDG_CONFIG_HOME")
        && !dir.is_empty()
    {
        return Ok(PathBuf::from(dir).join(CONFIG_DIR_NAME));
    }
    let home = std::env::var("HOME").map_err(|err| format!("resolve HOME: {}", err))?;
    Ok(PathBuf::from(home).join(".config").join(CONFIG_DIR_NAME))
}
