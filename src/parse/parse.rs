use crate::error::ConfigError;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

fn default_worker_num() -> usize { 1 }
fn default_runtime_root() -> PathBuf { PathBuf::from("runtime") }
fn default_log_dir() -> String { String::from("logs") }
fn default_log_file() -> String { String::from("daemon.log") }
fn default_log_level() -> String { String::from("info") }


#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Empty sends events to stderr instead of a rolling file.
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_log_file")]
    pub file: String,
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            dir: default_log_dir(),
            file: default_log_file(),
            level: default_log_level(),
        }
    }
}


#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    #[serde(default = "default_worker_num")]
    pub worker_num: usize,
    #[serde(default)]
    pub auto_restart: bool,
    #[serde(default)]
    pub daemonize: bool,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_runtime_root")]
    pub runtime_root: PathBuf,
    #[serde(default)]
    pub pid_file: Option<String>,
    #[serde(default)]
    pub lock_file: Option<String>,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            worker_num: default_worker_num(),
            auto_restart: false,
            daemonize: false,
            name: String::new(),
            runtime_root: default_runtime_root(),
            pid_file: None,
            lock_file: None,
            user: String::new(),
            group: String::new(),
            log: LogConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Where the master pid goes, `None` when disabled by an empty value.
    pub fn pid_file_path(&self) -> Option<PathBuf> {
        resolve_path(self.pid_file.as_deref(), &self.runtime_root, "daemon.pid")
    }

    /// Single-instance lock path, `None` when locking is disabled.
    pub fn lock_file_path(&self) -> Option<PathBuf> {
        resolve_path(self.lock_file.as_deref(), &self.runtime_root, "daemon.lock")
    }

    pub fn user(&self) -> Option<&str> {
        non_empty(&self.user)
    }

    pub fn group(&self) -> Option<&str> {
        non_empty(&self.group)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_num == 0 {
            return Err(ConfigError::Invalid("worker_num must be at least 1".into()));
        }
        Ok(())
    }
}

fn resolve_path(value: Option<&str>, root: &Path, default_name: &str) -> Option<PathBuf> {
    match value {
        None => Some(root.join(default_name)),
        Some("") => None,
        Some(path) => Some(PathBuf::from(path)),
    }
}

fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}



/*
    @@@
    @parser();
    . Reads the content of the YAML config file into a String. Any I/O error is returned with the offending path.
    . Hands the raw YAML text to serde_yaml and maps it into DaemonConfig, filling every missing key with its default.
    . Rejects configs that cannot start a pool (worker_num of zero).
*/
pub fn parser(path: impl AsRef<Path>) -> Result<DaemonConfig, ConfigError> {
    let path = path.as_ref();
    let yaml_file = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed_config: DaemonConfig = serde_yaml::from_str(&yaml_file)?;
    parsed_config.validate()?;
    Ok(parsed_config)
}
