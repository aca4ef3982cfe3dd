use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::errors::BackupError;

pub const DEFAULT_SESSION: &str = "minecraft";

/// Fully resolved settings for one backup run.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub container: String,
    pub backup_dir: PathBuf,
    pub data_dir: PathBuf,
    pub service_user: String,
    pub connect_user: String,
    pub session: String,
    pub backup_name: String,
    pub stop_command: String,
    pub require_clean_shutdown: bool,
    pub tools: Tools,
    pub timings: Timings,
    pub warnings: Vec<Warning>,
    pub schedule: Schedule,
}

impl BackupConfig {
    /// Mirror target: `<backup_dir>/<backup_name>`.
    pub fn destination(&self) -> PathBuf {
        self.backup_dir.join(&self.backup_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tools {
    pub runtime: String,
    pub screen: String,
    pub rsync: String,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            runtime: "docker".to_string(),
            screen: "screen".to_string(),
            rsync: "rsync".to_string(),
        }
    }
}

/// Wait lengths in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    pub shutdown_wait: u64,
    pub shutdown_grace: u64,
    pub startup_grace: u64,
    pub session_timeout: u64,
    pub poll_interval: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            shutdown_wait: 35,
            shutdown_grace: 30,
            startup_grace: 30,
            session_timeout: 60,
            poll_interval: 5,
        }
    }
}

impl Timings {
    pub fn shutdown_wait(&self) -> Duration {
        Duration::from_secs(self.shutdown_wait)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_secs(self.startup_grace)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }
}

/// One in-game notice and the wait that follows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub message: String,
    pub wait_secs: u64,
}

impl Warning {
    fn new(message: &str, wait_secs: u64) -> Self {
        Self {
            message: message.to_string(),
            wait_secs,
        }
    }

    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }

    /// Console command that broadcasts the notice.
    pub fn command(&self) -> String {
        format!("say {}", self.message)
    }
}

pub fn default_warnings() -> Vec<Warning> {
    vec![
        Warning::new("Server shutting down for backup in 10 minutes.", 540),
        Warning::new("Server shutting down for backup in 1 minute.", 50),
        Warning::new("Server shutting down for backup in 10 seconds.", 10),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Schedule {
    /// Local time of day, `HH:MM`.
    pub at: String,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            at: "04:00".to_string(),
        }
    }
}

impl Schedule {
    pub fn time_of_day(&self) -> Result<NaiveTime, BackupError> {
        NaiveTime::parse_from_str(self.at.trim(), "%H:%M").map_err(|err| {
            BackupError::config(format!("schedule.at must be HH:MM, got {:?}: {err}", self.at))
        })
    }
}

/// On-disk form of the configuration. Anything may be missing here and
/// supplied by [`Overrides`] instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub container: Option<String>,
    pub backup_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub service_user: Option<String>,
    pub connect_user: Option<String>,
    pub session: Option<String>,
    pub backup_name: Option<String>,
    pub stop_command: Option<String>,
    pub require_clean_shutdown: Option<bool>,
    #[serde(default)]
    pub tools: Tools,
    #[serde(default)]
    pub timings: Timings,
    pub warnings: Option<Vec<Warning>>,
    #[serde(default)]
    pub schedule: Schedule,
}

/// Values taken from the command line or the environment. They win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub container: Option<String>,
    pub backup_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub service_user: Option<String>,
    pub connect_user: Option<String>,
    pub session: Option<String>,
}

pub fn parse_config(text: &str) -> Result<ConfigFile, BackupError> {
    toml::from_str(text).map_err(|err| BackupError::config(err.to_string()))
}

/// Read a config file. A missing file yields an empty [`ConfigFile`] so that
/// a run can be configured purely through overrides.
pub async fn load_config_file(path: &Path) -> Result<ConfigFile, BackupError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => parse_config(&text),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(err) => Err(BackupError::io("reading config file", err)),
    }
}

impl ConfigFile {
    pub fn resolve(self, overrides: Overrides) -> Result<BackupConfig, BackupError> {
        let container = required("container", overrides.container.or(self.container))?;
        let backup_dir = overrides
            .backup_dir
            .or(self.backup_dir)
            .ok_or_else(|| missing("backup_dir"))?;
        let data_dir = overrides
            .data_dir
            .or(self.data_dir)
            .ok_or_else(|| missing("data_dir"))?;
        let service_user = required("service_user", overrides.service_user.or(self.service_user))?;
        let connect_user = required("connect_user", overrides.connect_user.or(self.connect_user))?;
        let session = normalize(overrides.session.or(self.session))
            .unwrap_or_else(|| DEFAULT_SESSION.to_string());
        let backup_name = normalize(self.backup_name).unwrap_or_else(|| container.clone());
        let stop_command = normalize(self.stop_command).unwrap_or_else(|| "stop".to_string());

        if !is_single_component(&backup_name) {
            return Err(BackupError::config(format!(
                "backup_name must be a single path component, got {backup_name:?}"
            )));
        }
        if self.timings.poll_interval == 0 {
            return Err(BackupError::config("timings.poll_interval must be at least 1 second"));
        }
        self.schedule.time_of_day()?;

        Ok(BackupConfig {
            container,
            backup_dir,
            data_dir,
            service_user,
            connect_user,
            session,
            backup_name,
            stop_command,
            require_clean_shutdown: self.require_clean_shutdown.unwrap_or(false),
            tools: self.tools,
            timings: self.timings,
            warnings: self.warnings.unwrap_or_else(default_warnings),
            schedule: self.schedule,
        })
    }
}

/// True for a plain file name: no separators, no `.` or `..`.
fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains('/')
}

fn required(key: &'static str, value: Option<String>) -> Result<String, BackupError> {
    normalize(value).ok_or_else(|| missing(key))
}

fn missing(key: &'static str) -> BackupError {
    BackupError::config(format!(
        "{key} is required (set it in the config file or pass it on the command line)"
    ))
}

fn normalize(value: Option<String>) -> Option<String> {
    value.and_then(|val| {
        let trimmed = val.trim().to_string();
        if trimmed.is_empty() { None } else { Some(trimmed) }
    })
}
