use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WatchError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Device name used in published names, e.g. `sda1`.
    pub device: String,
    pub mount_point: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessConfig {
    pub work_dir: PathBuf,
    pub command: String,
    #[serde(default)]
    pub pid_file_suffix: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub trigger_interval_ms: u64,
    pub mounts: Vec<MountConfig>,
    pub interfaces: Vec<String>,
    pub process: Option<ProcessConfig>,
    pub proc_root: PathBuf,
    pub sys_root: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            trigger_interval_ms: 1000,
            mounts: Vec::new(),
            interfaces: Vec::new(),
            process: None,
            proc_root: PathBuf::from("/proc"),
            sys_root: PathBuf::from("/sys"),
        }
    }
}

impl AgentConfig {
    pub fn trigger_interval(&self) -> Duration {
        Duration::from_millis(self.trigger_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.trigger_interval_ms == 0 {
            return Err(WatchError::Configuration(
                "trigger interval must be greater than zero".into(),
            ));
        }
        if let Some(process) = &self.process {
            if process.work_dir.as_os_str().is_empty() || process.command.trim().is_empty() {
                return Err(WatchError::Configuration(
                    "supervised process needs both a work directory and a command".into(),
                ));
            }
        }
        Ok(())
    }
}
