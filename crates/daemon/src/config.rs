// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration.
//!
//! Resolution order: built-in defaults, then `<state_dir>/config.toml`,
//! then the settings table at startup. Structural values (paths, the port
//! range) are fixed for the daemon's lifetime; the rest may be changed at
//! runtime through the settings table and picked up on the next restart.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use tq_engine::EngineConfig;
use tq_storage::Store;

/// Fully resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/tq)
    pub state_dir: PathBuf,
    /// Directory holding the database file
    pub data_dir: PathBuf,
    /// Default parent directory for project checkouts
    pub projects_dir: PathBuf,
    /// Path to the SQLite database
    pub db_path: PathBuf,
    /// Directory of out-of-process event hook scripts
    pub hooks_dir: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to the daemon log file
    pub log_path: PathBuf,
    pub port_range_min: u16,
    pub port_range_max: u16,
    pub exec_interval: Duration,
    pub scheduler_interval: Duration,
    pub log_retention_days: u32,
    pub log_keep_per_task: u32,
}

/// Optional overrides from `<state_dir>/config.toml`.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    projects_dir: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    hooks_dir: Option<PathBuf>,
    port_range_min: Option<u16>,
    port_range_max: Option<u16>,
    exec_interval_ms: Option<u64>,
    scheduler_interval_ms: Option<u64>,
    log_retention_days: Option<u32>,
    log_keep_per_task: Option<u32>,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine state directory")]
    NoStateDir,
    #[error("invalid config file {0}: {1}")]
    InvalidFile(PathBuf, String),
    #[error("invalid port range {0}..={1}")]
    InvalidPortRange(u16, u16),
}

impl Config {
    /// Load configuration from the environment and the optional config
    /// file. The settings table is overlaid later, once the store is open.
    pub fn load() -> Result<Self, ConfigError> {
        let state_dir = state_dir()?;

        let file_path = state_dir.join("config.toml");
        let file: ConfigFile = match std::fs::read_to_string(&file_path) {
            Ok(content) => toml::from_str(&content)
                .map_err(|e| ConfigError::InvalidFile(file_path.clone(), e.to_string()))?,
            Err(_) => ConfigFile::default(),
        };

        let data_dir = file.data_dir.unwrap_or_else(|| state_dir.join("task"));
        let projects_dir = file.projects_dir.unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("projects")
        });

        let config = Self {
            db_path: data_dir.join("tasks.db"),
            data_dir,
            projects_dir,
            hooks_dir: file.hooks_dir.unwrap_or_else(|| state_dir.join("hooks")),
            lock_path: state_dir.join("daemon.pid"),
            log_path: state_dir.join("daemon.log"),
            port_range_min: file.port_range_min.unwrap_or(3100),
            port_range_max: file.port_range_max.unwrap_or(3199),
            exec_interval: Duration::from_millis(file.exec_interval_ms.unwrap_or(2_000)),
            scheduler_interval: Duration::from_millis(
                file.scheduler_interval_ms.unwrap_or(30_000),
            ),
            log_retention_days: file.log_retention_days.unwrap_or(14),
            log_keep_per_task: file.log_keep_per_task.unwrap_or(500),
            state_dir,
        };
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from the settings table. Called once at startup
    /// after the store opens.
    pub async fn overlay_settings(&mut self, store: &Store) -> Result<(), tq_storage::StoreError> {
        self.port_range_min = store.setting_or("port_range_min", self.port_range_min).await?;
        self.port_range_max = store.setting_or("port_range_max", self.port_range_max).await?;
        if let Some(dir) = store.get_setting("projects_dir").await? {
            self.projects_dir = PathBuf::from(dir);
        }
        if let Some(dir) = store.get_setting("hooks_dir").await? {
            self.hooks_dir = PathBuf::from(dir);
        }
        let exec_ms: u64 = store
            .setting_or("exec_interval_ms", self.exec_interval.as_millis() as u64)
            .await?;
        self.exec_interval = Duration::from_millis(exec_ms);
        let sched_ms: u64 = store
            .setting_or(
                "scheduler_interval_ms",
                self.scheduler_interval.as_millis() as u64,
            )
            .await?;
        self.scheduler_interval = Duration::from_millis(sched_ms);
        self.log_retention_days = store
            .setting_or("log_retention_days", self.log_retention_days)
            .await?;
        self.log_keep_per_task = store
            .setting_or("log_keep_per_task", self.log_keep_per_task)
            .await?;
        Ok(())
    }

    /// Engine view of this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            port_min: self.port_range_min,
            port_max: self.port_range_max,
            exec_interval: self.exec_interval,
            scheduler_interval: self.scheduler_interval,
            ..EngineConfig::default()
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.port_range_min == 0 || self.port_range_min > self.port_range_max {
            return Err(ConfigError::InvalidPortRange(
                self.port_range_min,
                self.port_range_max,
            ));
        }
        Ok(())
    }
}

/// Resolve state directory: TQ_STATE_DIR > XDG_STATE_HOME/tq > ~/.local/state/tq
fn state_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("TQ_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("tq"));
    }
    let home = dirs::home_dir().ok_or(ConfigError::NoStateDir)?;
    Ok(home.join(".local/state/tq"))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
