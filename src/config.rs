// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! `dagflow.toml` configuration
//!
//! Looked up in this order: an explicit path, `./dagflow.toml`, then the
//! user config directory. Missing files mean defaults.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::errors::DagflowError;
use crate::scheduler::SchedulerConfig;

/// Configuration file name
pub const CONFIG_FILE: &str = "dagflow.toml";

/// Default state directory, relative to the working directory
pub const DEFAULT_STATE_DIR: &str = ".dagflow";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub max_workers: Option<usize>,
    pub cancel_grace_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Tracker documents and stored manifests
    pub state_dir: Option<PathBuf>,
    /// Root for local artifacts; defaults to `<state_dir>/artifacts`
    pub artifact_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DagflowConfig {
    pub scheduler: SchedulerSection,
    pub storage: StorageSection,
}

impl DagflowConfig {
    pub fn from_toml(text: &str) -> Result<Self, DagflowError> {
        toml::from_str(text).map_err(Into::into)
    }

    pub fn from_file(path: &Path) -> Result<Self, DagflowError> {
        let content = std::fs::read_to_string(path).map_err(|e| DagflowError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        debug!(path = %path.display(), "Loading configuration");
        Self::from_toml(&content)
    }

    /// Load configuration; an explicit path must exist, the others are optional
    pub fn load(explicit: Option<&Path>) -> Result<Self, DagflowError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Self::from_file(&local);
        }

        if let Some(dirs) = ProjectDirs::from("", "", "dagflow") {
            let user = dirs.config_dir().join(CONFIG_FILE);
            if user.exists() {
                return Self::from_file(&user);
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Apply command-line and environment overrides
    pub fn with_overrides(mut self, state_dir: Option<PathBuf>, max_workers: Option<usize>) -> Self {
        if state_dir.is_some() {
            self.storage.state_dir = state_dir;
        }
        if max_workers.is_some() {
            self.scheduler.max_workers = max_workers;
        }
        self
    }

    pub fn state_dir(&self) -> PathBuf {
        self.storage
            .state_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
    }

    pub fn artifact_root(&self) -> PathBuf {
        self.storage
            .artifact_root
            .clone()
            .unwrap_or_else(|| self.state_dir().join("artifacts"))
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        let mut config = SchedulerConfig::default();
        if let Some(workers) = self.scheduler.max_workers {
            config = config.with_max_workers(workers);
        }
        if let Some(ms) = self.scheduler.cancel_grace_ms {
            config = config.with_cancel_grace(Duration::from_millis(ms));
        }
        config
    }
}
