//! Client settings with an explicit load/save lifecycle

use super::{config_dir, StorageError};
use crate::game::PlayerId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not determine config directory")]
    NoConfigDirectory,
    #[error("settings i/o failed for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("settings file {path} is not valid: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl From<StorageError> for SettingsError {
    fn from(_: StorageError) -> Self {
        SettingsError::NoConfigDirectory
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub display_name: Option<String>,
    /// Id issued by the server, presented again on reconnect
    pub player_id: Option<PlayerId>,
    /// Secret issued with `player_id`; needed to reclaim it
    pub resume_token: Option<String>,
    pub last_server: Option<String>,
    pub auth_token: Option<String>,
}

impl Settings {
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        Ok(config_dir()?.join(SETTINGS_FILE))
    }

    /// Load settings; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Settings::default()),
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&data).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(io_err)
    }
}
