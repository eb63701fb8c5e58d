use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::spec::attachment::SlotKind;
use crate::template::NoticeTemplates;

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV: &str = "PROFILE_FORM_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Timings of the simulated collaborators and notice wording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormConfig {
    pub document_upload_delay_ms: u64,
    pub avatar_upload_delay_ms: u64,
    pub save_delay_ms: u64,
    pub notices: NoticeTemplates,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            document_upload_delay_ms: 1500,
            avatar_upload_delay_ms: 1000,
            save_delay_ms: 1500,
            notices: NoticeTemplates::default(),
        }
    }
}

impl FormConfig {
    /// Blank input yields the defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// Explicit path first, then `PROFILE_FORM_CONFIG`, then defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::load(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }

    pub fn upload_delay(&self, kind: SlotKind) -> Duration {
        match kind {
            SlotKind::Avatar => Duration::from_millis(self.avatar_upload_delay_ms),
            SlotKind::Document => Duration::from_millis(self.document_upload_delay_ms),
        }
    }

    pub fn save_delay(&self) -> Duration {
        Duration::from_millis(self.save_delay_ms)
    }
}
