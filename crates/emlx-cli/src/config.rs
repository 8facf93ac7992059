//! Configuration for the `emlx` binary
//!
//! Precedence, lowest first: built-in defaults, the TOML file
//! (`~/.config/emlx/config.toml` or `--config`), then `EMLX_*` environment
//! variables. `.env` is loaded into the environment by `main` before this runs.

use crate::eml::EmlSettings;
use crate::error::{ImportError, Result};
use crate::ledger::Ledger;
use crate::member_node::client::DEFAULT_TIMEOUT_SECS;
use crate::member_node::{AccessSettings, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default coordinating node
pub const DEFAULT_CN_URL: &str = "https://cn.dataone.org/cn";

/// File inside the config directory holding the member node token
pub const TOKEN_FILE: &str = ".d1_token";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// ORCID of the rights holder stamped on every object
    pub rightsholder_orcid: String,
    /// Member node identifier, e.g. `urn:node:SI`
    pub node_id: String,
    /// Member node base URL, e.g. `https://mn.example.org/mn`
    pub mn_url: String,
    pub cn_url: String,

    /// JSON array of source records
    pub metadata_json: PathBuf,
    /// Where downloaded files and generated documents live
    pub data_root: PathBuf,
    /// Where the ledger lives
    pub work_dir: PathBuf,

    pub timeout_secs: u64,
    pub retry: RetryPolicy,

    /// Alternative crosswalk rules (TOML `[[rule]]` tables)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crosswalk: Option<PathBuf>,

    #[serde(flatten)]
    pub access: AccessSettings,

    #[serde(flatten)]
    pub eml: EmlSettings,

    /// Directory the file was read from; token lookup happens here
    #[serde(skip)]
    pub config_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rightsholder_orcid: String::new(),
            node_id: String::new(),
            mn_url: String::new(),
            cn_url: DEFAULT_CN_URL.to_string(),
            metadata_json: PathBuf::from("records.json"),
            data_root: PathBuf::from("data"),
            work_dir: PathBuf::from("work"),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry: RetryPolicy::default(),
            crosswalk: None,
            access: AccessSettings::default(),
            eml: EmlSettings::default(),
            config_dir: default_config_dir(),
        }
    }
}

/// `~/.config/emlx` on Linux, the platform equivalent elsewhere
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("emlx"))
}

/// `<config dir>/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|dir| dir.join("config.toml"))
}

impl Config {
    /// Load from `path` (must exist) or the default location (may be absent),
    /// then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    debug!("No configuration file, using defaults");
                    Self::default()
                },
            },
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ImportError::config(format!("cannot read '{}': {e}", path.display())))?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| ImportError::config(format!("cannot parse '{}': {e}", path.display())))?;
        config.config_dir = path.parent().map(Path::to_path_buf);
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `EMLX_*` overrides read through `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let text = |key: &str, target: &mut String| {
            if let Some(value) = lookup(key) {
                *target = value;
            }
        };
        text("EMLX_RIGHTSHOLDER_ORCID", &mut self.rightsholder_orcid);
        text("EMLX_NODE_ID", &mut self.node_id);
        text("EMLX_MN_URL", &mut self.mn_url);
        text("EMLX_CN_URL", &mut self.cn_url);

        let path = |key: &str, target: &mut PathBuf| {
            if let Some(value) = lookup(key) {
                *target = PathBuf::from(value);
            }
        };
        path("EMLX_METADATA_JSON", &mut self.metadata_json);
        path("EMLX_DATA_ROOT", &mut self.data_root);
        path("EMLX_WORK_DIR", &mut self.work_dir);

        if let Some(value) = lookup("EMLX_CROSSWALK") {
            self.crosswalk = Some(PathBuf::from(value));
        }
        if let Some(secs) = lookup("EMLX_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.timeout_secs = secs;
        }
        if let Some(attempts) = lookup("EMLX_RETRY_MAX_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.retry.max_attempts = attempts;
        }
        if let Some(groups) = lookup("EMLX_WRITE_GROUPS") {
            self.access.write_groups = split_list(&groups);
        }
        if let Some(groups) = lookup("EMLX_CHANGE_PERMISSION_GROUPS") {
            self.access.change_permission_groups = split_list(&groups);
        }
    }

    /// Member node token from `EMLX_TOKEN` or the first line of `.d1_token`
    pub fn token(&self) -> Option<String> {
        if let Some(token) = std::env::var("EMLX_TOKEN").ok().filter(|t| !t.trim().is_empty()) {
            return Some(token.trim().to_string());
        }
        let path = self.config_dir.as_ref()?.join(TOKEN_FILE);
        let content = std::fs::read_to_string(path).ok()?;
        content
            .lines()
            .next()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn ledger_path(&self) -> PathBuf {
        Ledger::path_for(&self.work_dir, &self.node_id)
    }

    /// Check the settings every member node command needs
    pub fn validate_for_upload(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("rightsholder_orcid", self.rightsholder_orcid.as_str()),
            ("node_id", self.node_id.as_str()),
            ("mn_url", self.mn_url.as_str()),
            ("cn_url", self.cn_url.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(key, _)| key)
        .collect();
        if !missing.is_empty() {
            return Err(ImportError::config(format!("missing {}", missing.join(", "))));
        }
        if self.retry.max_attempts == 0 {
            return Err(ImportError::config("retry.max_attempts must be at least 1"));
        }
        Ok(())
    }

    /// The configuration as TOML, for `emlx config show`
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ImportError::config(e.to_string()))
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
