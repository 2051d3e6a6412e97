//! Account configuration
//!
//! One account is created at process start from a persisted `account.yaml`
//! and is immutable for the process lifetime. The account type selects the
//! backend (local filesystem/process vs. remote control plane).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::Result;
use crate::get_home_dir;

/// Which backend an account dispatches to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Local,
    Remote,
}

/// Filesystem layout overrides for a local account
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountPaths {
    /// Root directory holding one `dbms-{id}` directory per instance
    #[serde(default)]
    pub dbms_root: Option<PathBuf>,

    /// Shared distribution cache, keyed by (version, edition, platform)
    #[serde(default)]
    pub cache_root: Option<PathBuf>,

    /// User-added plugin sources file
    #[serde(default)]
    pub plugin_sources_file: Option<PathBuf>,
}

/// Remote control plane connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    /// Transport endpoint of the remote control plane
    pub endpoint: Url,

    /// Environment name or id passed as an operand on every request
    pub environment_id: String,

    /// Externally reachable host; connection URIs returned by the remote
    /// service are rewritten to this host
    #[serde(default)]
    pub external_host: Option<Url>,

    /// Bearer token attached to every request
    #[serde(default)]
    pub api_token: Option<String>,
}

/// Persisted account configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountConfig {
    pub id: String,

    #[serde(rename = "type")]
    pub account_type: AccountType,

    pub user: String,

    #[serde(default)]
    pub paths: AccountPaths,

    #[serde(default)]
    pub remote: Option<RemoteConfig>,
}

impl AccountConfig {
    /// Create a local account configuration with default paths
    pub fn local(id: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            account_type: AccountType::Local,
            user: user.into(),
            paths: AccountPaths::default(),
            remote: None,
        }
    }

    /// Create a remote account configuration
    pub fn remote(id: impl Into<String>, user: impl Into<String>, remote: RemoteConfig) -> Self {
        Self {
            id: id.into(),
            account_type: AccountType::Remote,
            user: user.into(),
            paths: AccountPaths::default(),
            remote: Some(remote),
        }
    }

    /// Load an account configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml_ng::from_str(&content)?)
    }

    /// Write the account configuration to a YAML file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml_ng::to_string(self)?)?;
        Ok(())
    }

    /// Directory holding the per-instance `dbms-{id}` directories
    pub fn dbms_root(&self) -> Result<PathBuf> {
        match &self.paths.dbms_root {
            Some(path) => Ok(path.clone()),
            None => Ok(get_home_dir()?.join(".brokkr").join("dbmss")),
        }
    }

    /// Shared distribution cache directory
    pub fn cache_root(&self) -> Result<PathBuf> {
        match &self.paths.cache_root {
            Some(path) => Ok(path.clone()),
            None => Ok(get_home_dir()?
                .join(".brokkr")
                .join("cache")
                .join("distributions")),
        }
    }

    /// File persisting user-added plugin sources
    pub fn plugin_sources_file(&self) -> Result<PathBuf> {
        match &self.paths.plugin_sources_file {
            Some(path) => Ok(path.clone()),
            None => Ok(get_home_dir()?.join(".brokkr").join("plugin-sources.yaml")),
        }
    }
}
