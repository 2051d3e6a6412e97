//! Shared type definitions for Brokkr
//!
//! Wire-facing types (remote transport, plugin source manifests) serialize
//! camelCase; on-disk manifests are YAML. The on-disk manifests are the
//! durable state; in-memory values are always re-derived by reading them.

use chrono::{DateTime, Utc};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// File name of the manifest written at a distribution root
pub const DISTRIBUTION_MANIFEST_FILE: &str = "distribution.yaml";

/// File name of the manifest identifying a managed instance
pub const DBMS_MANIFEST_FILE: &str = "dbms.yaml";

/// Server edition of a distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Edition {
    Community,
    #[default]
    Enterprise,
}

impl fmt::Display for Edition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edition::Community => write!(f, "community"),
            Edition::Enterprise => write!(f, "enterprise"),
        }
    }
}

impl FromStr for Edition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "community" => Ok(Edition::Community),
            "enterprise" => Ok(Edition::Enterprise),
            other => Err(Error::invalid_argument(format!(
                "Unknown edition: {other}"
            ))),
        }
    }
}

/// Where a resolvable distribution came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionOrigin {
    /// Present in the shared local distribution cache
    Cached,
    /// Advertised by a remote control plane
    Online,
    /// Supplied by the caller as a filesystem path
    UserProvided,
}

/// Derived process/remote state of an instance; never stored, always
/// recomputed on query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DbmsStatus {
    Running,
    Stopped,
    #[default]
    Unknown,
}

impl fmt::Display for DbmsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbmsStatus::Running => write!(f, "running"),
            DbmsStatus::Stopped => write!(f, "stopped"),
            DbmsStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// A resolvable, installable server artifact descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbmsVersion {
    pub version: Version,
    pub edition: Edition,
    pub origin: VersionOrigin,
}

/// Public projection of a managed instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbmsInfo {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub version: Option<Version>,
    #[serde(default)]
    pub edition: Option<Edition>,
    #[serde(default)]
    pub status: DbmsStatus,
    #[serde(default)]
    pub connection_uri: Option<String>,
}

/// Manifest persisted alongside each installed distribution
/// (`distribution.yaml` at the distribution root)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionManifest {
    pub version: Version,
    pub edition: Edition,
}

impl DistributionManifest {
    /// Read the manifest from a distribution root directory
    pub fn load(dist_dir: &Path) -> Result<Self> {
        let path = dist_dir.join(DISTRIBUTION_MANIFEST_FILE);
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_yaml_ng::from_str(&content)?)
    }

    /// Write the manifest into a distribution root directory
    pub fn save(&self, dist_dir: &Path) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)?;
        std::fs::write(dist_dir.join(DISTRIBUTION_MANIFEST_FILE), content)?;
        Ok(())
    }
}

/// Manifest identifying one managed instance (`dbms.yaml` inside the
/// instance directory). Written last during install so a half-installed
/// directory is never listed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbmsManifest {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl DbmsManifest {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            tags: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Read the manifest from an instance directory
    pub fn load(dbms_dir: &Path) -> Result<Self> {
        let path = dbms_dir.join(DBMS_MANIFEST_FILE);
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_yaml_ng::from_str(&content)?)
    }

    /// Write the manifest into an instance directory
    pub fn save(&self, dbms_dir: &Path) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)?;
        std::fs::write(dbms_dir.join(DBMS_MANIFEST_FILE), content)?;
        Ok(())
    }
}

/// A named external registry of downloadable plugin versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSource {
    /// Unique, case-sensitive key across official and user-added sources
    pub name: String,
    pub homepage_url: String,
    pub versions_url: String,
    /// Seeded sources only; any caller-supplied value is discarded on write
    #[serde(default)]
    pub is_official: bool,
}

/// A plugin artifact version such as `4.0.0.17`.
///
/// Plugin versions carry four numeric segments and are not semver; ordering
/// is segment-wise numeric.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PluginVersion(Vec<u64>);

impl FromStr for PluginVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let segments = s
            .split('.')
            .map(|seg| {
                seg.parse::<u64>().map_err(|_| {
                    Error::invalid_argument(format!("Invalid plugin version: {s}"))
                })
            })
            .collect::<Result<Vec<u64>>>()?;
        if segments.is_empty() {
            return Err(Error::invalid_argument(format!(
                "Invalid plugin version: {s}"
            )));
        }
        Ok(Self(segments))
    }
}

impl TryFrom<String> for PluginVersion {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PluginVersion> for String {
    fn from(value: PluginVersion) -> Self {
        value.to_string()
    }
}

impl fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let segments: Vec<String> = self.0.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", segments.join("."))
    }
}

/// One entry of a plugin source's version manifest: a plugin version with
/// the server-compatibility range it declares and where to download it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginVersionSpec {
    pub version: PluginVersion,
    /// Semver range of server versions this plugin version supports
    pub server_versions: String,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
}

impl PluginVersionSpec {
    /// Whether the declared compatibility range contains `server`
    pub fn compatible_with(&self, server: &Version) -> Result<bool> {
        let req = VersionReq::parse(&self.server_versions)?;
        Ok(req.matches(server))
    }
}

/// A plugin recorded in an instance's installed-plugin manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledPlugin {
    pub name: String,
    #[serde(default)]
    pub homepage_url: Option<String>,
    pub version: PluginVersionSpec,
}

/// Computed upgrade projection for one installed plugin; never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradePreview {
    pub installed: InstalledPlugin,
    /// Absent when the plugin has no discoverable source or no newer
    /// compatible version exists
    pub upgradable: Option<PluginVersionSpec>,
}

/// Result of installing a plugin on one target instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInstallResult {
    pub dbms_id: Uuid,
    pub version: PluginVersionSpec,
}

/// Principal/credential/scheme triple exchanged for an access token
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthToken {
    pub principal: String,
    pub credentials: String,
    pub scheme: String,
}
