//! Shared distribution cache
//!
//! Resolved artifacts live under one cache root, keyed by
//! (version, edition, platform). The key maps to at most one on-disk
//! artifact: an archive `dbms-{edition}-{version}-{platform}.tar.gz`, an
//! extracted directory of the same name, or both. Concurrent installs of
//! one key serialize on a per-key async lock, so a single extraction is
//! performed and every waiter reuses its result.

use semver::Version;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use brokkr_core::types::{DbmsVersion, DistributionManifest, Edition, VersionOrigin};
use brokkr_core::{current_platform, Error, Result};

use crate::archive;

/// Identity of one cached artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub version: Version,
    pub edition: Edition,
    pub platform: String,
}

impl CacheKey {
    /// Key for the running platform
    pub fn new(version: Version, edition: Edition) -> Self {
        Self {
            version,
            edition,
            platform: current_platform().to_string(),
        }
    }

    /// Directory name of the extracted artifact
    pub fn dir_name(&self) -> String {
        format!("dbms-{}-{}-{}", self.edition, self.version, self.platform)
    }

    /// File name of the archived artifact
    pub fn archive_name(&self) -> String {
        format!("{}.tar.gz", self.dir_name())
    }

    /// Parse a cache entry name (`dbms-{edition}-{version}-{platform}`)
    pub fn parse(name: &str) -> Option<Self> {
        let rest = name.strip_prefix("dbms-")?;
        let (edition, rest) = rest.split_once('-')?;
        let (version, platform) = rest.rsplit_once('-')?;
        Some(Self {
            version: Version::parse(version).ok()?,
            edition: edition.parse().ok()?,
            platform: platform.to_string(),
        })
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

/// On-disk distribution cache with per-key extraction locks
pub struct DistributionCache {
    root: PathBuf,
    locks: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl DistributionCache {
    /// Open (and create if needed) a cache rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the extracted artifact for a key (whether or not it exists)
    pub fn dist_dir(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.dir_name())
    }

    fn archive_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.archive_name())
    }

    /// One lock per key; the map itself is only held long enough to clone
    /// the entry out.
    async fn key_lock(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(key.clone()).or_default().clone()
    }

    /// Enumerate cached versions for the running platform, newest first
    pub fn list(&self) -> Result<Vec<DbmsVersion>> {
        let mut found: Vec<CacheKey> = Vec::new();

        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let name = match file_name.to_str() {
                Some(name) => name,
                None => continue,
            };

            let key = if entry.path().is_dir() {
                CacheKey::parse(name)
            } else {
                name.strip_suffix(".tar.gz").and_then(CacheKey::parse)
            };

            if let Some(key) = key {
                if key.platform == current_platform() && !found.contains(&key) {
                    found.push(key);
                }
            }
        }

        found.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(found
            .into_iter()
            .map(|key| DbmsVersion {
                version: key.version,
                edition: key.edition,
                origin: VersionOrigin::Cached,
            })
            .collect())
    }

    /// Ensure the artifact for `key` is extracted and verified, extracting
    /// its archive if needed. At most one extraction per key is in flight;
    /// concurrent callers block on it and reuse the result.
    pub async fn ensure_extracted(&self, key: &CacheKey) -> Result<PathBuf> {
        let lock = self.key_lock(key).await;
        let _guard = lock.lock().await;

        let dist_dir = self.dist_dir(key);
        if dist_dir.is_dir() {
            let manifest = DistributionManifest::load(&dist_dir)?;
            verify_manifest(&manifest, key)?;
            debug!("Reusing cached distribution {}", key);
            return Ok(dist_dir);
        }

        let archive_path = self.archive_path(key);
        if !archive_path.is_file() {
            return Err(Error::not_supported(format!(
                "version {} is not cached; fetching uncached versions is not supported",
                key.version
            )));
        }

        info!("Extracting cached archive {}", key);
        let staging = self.staging_dir();
        let extract_result = {
            let archive_path = archive_path.clone();
            let staging = staging.clone();
            tokio::task::spawn_blocking(move || archive::extract_archive(&archive_path, &staging))
                .await
                .map_err(|e| Error::Io(std::io::Error::other(e)))?
        };

        let outcome = extract_result.and_then(|extracted_root| {
            let manifest = DistributionManifest::load(&extracted_root)?;
            verify_manifest(&manifest, key)?;
            std::fs::rename(&extracted_root, &dist_dir)?;
            Ok(dist_dir.clone())
        });

        if staging.exists() {
            let _ = std::fs::remove_dir_all(&staging);
        }
        outcome
    }

    /// Import a caller-supplied archive into the cache and return its key,
    /// derived from the manifest inside the archive
    pub async fn import_archive(&self, archive_path: &Path) -> Result<CacheKey> {
        let staging = self.staging_dir();
        let extract_result = {
            let archive_path = archive_path.to_path_buf();
            let staging = staging.clone();
            tokio::task::spawn_blocking(move || archive::extract_archive(&archive_path, &staging))
                .await
                .map_err(|e| Error::Io(std::io::Error::other(e)))?
        };

        let outcome = match extract_result {
            Ok(extracted_root) => {
                let manifest = DistributionManifest::load(&extracted_root)?;
                let key = CacheKey::new(manifest.version.clone(), manifest.edition);

                let lock = self.key_lock(&key).await;
                let _guard = lock.lock().await;

                let dist_dir = self.dist_dir(&key);
                if dist_dir.is_dir() {
                    debug!("Archive {} already cached as {}", archive_path.display(), key);
                } else {
                    std::fs::rename(&extracted_root, &dist_dir)?;
                    info!("Imported {} into cache as {}", archive_path.display(), key);
                }
                Ok(key)
            }
            Err(e) => Err(e),
        };

        if staging.exists() {
            if let Err(e) = std::fs::remove_dir_all(&staging) {
                warn!("Failed to clean staging directory {:?}: {}", staging, e);
            }
        }
        outcome
    }

    fn staging_dir(&self) -> PathBuf {
        self.root.join(format!(".staging-{}", Uuid::new_v4()))
    }
}

fn verify_manifest(manifest: &DistributionManifest, key: &CacheKey) -> Result<()> {
    if manifest.version != key.version || manifest.edition != key.edition {
        return Err(Error::invalid_argument(format!(
            "Cached distribution {} reports {} {}, expected {} {}",
            key, manifest.edition, manifest.version, key.edition, key.version
        )));
    }
    Ok(())
}
