//! Version-specifier resolution
//!
//! A specifier is classified, in priority order, as a semver range, a URL,
//! or an existing filesystem path; anything else is rejected as invalid
//! input. Only semver ranges at major 4 or above are supported, and only
//! against distributions already present in the cache. Fetching an unseen
//! version from the network is a deliberately unimplemented path and is
//! refused rather than silently skipped.

use semver::{Op, Version, VersionReq};
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

use brokkr_core::types::{DistributionManifest, Edition, VersionOrigin};
use brokkr_core::{Error, Result};

use crate::archive;
use crate::cache::{CacheKey, DistributionCache};

const UNCLASSIFIABLE: &str = "Provided version argument is not valid semver, url or path.";

/// Minimum supported major server version
const MIN_SUPPORTED_MAJOR: u64 = 4;

/// A classified version specifier
#[derive(Debug, Clone)]
pub enum VersionSpecifier {
    /// A semver range, with the concrete version it coerces to when the
    /// input was a plain `x[.y[.z]]`
    Semver {
        req: VersionReq,
        coerced: Option<Version>,
    },
    /// A download URL
    Url(Url),
    /// An existing filesystem path (archive or extracted distribution)
    Path(PathBuf),
}

impl VersionSpecifier {
    /// Classify a raw specifier string
    pub fn classify(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::invalid_argument("Version must be specified"));
        }

        let coerced = coerce_version(input);
        if let Some(version) = &coerced {
            // A full x.y.z resolves exactly; a trailing-segment form like
            // "4.0" matches the highest cached patch of that series.
            let req = if input.split('.').count() == 3 {
                VersionReq::parse(&format!("={version}"))
            } else {
                VersionReq::parse(&format!("~{input}"))
            }?;
            return Ok(Self::Semver { req, coerced });
        }
        if let Ok(req) = VersionReq::parse(input) {
            return Ok(Self::Semver { req, coerced: None });
        }

        if let Ok(url) = Url::parse(input) {
            if matches!(url.scheme(), "http" | "https" | "ftp") {
                return Ok(Self::Url(url));
            }
        }

        let path = Path::new(input);
        if path.exists() {
            return Ok(Self::Path(path.to_path_buf()));
        }

        Err(Error::invalid_argument(UNCLASSIFIABLE))
    }
}

/// Coerce a plain `x`, `x.y` or `x.y.z` string to a concrete version
fn coerce_version(input: &str) -> Option<Version> {
    let mut parts = input.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = match parts.next() {
        Some(p) => p.parse().ok()?,
        None => 0,
    };
    let patch = match parts.next() {
        Some(p) => p.parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(Version::new(major, minor, patch))
}

/// Whether a range can only ever match versions below the supported major.
/// Comparators are ANDed, so one comparator capped below the floor caps the
/// whole range: exact/caret/tilde/wildcard forms never leave their major,
/// and an upper bound at or under the floor excludes it.
fn below_supported_floor(req: &VersionReq) -> bool {
    req.comparators.iter().any(|c| match c.op {
        Op::Exact | Op::Caret | Op::Tilde | Op::Wildcard => c.major < MIN_SUPPORTED_MAJOR,
        Op::LessEq => c.major < MIN_SUPPORTED_MAJOR,
        Op::Less => {
            c.major < MIN_SUPPORTED_MAJOR
                || (c.major == MIN_SUPPORTED_MAJOR
                    && c.minor.unwrap_or(0) == 0
                    && c.patch.unwrap_or(0) == 0)
        }
        _ => false,
    })
}

/// A concrete, extracted, verified distribution ready to install
#[derive(Debug, Clone)]
pub struct DistributionHandle {
    pub version: Version,
    pub edition: Edition,
    pub origin: VersionOrigin,
    /// Root directory carrying the distribution manifest
    pub dist_dir: PathBuf,
}

/// Resolves version specifiers against the shared distribution cache
pub struct DistributionResolver {
    cache: DistributionCache,
}

impl DistributionResolver {
    pub fn new(cache: DistributionCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &DistributionCache {
        &self.cache
    }

    /// Resolve a specifier to an installable distribution
    pub async fn resolve(&self, specifier: &str, edition: Edition) -> Result<DistributionHandle> {
        match VersionSpecifier::classify(specifier)? {
            VersionSpecifier::Semver { req, coerced } => {
                self.resolve_semver(specifier, &req, coerced, edition).await
            }
            VersionSpecifier::Url(url) => {
                Err(Error::not_supported(format!("fetch and install {url}")))
            }
            VersionSpecifier::Path(path) => self.resolve_path(&path).await,
        }
    }

    async fn resolve_semver(
        &self,
        specifier: &str,
        req: &VersionReq,
        coerced: Option<Version>,
        edition: Edition,
    ) -> Result<DistributionHandle> {
        if below_supported_floor(req) {
            return Err(Error::not_supported(format!(
                "version not in range >={MIN_SUPPORTED_MAJOR}.x"
            )));
        }

        let best = self
            .cache
            .list()?
            .into_iter()
            .filter(|v| v.edition == edition)
            .filter(|v| v.version.major >= MIN_SUPPORTED_MAJOR)
            .filter(|v| req.matches(&v.version))
            .max_by(|a, b| a.version.cmp(&b.version));

        let Some(candidate) = best else {
            let wanted = coerced
                .map(|v| v.to_string())
                .unwrap_or_else(|| specifier.to_string());
            return Err(Error::not_supported(format!(
                "version {wanted} is not cached; fetching uncached versions is not supported"
            )));
        };

        debug!("Resolved specifier '{}' to {}", specifier, candidate.version);
        let key = CacheKey::new(candidate.version.clone(), edition);
        let dist_dir = self.cache.ensure_extracted(&key).await?;

        Ok(DistributionHandle {
            version: candidate.version,
            edition,
            origin: VersionOrigin::Cached,
            dist_dir,
        })
    }

    async fn resolve_path(&self, path: &Path) -> Result<DistributionHandle> {
        if path.is_file() && archive::is_archive(path) {
            let key = self.cache.import_archive(path).await?;
            let dist_dir = self.cache.ensure_extracted(&key).await?;
            return Ok(DistributionHandle {
                version: key.version,
                edition: key.edition,
                origin: VersionOrigin::UserProvided,
                dist_dir,
            });
        }

        if path.is_dir() {
            // An already-extracted distribution must carry a readable
            // manifest; anything else is not installable input.
            let manifest = DistributionManifest::load(path)
                .map_err(|_| Error::invalid_argument(UNCLASSIFIABLE))?;
            return Ok(DistributionHandle {
                version: manifest.version,
                edition: manifest.edition,
                origin: VersionOrigin::UserProvided,
                dist_dir: path.to_path_buf(),
            });
        }

        Err(Error::invalid_argument(UNCLASSIFIABLE))
    }
}
