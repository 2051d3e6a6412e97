//! # brokkr-distributions
//!
//! Turns a version specifier into a concrete, cached, extracted server
//! distribution:
//! - Specifier classification (semver range, URL, filesystem path)
//! - The shared on-disk distribution cache keyed by (version, edition,
//!   platform), with per-key locking for concurrent installs
//! - Archive extraction and distribution-manifest verification

pub mod archive;
pub mod cache;
pub mod resolver;

#[cfg(test)]
pub(crate) mod testutil;

pub use cache::{CacheKey, DistributionCache};
pub use resolver::{DistributionHandle, DistributionResolver, VersionSpecifier};
