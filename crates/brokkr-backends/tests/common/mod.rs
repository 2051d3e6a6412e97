//! Shared fixtures for backend integration tests

#![allow(dead_code)]

use semver::Version;
use std::path::{Path, PathBuf};

use brokkr_core::config::AccountConfig;
use brokkr_core::types::Edition;
use brokkr_distributions::cache::CacheKey;

/// Control script driving a disposable background process so start, stop
/// and status are exercised against a real pid
const CONTROL_SCRIPT: &str = r#"#!/bin/sh
case "$1" in
  start)
    mkdir -p run
    sleep 60 >/dev/null 2>&1 &
    echo $! > run/server.pid
    echo "Directories in use:"
    ;;
  stop)
    if [ -f run/server.pid ]; then
      kill "$(cat run/server.pid)" >/dev/null 2>&1 || true
      rm -f run/server.pid
    fi
    ;;
esac
"#;

/// A local account confined to one temporary root
pub fn account_config(root: &Path) -> AccountConfig {
    let mut config = AccountConfig::local("test", "tester");
    config.paths.dbms_root = Some(root.join("dbmss"));
    config.paths.cache_root = Some(root.join("cache"));
    config.paths.plugin_sources_file = Some(root.join("plugin-sources.yaml"));
    config
}

/// Write a minimal runnable distribution into `dir`
pub fn write_distribution(dir: &Path, version: &str, edition: &str) {
    std::fs::create_dir_all(dir.join("bin")).unwrap();
    std::fs::create_dir_all(dir.join("conf")).unwrap();
    std::fs::write(
        dir.join("distribution.yaml"),
        format!("version: {version}\nedition: {edition}\n"),
    )
    .unwrap();

    let script = dir.join("bin").join("server");
    std::fs::write(&script, CONTROL_SCRIPT).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
}

/// Seed the distribution cache with an extracted artifact and return its
/// directory
pub fn seed_cache(cache_root: &Path, version: &str, edition: Edition) -> PathBuf {
    let key = CacheKey::new(Version::parse(version).unwrap(), edition);
    let dir = cache_root.join(key.dir_name());
    write_distribution(&dir, version, &edition.to_string());
    dir
}
