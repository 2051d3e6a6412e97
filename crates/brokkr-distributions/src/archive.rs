//! Distribution archive handling
//!
//! Distributions travel as gzipped tarballs whose root (either the archive
//! top level or a single wrapping directory) carries a `distribution.yaml`
//! manifest. Extraction never lands in a shared location directly; callers
//! unpack into a staging directory and move the result into place.

use flate2::read::GzDecoder;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use brokkr_core::types::DISTRIBUTION_MANIFEST_FILE;
use brokkr_core::{Error, Result};

/// Whether a path looks like a distribution archive
pub fn is_archive(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name,
        None => return false,
    };
    name.ends_with(".tar.gz") || name.ends_with(".tgz")
}

/// Unpack a distribution archive into `staging` and return the directory
/// that carries the distribution manifest
pub fn extract_archive(archive: &Path, staging: &Path) -> Result<PathBuf> {
    debug!("Extracting {:?} into {:?}", archive, staging);
    std::fs::create_dir_all(staging)?;

    let file = File::open(archive)?;
    let mut tarball = tar::Archive::new(GzDecoder::new(file));
    tarball.unpack(staging)?;

    find_distribution_root(staging).ok_or_else(|| {
        Error::invalid_argument(format!(
            "Archive {} does not contain a distribution manifest",
            archive.display()
        ))
    })
}

/// Locate the directory holding `distribution.yaml`: the given directory
/// itself, or a single directory one level down
pub fn find_distribution_root(dir: &Path) -> Option<PathBuf> {
    if dir.join(DISTRIBUTION_MANIFEST_FILE).is_file() {
        return Some(dir.to_path_buf());
    }

    let entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();

    entries
        .into_iter()
        .find(|path| path.is_dir() && path.join(DISTRIBUTION_MANIFEST_FILE).is_file())
}

/// Recursively copy an extracted distribution. `fs::copy` carries
/// permission bits, so control scripts stay executable.
pub fn copy_distribution(src: &Path, dest: &Path) -> Result<()> {
    debug!("Copying distribution {:?} -> {:?}", src, dest);
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| Error::Io(std::io::Error::other(e)))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{build_archive, write_fake_distribution};

    #[test]
    fn test_is_archive() {
        assert!(is_archive(Path::new("/x/dbms-enterprise-4.0.12.tar.gz")));
        assert!(is_archive(Path::new("dist.tgz")));
        assert!(!is_archive(Path::new("dist.zip")));
        assert!(!is_archive(Path::new("/x/dir")));
    }

    #[test]
    fn test_extract_finds_wrapped_root() {
        let tmp = tempfile::tempdir().unwrap();
        let dist = tmp.path().join("dist");
        write_fake_distribution(&dist, "4.0.12", "enterprise");

        let archive = tmp.path().join("dist.tar.gz");
        build_archive(&dist, &archive, "dbms-enterprise-4.0.12");

        let staging = tmp.path().join("staging");
        let root = extract_archive(&archive, &staging).unwrap();
        assert_eq!(root, staging.join("dbms-enterprise-4.0.12"));
        assert!(root.join(DISTRIBUTION_MANIFEST_FILE).is_file());
    }

    #[test]
    fn test_extract_rejects_archive_without_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let payload = tmp.path().join("payload");
        std::fs::create_dir_all(&payload).unwrap();
        std::fs::write(payload.join("readme.txt"), "nothing here").unwrap();

        let archive = tmp.path().join("junk.tar.gz");
        build_archive(&payload, &archive, "junk");

        let err = extract_archive(&archive, &tmp.path().join("staging")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn test_copy_distribution_preserves_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        write_fake_distribution(&src, "4.0.12", "enterprise");

        let dest = tmp.path().join("dest");
        copy_distribution(&src, &dest).unwrap();

        assert!(dest.join(DISTRIBUTION_MANIFEST_FILE).is_file());
        assert!(dest.join("bin").join("server").is_file());
    }
}
