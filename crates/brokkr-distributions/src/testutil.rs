//! Shared fixtures for unit tests: fake distribution trees and archives.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::Path;

use brokkr_core::types::DISTRIBUTION_MANIFEST_FILE;

pub fn write_fake_distribution(dir: &Path, version: &str, edition: &str) {
    std::fs::create_dir_all(dir.join("bin")).unwrap();
    std::fs::create_dir_all(dir.join("conf")).unwrap();
    std::fs::write(
        dir.join(DISTRIBUTION_MANIFEST_FILE),
        format!("version: {version}\nedition: {edition}\n"),
    )
    .unwrap();
    std::fs::write(dir.join("bin").join("server"), "#!/bin/sh\nexit 0\n").unwrap();
}

pub fn build_archive(dist_dir: &Path, archive: &Path, top_level: &str) {
    let file = File::create(archive).unwrap();
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(top_level, dist_dir).unwrap();
    builder.into_inner().unwrap().finish().unwrap();
}
