//! Plugin version manifests and compatible-version selection
//!
//! Each plugin source publishes a version manifest at its `versionsUrl`: a
//! JSON array mapping plugin versions to the server-compatibility range
//! they declare and their download location. An absent or unreachable
//! manifest is treated as "no versions", not an error.

use semver::Version;
use tracing::warn;

use brokkr_core::types::{PluginSource, PluginVersion, PluginVersionSpec};
use brokkr_core::Result;

/// Fetch a source's version manifest; unreachable or malformed manifests
/// yield no versions
pub async fn fetch_versions(
    client: &reqwest::Client,
    source: &PluginSource,
) -> Vec<PluginVersionSpec> {
    match try_fetch_versions(client, source).await {
        Ok(versions) => versions,
        Err(e) => {
            warn!(
                "Could not fetch versions for plugin source '{}': {e}",
                source.name
            );
            Vec::new()
        }
    }
}

async fn try_fetch_versions(
    client: &reqwest::Client,
    source: &PluginSource,
) -> Result<Vec<PluginVersionSpec>> {
    let response = client
        .get(&source.versions_url)
        .send()
        .await?
        .error_for_status()?;
    Ok(response.json().await?)
}

/// The highest version whose declared compatibility range contains the
/// installed server version
pub fn select_compatible(
    versions: &[PluginVersionSpec],
    server: &Version,
) -> Option<PluginVersionSpec> {
    versions
        .iter()
        .filter(|spec| declares_support(spec, server))
        .max_by(|a, b| a.version.cmp(&b.version))
        .cloned()
}

/// The highest version compatible with `target_server` that is strictly
/// newer than `installed`
pub fn select_upgrade(
    versions: &[PluginVersionSpec],
    target_server: &Version,
    installed: &PluginVersion,
) -> Option<PluginVersionSpec> {
    versions
        .iter()
        .filter(|spec| declares_support(spec, target_server))
        .filter(|spec| spec.version > *installed)
        .max_by(|a, b| a.version.cmp(&b.version))
        .cloned()
}

fn declares_support(spec: &PluginVersionSpec, server: &Version) -> bool {
    match spec.compatible_with(server) {
        Ok(compatible) => compatible,
        Err(e) => {
            warn!(
                "Skipping plugin version {} with unparsable range '{}': {e}",
                spec.version, spec.server_versions
            );
            false
        }
    }
}
