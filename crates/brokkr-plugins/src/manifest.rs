//! Per-instance installed-plugin manifest
//!
//! Lives at `plugins/installed.yaml` inside the instance directory and is
//! the durable record of what is installed; listings read it rather than
//! scanning jars. Entries keep insertion order; reinstalling a plugin
//! updates its entry in place.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use brokkr_core::types::InstalledPlugin;
use brokkr_core::Result;

/// File name of the installed-plugin manifest inside `plugins/`
pub const INSTALLED_PLUGINS_FILE: &str = "installed.yaml";

#[derive(Debug, Default, Serialize, Deserialize)]
struct ManifestFile {
    #[serde(default)]
    plugins: Vec<InstalledPlugin>,
}

/// Manifest of plugins installed into one instance
pub struct PluginManifest {
    path: PathBuf,
    plugins: Vec<InstalledPlugin>,
}

impl PluginManifest {
    /// Load the manifest from an instance's plugin directory; a missing
    /// file yields an empty manifest
    pub fn load(plugins_dir: &Path) -> Result<Self> {
        let path = plugins_dir.join(INSTALLED_PLUGINS_FILE);
        let plugins = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let file: ManifestFile = serde_yaml_ng::from_str(&content)?;
            file.plugins
        } else {
            Vec::new()
        };
        Ok(Self { path, plugins })
    }

    /// Installed plugins in insertion order
    pub fn list(&self) -> &[InstalledPlugin] {
        &self.plugins
    }

    pub fn get(&self, name: &str) -> Option<&InstalledPlugin> {
        self.plugins.iter().find(|plugin| plugin.name == name)
    }

    /// Record a plugin, replacing an existing entry of the same name in
    /// place so its position is kept
    pub fn record(&mut self, plugin: InstalledPlugin) -> Result<()> {
        match self.plugins.iter_mut().find(|p| p.name == plugin.name) {
            Some(existing) => *existing = plugin,
            None => self.plugins.push(plugin),
        }
        self.save()
    }

    /// Remove a plugin entry; removing an absent plugin is a no-op
    pub fn remove(&mut self, name: &str) -> Result<Option<InstalledPlugin>> {
        let removed = self
            .plugins
            .iter()
            .position(|plugin| plugin.name == name)
            .map(|index| self.plugins.remove(index));
        if removed.is_some() {
            self.save()?;
        }
        Ok(removed)
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = ManifestFile {
            plugins: self.plugins.clone(),
        };
        std::fs::write(&self.path, serde_yaml_ng::to_string(&file)?)?;
        debug!("Saved plugin manifest with {} entries", self.plugins.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brokkr_core::types::PluginVersionSpec;

    fn plugin(name: &str, version: &str) -> InstalledPlugin {
        InstalledPlugin {
            name: name.to_string(),
            homepage_url: None,
            version: PluginVersionSpec {
                version: version.parse().unwrap(),
                server_versions: ">=4.0.0".to_string(),
                download_url: None,
                sha256: None,
            },
        }
    }

    #[test]
    fn test_insertion_order_is_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let mut manifest = PluginManifest::load(tmp.path()).unwrap();
        manifest.record(plugin("apoc", "4.0.0.17")).unwrap();
        manifest.record(plugin("jwt-addon", "1.0.1")).unwrap();

        let reloaded = PluginManifest::load(tmp.path()).unwrap();
        let names: Vec<&str> = reloaded.list().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["apoc", "jwt-addon"]);
    }

    #[test]
    fn test_record_updates_in_place() {
        let tmp = tempfile::tempdir().unwrap();
        let mut manifest = PluginManifest::load(tmp.path()).unwrap();
        manifest.record(plugin("apoc", "4.0.0.17")).unwrap();
        manifest.record(plugin("jwt-addon", "1.0.1")).unwrap();
        manifest.record(plugin("apoc", "4.2.0.0")).unwrap();

        let names: Vec<&str> = manifest.list().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["apoc", "jwt-addon"]);
        assert_eq!(
            manifest.get("apoc").unwrap().version.version.to_string(),
            "4.2.0.0"
        );
    }

    #[test]
    fn test_remove_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let mut manifest = PluginManifest::load(tmp.path()).unwrap();
        manifest.record(plugin("apoc", "4.0.0.17")).unwrap();

        assert!(manifest.remove("apoc").unwrap().is_some());
        assert!(manifest.remove("apoc").unwrap().is_none());
        assert!(manifest.remove("never-installed").unwrap().is_none());
        assert!(manifest.list().is_empty());
    }
}
