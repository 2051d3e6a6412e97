//! Local filesystem/process backend
//!
//! Instances live as `dbms-{id}` directories under the account's dbms
//! root, each holding an extracted distribution plus its `dbms.yaml`
//! manifest, mutable `conf/server.conf`, `plugins/` and `run/` state. The
//! manifests are the source of truth: listings scan directories, and a
//! directory without a readable manifest is ignored. Mutations of one
//! instance serialize on a per-id async lock.

mod server;

use async_trait::async_trait;
use semver::Version;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task;
use tracing::{debug, info, warn};
use uuid::Uuid;

use brokkr_core::config::AccountConfig;
use brokkr_core::properties::PropertiesFile;
use brokkr_core::types::{
    AuthToken, DbmsInfo, DbmsManifest, DbmsVersion, DistributionManifest, Edition, InstalledPlugin,
    PluginInstallResult, PluginSource, UpgradePreview, DBMS_MANIFEST_FILE,
};
use brokkr_core::{Error, Result};
use brokkr_distributions::archive;
use brokkr_distributions::cache::DistributionCache;
use brokkr_distributions::resolver::{DistributionHandle, DistributionResolver};
use brokkr_plugins::{versions, PluginManifest, PluginSourceRegistry};

use crate::traits::DbmsLifecycle;

const DBMS_DIR_PREFIX: &str = "dbms-";
const CONF_FILE: &str = "conf/server.conf";

const HTTP_ADDRESS_KEY: &str = "server.http.listen_address";
const BOLT_ADDRESS_KEY: &str = "server.bolt.listen_address";
const INITIAL_PASSWORD_KEY: &str = "server.security.initial_password";

const DEFAULT_HTTP_ADDRESS: &str = "127.0.0.1:7474";
const DEFAULT_BOLT_ADDRESS: &str = "127.0.0.1:7687";

const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// One discovered instance: its manifest plus the directory it was read
/// from
struct DbmsEntry {
    manifest: DbmsManifest,
    dir: PathBuf,
}

/// Backend managing instances on the local filesystem
pub struct LocalAccount {
    config: AccountConfig,
    dbms_root: PathBuf,
    resolver: DistributionResolver,
    plugin_sources: PluginSourceRegistry,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    start_timeout: Duration,
    stop_timeout: Duration,
}

impl LocalAccount {
    pub fn new(config: AccountConfig) -> Result<Self> {
        let dbms_root = config.dbms_root()?;
        std::fs::create_dir_all(&dbms_root)?;

        let cache = DistributionCache::new(config.cache_root()?)?;
        let plugin_sources = PluginSourceRegistry::new(config.plugin_sources_file()?)?;

        Ok(Self {
            config,
            dbms_root,
            resolver: DistributionResolver::new(cache),
            plugin_sources,
            locks: Mutex::new(HashMap::new()),
            start_timeout: DEFAULT_START_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        })
    }

    /// Replace the plugin source registry, for accounts pointed at a
    /// non-default discovery endpoint
    pub fn with_plugin_sources(mut self, registry: PluginSourceRegistry) -> Self {
        self.plugin_sources = registry;
        self
    }

    /// Override the bounded start/stop waits
    pub fn with_timeouts(mut self, start: Duration, stop: Duration) -> Self {
        self.start_timeout = start;
        self.stop_timeout = stop;
        self
    }

    fn dbms_dir(&self, id: Uuid) -> PathBuf {
        self.dbms_root.join(format!("{DBMS_DIR_PREFIX}{id}"))
    }

    async fn dbms_lock(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(id).or_default().clone()
    }

    /// Scan the dbms root for instance directories with readable manifests
    fn entries(&self) -> Result<Vec<DbmsEntry>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.dbms_root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(DBMS_DIR_PREFIX) {
                continue;
            }
            let dir = entry.path();
            match DbmsManifest::load(&dir) {
                Ok(manifest) => entries.push(DbmsEntry { manifest, dir }),
                Err(e) => debug!("Skipping {name}: no readable manifest ({e})"),
            }
        }
        entries.sort_by(|a, b| a.manifest.name.cmp(&b.manifest.name));
        Ok(entries)
    }

    fn find(&self, name_or_id: &str) -> Result<DbmsEntry> {
        let by_id = name_or_id.parse::<Uuid>().ok();
        self.entries()?
            .into_iter()
            .find(|entry| match by_id {
                Some(id) => entry.manifest.id == id,
                None => entry.manifest.name == name_or_id,
            })
            .ok_or_else(|| {
                Error::not_found(format!(
                    "Could not find a DBMS named or identified by \"{name_or_id}\""
                ))
            })
    }

    fn ensure_name_free(&self, name: &str) -> Result<()> {
        if self.entries()?.iter().any(|e| e.manifest.name == name) {
            return Err(Error::target_exists("dbmss", &[name.to_string()]));
        }
        Ok(())
    }

    fn build_info(&self, entry: &DbmsEntry) -> DbmsInfo {
        let status = match server::status(&entry.dir) {
            server::ServerStatus::Running { .. } => brokkr_core::types::DbmsStatus::Running,
            server::ServerStatus::Stopped => brokkr_core::types::DbmsStatus::Stopped,
        };
        let dist = DistributionManifest::load(&entry.dir).ok();
        let connection_uri = PropertiesFile::load(&entry.dir.join(CONF_FILE))
            .ok()
            .and_then(|conf| conf.get(BOLT_ADDRESS_KEY).map(str::to_string))
            .map(|address| format!("bolt://{address}"));

        DbmsInfo {
            id: entry.manifest.id,
            name: entry.manifest.name.clone(),
            description: entry.manifest.description.clone(),
            tags: entry.manifest.tags.clone(),
            version: dist.as_ref().map(|d| d.version.clone()),
            edition: dist.map(|d| d.edition),
            status,
            connection_uri,
        }
    }

    async fn install_into(
        &self,
        dir: &Path,
        handle: &DistributionHandle,
        id: Uuid,
        name: &str,
        credentials: &str,
    ) -> Result<()> {
        let src = handle.dist_dir.clone();
        let dest = dir.to_path_buf();
        task::spawn_blocking(move || archive::copy_distribution(&src, &dest))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))??;

        let manifest = DistributionManifest::load(dir)?;
        if manifest.version != handle.version || manifest.edition != handle.edition {
            return Err(Error::invalid_argument(format!(
                "Installed distribution reports {} {}, expected {} {}",
                manifest.edition, manifest.version, handle.edition, handle.version
            )));
        }

        let mut conf = PropertiesFile::load(&dir.join(CONF_FILE))?;
        if conf.get(HTTP_ADDRESS_KEY).is_none() {
            conf.set(HTTP_ADDRESS_KEY, DEFAULT_HTTP_ADDRESS);
        }
        if conf.get(BOLT_ADDRESS_KEY).is_none() {
            conf.set(BOLT_ADDRESS_KEY, DEFAULT_BOLT_ADDRESS);
        }
        conf.set(INITIAL_PASSWORD_KEY, credentials);
        conf.save()?;

        std::fs::create_dir_all(dir.join("plugins"))?;
        std::fs::create_dir_all(dir.join("run"))?;

        // Written last so a failed install never produces a listable
        // instance.
        DbmsManifest::new(id, name).save(dir)?;
        Ok(())
    }
}

#[async_trait]
impl DbmsLifecycle for LocalAccount {
    fn account(&self) -> &AccountConfig {
        &self.config
    }

    async fn install(
        &self,
        name: &str,
        credentials: &str,
        version: &str,
        edition: Option<Edition>,
    ) -> Result<Uuid> {
        if name.trim().is_empty() {
            return Err(Error::invalid_argument("DBMS name must be specified"));
        }
        self.ensure_name_free(name)?;

        let edition = edition.unwrap_or_default();
        let handle = self.resolver.resolve(version, edition).await?;

        let id = Uuid::new_v4();
        let lock = self.dbms_lock(id).await;
        let _guard = lock.lock().await;

        let dir = self.dbms_dir(id);
        match self.install_into(&dir, &handle, id, name, credentials).await {
            Ok(()) => {
                info!("Installed {} {} as '{name}' ({id})", handle.edition, handle.version);
                Ok(id)
            }
            Err(e) => {
                if let Err(cleanup) = std::fs::remove_dir_all(&dir) {
                    warn!("Could not clean up failed install at {}: {cleanup}", dir.display());
                }
                Err(e)
            }
        }
    }

    async fn uninstall(&self, name_or_id: &str) -> Result<DbmsInfo> {
        let entry = self.find(name_or_id)?;
        let lock = self.dbms_lock(entry.manifest.id).await;
        let _guard = lock.lock().await;

        if matches!(server::status(&entry.dir), server::ServerStatus::Running { .. }) {
            server::stop(&entry.dir, self.stop_timeout).await?;
        }

        let mut removed = self.build_info(&entry);
        removed.status = brokkr_core::types::DbmsStatus::Stopped;

        let link = self.dbms_dir(entry.manifest.id);
        if std::fs::symlink_metadata(&link)?.file_type().is_symlink() {
            // A linked instance: drop the link, the external directory
            // stays in place.
            std::fs::remove_file(&link)?;
        } else {
            let dir = entry.dir.clone();
            task::spawn_blocking(move || std::fs::remove_dir_all(&dir))
                .await
                .map_err(|e| Error::Io(std::io::Error::other(e)))??;
        }

        info!("Uninstalled '{}' ({})", removed.name, removed.id);
        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<DbmsInfo>> {
        Ok(self.entries()?.iter().map(|e| self.build_info(e)).collect())
    }

    async fn get(&self, name_or_id: &str) -> Result<DbmsInfo> {
        let entry = self.find(name_or_id)?;
        Ok(self.build_info(&entry))
    }

    async fn info(&self, name_or_ids: &[String]) -> Result<Vec<DbmsInfo>> {
        name_or_ids
            .iter()
            .map(|target| self.find(target).map(|entry| self.build_info(&entry)))
            .collect()
    }

    async fn status_dbmss(&self, name_or_ids: &[String]) -> Result<Vec<String>> {
        name_or_ids
            .iter()
            .map(|target| {
                let entry = self.find(target)?;
                Ok(server::status_line(server::status(&entry.dir)))
            })
            .collect()
    }

    async fn start(&self, name_or_ids: &[String]) -> Result<Vec<String>> {
        let mut lines = Vec::with_capacity(name_or_ids.len());
        for target in name_or_ids {
            let entry = self.find(target)?;
            let lock = self.dbms_lock(entry.manifest.id).await;
            let _guard = lock.lock().await;
            lines.push(server::start(&entry.dir, self.start_timeout).await?);
        }
        Ok(lines)
    }

    async fn stop(&self, name_or_ids: &[String]) -> Result<Vec<String>> {
        let mut lines = Vec::with_capacity(name_or_ids.len());
        for target in name_or_ids {
            let entry = self.find(target)?;
            let lock = self.dbms_lock(entry.manifest.id).await;
            let _guard = lock.lock().await;
            lines.push(server::stop(&entry.dir, self.stop_timeout).await?);
        }
        Ok(lines)
    }

    async fn clone_dbms(&self, name_or_id: &str, new_name: &str) -> Result<DbmsInfo> {
        let source = self.find(name_or_id)?;
        self.ensure_name_free(new_name)?;

        let source_lock = self.dbms_lock(source.manifest.id).await;
        let _source_guard = source_lock.lock().await;

        let id = Uuid::new_v4();
        let dir = self.dbms_dir(id);

        let src = source.dir.clone();
        let dest = dir.clone();
        task::spawn_blocking(move || archive::copy_distribution(&src, &dest))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))??;

        // The copy must not inherit the source's process state.
        let _ = std::fs::remove_file(dir.join(server::PID_FILE));

        let mut manifest = DbmsManifest::new(id, new_name);
        manifest.description = source.manifest.description.clone();
        manifest.tags = source.manifest.tags.clone();
        manifest.save(&dir)?;

        info!("Cloned '{}' as '{new_name}' ({id})", source.manifest.name);
        Ok(self.build_info(&DbmsEntry { manifest, dir }))
    }

    async fn link(&self, external_path: &Path, name: &str) -> Result<DbmsInfo> {
        DistributionManifest::load(external_path).map_err(|_| {
            Error::invalid_argument(format!(
                "{} does not contain a valid DBMS distribution",
                external_path.display()
            ))
        })?;
        self.ensure_name_free(name)?;

        let id = Uuid::new_v4();
        let manifest = DbmsManifest::new(id, name);
        manifest.save(external_path)?;

        let link = self.dbms_dir(id);
        #[cfg(unix)]
        std::os::unix::fs::symlink(external_path, &link)?;
        #[cfg(not(unix))]
        return Err(Error::not_supported(
            "linking a DBMS is not supported on this platform",
        ));

        info!("Linked {} as '{name}' ({id})", external_path.display());
        Ok(self.build_info(&DbmsEntry {
            manifest,
            dir: link,
        }))
    }

    async fn upgrade(&self, name_or_id: &str, version: &str) -> Result<DbmsInfo> {
        let entry = self.find(name_or_id)?;
        let lock = self.dbms_lock(entry.manifest.id).await;
        let _guard = lock.lock().await;

        if matches!(server::status(&entry.dir), server::ServerStatus::Running { .. }) {
            return Err(Error::invalid_argument(
                "Stop the DBMS before upgrading it",
            ));
        }

        let current = DistributionManifest::load(&entry.dir)?;
        let handle = self.resolver.resolve(version, current.edition).await?;
        if handle.version <= current.version {
            return Err(Error::invalid_argument(format!(
                "Upgrade version {} must be newer than the installed {}",
                handle.version, current.version
            )));
        }

        let staging = self.dbms_root.join(format!(".upgrade-{}", entry.manifest.id));
        let retired = self.dbms_root.join(format!(".retired-{}", entry.manifest.id));
        let old_dir = entry.dir.clone();
        let new_dist = handle.dist_dir.clone();
        let result = task::spawn_blocking(move || {
            swap_distribution(&old_dir, &new_dist, &staging, &retired)
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        result?;

        let upgraded = DistributionManifest::load(&entry.dir)?;
        if upgraded.version != handle.version {
            return Err(Error::invalid_argument(format!(
                "Upgraded distribution reports {}, expected {}",
                upgraded.version, handle.version
            )));
        }

        info!(
            "Upgraded '{}' from {} to {}",
            entry.manifest.name, current.version, handle.version
        );
        Ok(self.build_info(&entry))
    }

    async fn versions(&self) -> Result<Vec<DbmsVersion>> {
        self.resolver.cache().list()
    }

    async fn create_access_token(
        &self,
        app_name: &str,
        name_or_id: &str,
        auth_token: AuthToken,
    ) -> Result<String> {
        let entry = self.find(name_or_id)?;
        let conf = PropertiesFile::load(&entry.dir.join(CONF_FILE))?;
        let address = conf.get(HTTP_ADDRESS_KEY).unwrap_or(DEFAULT_HTTP_ADDRESS);

        #[derive(Deserialize)]
        struct TokenResponse {
            token: String,
        }

        let response: TokenResponse = self
            .plugin_sources
            .client()
            .post(format!("http://{address}/auth/tokens"))
            .json(&serde_json::json!({
                "appName": app_name,
                "principal": auth_token.principal,
                "credentials": auth_token.credentials,
                "scheme": auth_token.scheme,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.token)
    }

    async fn dbms_config(&self, name_or_id: &str) -> Result<PropertiesFile> {
        let entry = self.find(name_or_id)?;
        PropertiesFile::load(&entry.dir.join(CONF_FILE))
    }

    async fn update_config(
        &self,
        name_or_id: &str,
        properties: &[(String, String)],
    ) -> Result<bool> {
        let entry = self.find(name_or_id)?;
        let lock = self.dbms_lock(entry.manifest.id).await;
        let _guard = lock.lock().await;

        let mut conf = PropertiesFile::load(&entry.dir.join(CONF_FILE))?;
        let changed = conf.merge(properties.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if changed {
            conf.save()?;
        }
        Ok(changed)
    }

    async fn list_plugin_sources(&self) -> Result<Vec<PluginSource>> {
        self.plugin_sources.list_sources().await
    }

    async fn add_plugin_sources(&self, sources: Vec<PluginSource>) -> Result<Vec<PluginSource>> {
        self.plugin_sources.add_sources(sources).await
    }

    async fn remove_plugin_sources(&self, names: &[String]) -> Result<Vec<PluginSource>> {
        self.plugin_sources.remove_sources(names).await
    }

    async fn install_plugin(
        &self,
        name_or_ids: &[String],
        plugin: &str,
    ) -> Result<Vec<PluginInstallResult>> {
        let source = self
            .plugin_sources
            .find_source(plugin)
            .await?
            .ok_or_else(|| Error::not_found(format!("No plugin source named '{plugin}'")))?;
        let available = versions::fetch_versions(self.plugin_sources.client(), &source).await;

        let mut results = Vec::with_capacity(name_or_ids.len());
        for target in name_or_ids {
            let entry = self.find(target)?;
            let lock = self.dbms_lock(entry.manifest.id).await;
            let _guard = lock.lock().await;

            let server_version = DistributionManifest::load(&entry.dir)?.version;
            let spec = versions::select_compatible(&available, &server_version).ok_or_else(|| {
                Error::not_supported(format!(
                    "No version of plugin '{plugin}' supports server {server_version}"
                ))
            })?;

            if let Some(url) = &spec.download_url {
                let bytes = self
                    .plugin_sources
                    .client()
                    .get(url)
                    .send()
                    .await?
                    .error_for_status()?
                    .bytes()
                    .await?;
                let jar = entry
                    .dir
                    .join("plugins")
                    .join(format!("{plugin}-{}.jar", spec.version));
                std::fs::create_dir_all(entry.dir.join("plugins"))?;
                std::fs::write(jar, &bytes)?;
            }

            let mut manifest = PluginManifest::load(&entry.dir.join("plugins"))?;
            manifest.record(InstalledPlugin {
                name: plugin.to_string(),
                homepage_url: Some(source.homepage_url.clone()),
                version: spec.clone(),
            })?;

            info!("Installed plugin {plugin} {} on '{}'", spec.version, entry.manifest.name);
            results.push(PluginInstallResult {
                dbms_id: entry.manifest.id,
                version: spec,
            });
        }
        Ok(results)
    }

    async fn uninstall_plugin(&self, name_or_ids: &[String], plugin: &str) -> Result<()> {
        for target in name_or_ids {
            let entry = self.find(target)?;
            let lock = self.dbms_lock(entry.manifest.id).await;
            let _guard = lock.lock().await;

            let plugins_dir = entry.dir.join("plugins");
            let mut manifest = PluginManifest::load(&plugins_dir)?;
            let Some(removed) = manifest.remove(plugin)? else {
                continue;
            };

            // Only the jar the removed entry names; another plugin whose
            // name extends this one keeps its artifact.
            let jar = plugins_dir.join(format!("{plugin}-{}.jar", removed.version.version));
            if jar.exists() {
                std::fs::remove_file(jar)?;
            }
            info!("Uninstalled plugin {plugin} from '{}'", entry.manifest.name);
        }
        Ok(())
    }

    async fn list_plugins(&self, name_or_id: &str) -> Result<Vec<InstalledPlugin>> {
        let entry = self.find(name_or_id)?;
        Ok(PluginManifest::load(&entry.dir.join("plugins"))?
            .list()
            .to_vec())
    }

    async fn preview_plugin_upgrade(
        &self,
        name_or_id: &str,
        target_version: &str,
    ) -> Result<Vec<UpgradePreview>> {
        let entry = self.find(name_or_id)?;
        let target = Version::parse(target_version)?;

        let sources = self.plugin_sources.list_sources().await?;
        let installed = PluginManifest::load(&entry.dir.join("plugins"))?;

        let mut previews = Vec::new();
        for plugin in installed.list() {
            let upgradable = match sources.iter().find(|s| s.name == plugin.name) {
                Some(source) => {
                    let available =
                        versions::fetch_versions(self.plugin_sources.client(), source).await;
                    versions::select_upgrade(&available, &target, &plugin.version.version)
                }
                // A plugin without a discoverable source (bundled or
                // hand-copied) has no upgrade path.
                None => None,
            };
            previews.push(UpgradePreview {
                installed: plugin.clone(),
                upgradable,
            });
        }
        Ok(previews)
    }
}

/// Build the upgraded instance in `staging`, then swap it into place. The
/// old directory survives as `retired` until the swap has succeeded.
fn swap_distribution(
    old_dir: &Path,
    new_dist: &Path,
    staging: &Path,
    retired: &Path,
) -> Result<()> {
    if staging.exists() {
        std::fs::remove_dir_all(staging)?;
    }
    archive::copy_distribution(new_dist, staging)?;

    for carried in ["conf", "data", "plugins", "run"] {
        let src = old_dir.join(carried);
        if !src.exists() {
            continue;
        }
        let dest = staging.join(carried);
        if dest.exists() {
            std::fs::remove_dir_all(&dest)?;
        }
        archive::copy_distribution(&src, &dest)?;
    }
    std::fs::copy(
        old_dir.join(DBMS_MANIFEST_FILE),
        staging.join(DBMS_MANIFEST_FILE),
    )?;

    std::fs::rename(old_dir, retired)?;
    if let Err(e) = std::fs::rename(staging, old_dir) {
        // Roll the old directory back so the instance is never gone.
        let _ = std::fs::rename(retired, old_dir);
        return Err(e.into());
    }
    std::fs::remove_dir_all(retired)?;
    Ok(())
}
