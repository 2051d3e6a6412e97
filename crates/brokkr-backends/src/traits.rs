//! The account capability surface
//!
//! Every backend exposes the same operations; a backend that cannot
//! perform one returns `NotSupported` naming the operation rather than
//! silently degrading. Callers hold a `Box<dyn DbmsLifecycle>` and never
//! know which backend they talk to.

use async_trait::async_trait;
use std::path::Path;
use uuid::Uuid;

use brokkr_core::config::AccountConfig;
use brokkr_core::properties::PropertiesFile;
use brokkr_core::types::{
    AuthToken, DbmsInfo, DbmsVersion, Edition, InstalledPlugin, PluginInstallResult, PluginSource,
    UpgradePreview,
};
use brokkr_core::Result;

/// Full DBMS and plugin lifecycle of one account
#[async_trait]
pub trait DbmsLifecycle: Send + Sync {
    /// The account configuration this backend was opened with
    fn account(&self) -> &AccountConfig;

    /// Install a new instance from a version specifier and return its id
    async fn install(
        &self,
        name: &str,
        credentials: &str,
        version: &str,
        edition: Option<Edition>,
    ) -> Result<Uuid>;

    /// Remove an instance and everything under it
    async fn uninstall(&self, name_or_id: &str) -> Result<DbmsInfo>;

    /// All instances of this account
    async fn list(&self) -> Result<Vec<DbmsInfo>>;

    /// One instance by name or id
    async fn get(&self, name_or_id: &str) -> Result<DbmsInfo>;

    /// Detailed info for several instances; an unknown target fails the
    /// whole call
    async fn info(&self, name_or_ids: &[String]) -> Result<Vec<DbmsInfo>>;

    /// Human-readable status line per target, positionally aligned with
    /// the input
    async fn status_dbmss(&self, name_or_ids: &[String]) -> Result<Vec<String>>;

    /// Start each target, waiting a bounded time for it to come up
    async fn start(&self, name_or_ids: &[String]) -> Result<Vec<String>>;

    /// Stop each target, waiting a bounded time for it to go down
    async fn stop(&self, name_or_ids: &[String]) -> Result<Vec<String>>;

    /// Duplicate an instance under a new name and a fresh id
    async fn clone_dbms(&self, name_or_id: &str, new_name: &str) -> Result<DbmsInfo>;

    /// Adopt an externally managed distribution directory as an instance
    async fn link(&self, external_path: &Path, name: &str) -> Result<DbmsInfo>;

    /// Move a stopped instance onto a newer distribution, carrying its
    /// data, configuration and plugins over
    async fn upgrade(&self, name_or_id: &str, version: &str) -> Result<DbmsInfo>;

    /// Server versions this account can install from
    async fn versions(&self) -> Result<Vec<DbmsVersion>>;

    /// Exchange credentials for an API access token scoped to one instance
    async fn create_access_token(
        &self,
        app_name: &str,
        name_or_id: &str,
        auth_token: AuthToken,
    ) -> Result<String>;

    /// An instance's current configuration
    async fn dbms_config(&self, name_or_id: &str) -> Result<PropertiesFile>;

    /// Merge properties into an instance's configuration; true when
    /// anything actually changed
    async fn update_config(&self, name_or_id: &str, properties: &[(String, String)])
        -> Result<bool>;

    /// All known plugin sources, official ones first
    async fn list_plugin_sources(&self) -> Result<Vec<PluginSource>>;

    /// Register user plugin sources; returns exactly the sources added
    async fn add_plugin_sources(&self, sources: Vec<PluginSource>) -> Result<Vec<PluginSource>>;

    /// Unregister user plugin sources by name; official sources are
    /// silently skipped
    async fn remove_plugin_sources(&self, names: &[String]) -> Result<Vec<PluginSource>>;

    /// Install the best compatible version of a plugin on each target
    async fn install_plugin(
        &self,
        name_or_ids: &[String],
        plugin: &str,
    ) -> Result<Vec<PluginInstallResult>>;

    /// Remove a plugin from each target; removing an absent plugin is a
    /// no-op
    async fn uninstall_plugin(&self, name_or_ids: &[String], plugin: &str) -> Result<()>;

    /// Plugins recorded as installed on one instance
    async fn list_plugins(&self, name_or_id: &str) -> Result<Vec<InstalledPlugin>>;

    /// For each installed plugin, the version it could move to on a server
    /// of `target_version`; side-effect free
    async fn preview_plugin_upgrade(
        &self,
        name_or_id: &str,
        target_version: &str,
    ) -> Result<Vec<UpgradePreview>>;
}

impl std::fmt::Debug for dyn DbmsLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbmsLifecycle")
            .field("account", &self.account().id)
            .finish_non_exhaustive()
    }
}
