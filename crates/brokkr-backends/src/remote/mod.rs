//! Remote control plane backend
//!
//! Proxies every lifecycle operation to a remote environment over the
//! GraphQL transport, passing the configured environment id as an operand
//! on every request. Connection URIs the remote hands back name hosts
//! internal to its network, so `get` rewrites them to the account's
//! configured external host; an account without one cannot produce a
//! usable URI and fails with a configuration error. Filesystem-bound
//! operations (clone, link, upgrade, raw config access) have no remote
//! counterpart and are refused by name.

mod graphql;

use async_trait::async_trait;
use serde_json::json;
use std::path::Path;
use uuid::Uuid;

use brokkr_core::config::{AccountConfig, RemoteConfig};
use brokkr_core::properties::PropertiesFile;
use brokkr_core::types::{
    AuthToken, DbmsInfo, DbmsStatus, DbmsVersion, Edition, InstalledPlugin, PluginInstallResult,
    PluginSource, UpgradePreview,
};
use brokkr_core::{Error, Result};

use crate::traits::DbmsLifecycle;
use graphql::GraphqlClient;

/// Backend proxying lifecycle operations to a remote environment
pub struct RemoteAccount {
    config: AccountConfig,
    remote: RemoteConfig,
    client: GraphqlClient,
}

impl RemoteAccount {
    pub fn new(config: AccountConfig) -> Result<Self> {
        let remote = config.remote.clone().ok_or_else(|| {
            Error::invalid_config("Remote accounts require a remote configuration")
        })?;
        let client = GraphqlClient::new(&remote)?;
        Ok(Self {
            config,
            remote,
            client,
        })
    }

    /// Rewrite a connection URI onto the configured external host
    fn externalize_uri(&self, uri: &str) -> Result<String> {
        let external = self.remote.external_host.as_ref().ok_or_else(|| {
            Error::invalid_config(
                "Remote accounts must specify an external host to expose connection URIs",
            )
        })?;
        let mut parsed = url::Url::parse(uri)
            .map_err(|_| Error::invalid_argument(format!("Invalid connection URI: {uri}")))?;
        parsed
            .set_host(external.host_str())
            .map_err(|_| Error::invalid_argument(format!("Invalid connection URI: {uri}")))?;
        Ok(parsed.to_string())
    }

    fn require_external_host(&self) -> Result<()> {
        if self.remote.external_host.is_none() {
            return Err(Error::invalid_config(
                "Remote accounts must specify an external host to expose connection URIs",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DbmsLifecycle for RemoteAccount {
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
        let info: DbmsInfo = self
            .client
            .execute_field(
                "install dbms",
                "mutation InstallDbms($environmentId: String!, $name: String!, \
                 $credentials: String!, $version: String!, $edition: String) { \
                 installDbms(environmentId: $environmentId, name: $name, \
                 credentials: $credentials, version: $version, edition: $edition) \
                 { id name } }",
                json!({
                    "environmentId": self.remote.environment_id,
                    "name": name,
                    "credentials": credentials,
                    "version": version,
                    "edition": edition.map(|e| e.to_string()),
                }),
                "installDbms",
            )
            .await?;
        Ok(info.id)
    }

    async fn uninstall(&self, name_or_id: &str) -> Result<DbmsInfo> {
        self.client
            .execute_field(
                "uninstall dbms",
                "mutation UninstallDbms($environmentId: String!, $dbmsId: String!) { \
                 uninstallDbms(environmentId: $environmentId, dbmsId: $dbmsId) \
                 { id name description tags } }",
                json!({
                    "environmentId": self.remote.environment_id,
                    "dbmsId": name_or_id,
                }),
                "uninstallDbms",
            )
            .await
    }

    async fn list(&self) -> Result<Vec<DbmsInfo>> {
        self.client
            .execute_field(
                "list dbmss",
                "query ListDbmss($environmentId: String!) { \
                 listDbmss(environmentId: $environmentId) \
                 { id name description tags status } }",
                json!({ "environmentId": self.remote.environment_id }),
                "listDbmss",
            )
            .await
    }

    async fn get(&self, name_or_id: &str) -> Result<DbmsInfo> {
        // Checked up front: a missing external host is a configuration
        // fault of this account, whatever the remote would have answered.
        self.require_external_host()?;

        let mut info: DbmsInfo = self
            .client
            .execute_field(
                "get dbms",
                "query GetDbms($environmentId: String!, $dbmsId: String!) { \
                 getDbms(environmentId: $environmentId, dbmsId: $dbmsId) \
                 { id name description tags version edition status connectionUri } }",
                json!({
                    "environmentId": self.remote.environment_id,
                    "dbmsId": name_or_id,
                }),
                "getDbms",
            )
            .await?;

        if let Some(uri) = &info.connection_uri {
            info.connection_uri = Some(self.externalize_uri(uri)?);
        }
        Ok(info)
    }

    async fn info(&self, name_or_ids: &[String]) -> Result<Vec<DbmsInfo>> {
        self.client
            .execute_field(
                "get dbms info",
                "query InfoDbmss($environmentId: String!, $dbmsIds: [String!]!) { \
                 infoDbmss(environmentId: $environmentId, dbmsIds: $dbmsIds) \
                 { id name description tags version edition status } }",
                json!({
                    "environmentId": self.remote.environment_id,
                    "dbmsIds": name_or_ids,
                }),
                "infoDbmss",
            )
            .await
    }

    async fn status_dbmss(&self, name_or_ids: &[String]) -> Result<Vec<String>> {
        let infos = self.info(name_or_ids).await?;
        Ok(infos
            .into_iter()
            .map(|info| match info.status {
                DbmsStatus::Running => "Database server is running".to_string(),
                DbmsStatus::Stopped => "Database server is not running".to_string(),
                DbmsStatus::Unknown => "Database server status is unknown".to_string(),
            })
            .collect())
    }

    async fn start(&self, name_or_ids: &[String]) -> Result<Vec<String>> {
        self.client
            .execute_field(
                "start dbmss",
                "mutation StartDbmss($environmentId: String!, $dbmsIds: [String!]!) { \
                 startDbmss(environmentId: $environmentId, dbmsIds: $dbmsIds) }",
                json!({
                    "environmentId": self.remote.environment_id,
                    "dbmsIds": name_or_ids,
                }),
                "startDbmss",
            )
            .await
    }

    async fn stop(&self, name_or_ids: &[String]) -> Result<Vec<String>> {
        self.client
            .execute_field(
                "stop dbmss",
                "mutation StopDbmss($environmentId: String!, $dbmsIds: [String!]!) { \
                 stopDbmss(environmentId: $environmentId, dbmsIds: $dbmsIds) }",
                json!({
                    "environmentId": self.remote.environment_id,
                    "dbmsIds": name_or_ids,
                }),
                "stopDbmss",
            )
            .await
    }

    async fn clone_dbms(&self, _name_or_id: &str, _new_name: &str) -> Result<DbmsInfo> {
        Err(Error::not_supported(
            "cloning a DBMS is not supported on remote accounts",
        ))
    }

    async fn link(&self, _external_path: &Path, _name: &str) -> Result<DbmsInfo> {
        Err(Error::not_supported(
            "linking a DBMS is not supported on remote accounts",
        ))
    }

    async fn upgrade(&self, _name_or_id: &str, _version: &str) -> Result<DbmsInfo> {
        Err(Error::not_supported(
            "upgrading a DBMS is not supported on remote accounts",
        ))
    }

    async fn versions(&self) -> Result<Vec<DbmsVersion>> {
        self.client
            .execute_field(
                "list dbms versions",
                "query ListDbmsVersions($environmentId: String!) { \
                 listDbmsVersions(environmentId: $environmentId) \
                 { version edition origin } }",
                json!({ "environmentId": self.remote.environment_id }),
                "listDbmsVersions",
            )
            .await
    }

    async fn create_access_token(
        &self,
        app_name: &str,
        name_or_id: &str,
        auth_token: AuthToken,
    ) -> Result<String> {
        self.client
            .execute_field(
                "create access token",
                "mutation CreateAccessToken($environmentId: String!, $dbmsId: String!, \
                 $appName: String!, $authToken: AuthTokenInput!) { \
                 createAccessToken(environmentId: $environmentId, dbmsId: $dbmsId, \
                 appName: $appName, authToken: $authToken) }",
                json!({
                    "environmentId": self.remote.environment_id,
                    "dbmsId": name_or_id,
                    "appName": app_name,
                    "authToken": {
                        "principal": auth_token.principal,
                        "credentials": auth_token.credentials,
                        "scheme": auth_token.scheme,
                    },
                }),
                "createAccessToken",
            )
            .await
    }

    async fn dbms_config(&self, _name_or_id: &str) -> Result<PropertiesFile> {
        Err(Error::not_supported(
            "reading raw DBMS configuration is not supported on remote accounts",
        ))
    }

    async fn update_config(
        &self,
        name_or_id: &str,
        properties: &[(String, String)],
    ) -> Result<bool> {
        let pairs: Vec<[&str; 2]> = properties
            .iter()
            .map(|(k, v)| [k.as_str(), v.as_str()])
            .collect();
        self.client
            .execute_field(
                "update dbms config",
                "mutation UpdateDbmsConfig($environmentId: String!, $dbmsId: String!, \
                 $properties: [[String!]!]!) { \
                 updateDbmsConfig(environmentId: $environmentId, dbmsId: $dbmsId, \
                 properties: $properties) }",
                json!({
                    "environmentId": self.remote.environment_id,
                    "dbmsId": name_or_id,
                    "properties": pairs,
                }),
                "updateDbmsConfig",
            )
            .await
    }

    async fn list_plugin_sources(&self) -> Result<Vec<PluginSource>> {
        self.client
            .execute_field(
                "list dbms plugin sources",
                "query ListDbmsPluginSources($environmentId: String!) { \
                 listDbmsPluginSources(environmentId: $environmentId) \
                 { name homepageUrl versionsUrl isOfficial } }",
                json!({ "environmentId": self.remote.environment_id }),
                "listDbmsPluginSources",
            )
            .await
    }

    async fn add_plugin_sources(&self, sources: Vec<PluginSource>) -> Result<Vec<PluginSource>> {
        self.client
            .execute_field(
                "add dbms plugin sources",
                "mutation AddDbmsPluginSources($environmentId: String!, \
                 $sources: [PluginSourceInput!]!) { \
                 addDbmsPluginSources(environmentId: $environmentId, sources: $sources) \
                 { name homepageUrl versionsUrl isOfficial } }",
                json!({
                    "environmentId": self.remote.environment_id,
                    "sources": sources,
                }),
                "addDbmsPluginSources",
            )
            .await
    }

    async fn remove_plugin_sources(&self, names: &[String]) -> Result<Vec<PluginSource>> {
        self.client
            .execute_field(
                "remove dbms plugin sources",
                "mutation RemoveDbmsPluginSources($environmentId: String!, \
                 $names: [String!]!) { \
                 removeDbmsPluginSources(environmentId: $environmentId, names: $names) \
                 { name homepageUrl versionsUrl isOfficial } }",
                json!({
                    "environmentId": self.remote.environment_id,
                    "names": names,
                }),
                "removeDbmsPluginSources",
            )
            .await
    }

    async fn install_plugin(
        &self,
        name_or_ids: &[String],
        plugin: &str,
    ) -> Result<Vec<PluginInstallResult>> {
        self.client
            .execute_field(
                "install dbms plugin",
                "mutation InstallDbmsPlugin($environmentId: String!, \
                 $dbmsIds: [String!]!, $pluginName: String!) { \
                 installDbmsPlugin(environmentId: $environmentId, dbmsIds: $dbmsIds, \
                 pluginName: $pluginName) { dbmsId version { version serverVersions \
                 downloadUrl sha256 } } }",
                json!({
                    "environmentId": self.remote.environment_id,
                    "dbmsIds": name_or_ids,
                    "pluginName": plugin,
                }),
                "installDbmsPlugin",
            )
            .await
    }

    async fn uninstall_plugin(&self, name_or_ids: &[String], plugin: &str) -> Result<()> {
        self.client
            .execute(
                "uninstall dbms plugin",
                "mutation UninstallDbmsPlugin($environmentId: String!, \
                 $dbmsIds: [String!]!, $pluginName: String!) { \
                 uninstallDbmsPlugin(environmentId: $environmentId, dbmsIds: $dbmsIds, \
                 pluginName: $pluginName) }",
                json!({
                    "environmentId": self.remote.environment_id,
                    "dbmsIds": name_or_ids,
                    "pluginName": plugin,
                }),
            )
            .await?;
        Ok(())
    }

    async fn list_plugins(&self, name_or_id: &str) -> Result<Vec<InstalledPlugin>> {
        self.client
            .execute_field(
                "list dbms plugins",
                "query ListDbmsPlugins($environmentId: String!, $dbmsId: String!) { \
                 listDbmsPlugins(environmentId: $environmentId, dbmsId: $dbmsId) \
                 { name homepageUrl version { version serverVersions downloadUrl sha256 } } }",
                json!({
                    "environmentId": self.remote.environment_id,
                    "dbmsId": name_or_id,
                }),
                "listDbmsPlugins",
            )
            .await
    }

    async fn preview_plugin_upgrade(
        &self,
        name_or_id: &str,
        target_version: &str,
    ) -> Result<Vec<UpgradePreview>> {
        self.client
            .execute_field(
                "preview dbms plugin upgrade",
                "query PreviewDbmsPluginUpgrade($environmentId: String!, \
                 $dbmsId: String!, $serverVersion: String!) { \
                 previewDbmsPluginUpgrade(environmentId: $environmentId, \
                 dbmsId: $dbmsId, serverVersion: $serverVersion) \
                 { installed upgradable } }",
                json!({
                    "environmentId": self.remote.environment_id,
                    "dbmsId": name_or_id,
                    "serverVersion": target_version,
                }),
                "previewDbmsPluginUpgrade",
            )
            .await
    }
}
