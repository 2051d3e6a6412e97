//! Plugin source registry
//!
//! One registry per environment, constructed with the discovery URL its
//! official sources are fetched from and the file its user-added sources
//! persist in. Discovery failure is non-fatal: an unreachable
//! endpoint or a server error degrades to "no official sources" instead of
//! failing the caller. Official sources can never be removed and never lose
//! their official flag; caller-supplied `isOfficial` values are discarded
//! on write.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use brokkr_core::types::PluginSource;
use brokkr_core::{Error, Result};

/// Discovery endpoint the official source list is seeded from
pub const OFFICIAL_SOURCES_URL: &str = "https://plugins.brokkr.dev/sources.json";

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Registry of official and user-added plugin sources
pub struct PluginSourceRegistry {
    sources_url: String,
    user_sources_path: PathBuf,
    client: reqwest::Client,
}

impl PluginSourceRegistry {
    /// Create a registry seeded with the default official discovery URL
    pub fn new(user_sources_path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_sources_url(OFFICIAL_SOURCES_URL, user_sources_path)
    }

    /// Create a registry with an explicit discovery URL
    pub fn with_sources_url(
        sources_url: impl Into<String>,
        user_sources_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        Ok(Self {
            sources_url: sources_url.into(),
            user_sources_path: user_sources_path.into(),
            client: reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?,
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// List all sources: fetched officials first, then user-added ones in
    /// file order. Discovery failure yields no official sources.
    pub async fn list_sources(&self) -> Result<Vec<PluginSource>> {
        let mut sources = self.fetch_official().await;
        sources.extend(self.load_user_sources()?);
        Ok(sources)
    }

    /// Add user sources. Any caller-supplied official flag is discarded; a
    /// collision with any existing source name fails the whole call naming
    /// every colliding source.
    pub async fn add_sources(&self, candidates: Vec<PluginSource>) -> Result<Vec<PluginSource>> {
        let existing: HashSet<String> = self
            .list_sources()
            .await?
            .into_iter()
            .map(|s| s.name)
            .collect();

        let mut seen: HashSet<&str> = HashSet::new();
        let mut colliding: Vec<String> = Vec::new();
        for candidate in &candidates {
            if existing.contains(&candidate.name) || !seen.insert(&candidate.name) {
                if !colliding.contains(&candidate.name) {
                    colliding.push(candidate.name.clone());
                }
            }
        }
        if !colliding.is_empty() {
            return Err(Error::target_exists("dbms plugin sources", &colliding));
        }

        let added: Vec<PluginSource> = candidates
            .into_iter()
            .map(|mut source| {
                source.is_official = false;
                source
            })
            .collect();

        let mut user = self.load_user_sources()?;
        user.extend(added.clone());
        self.save_user_sources(&user)?;

        debug!("Added {} plugin sources", added.len());
        Ok(added)
    }

    /// Remove user sources by name. Official names are silently excluded;
    /// the returned list is exactly the sources actually removed.
    pub async fn remove_sources(&self, names: &[String]) -> Result<Vec<PluginSource>> {
        let user = self.load_user_sources()?;

        let (removed, kept): (Vec<PluginSource>, Vec<PluginSource>) = user
            .into_iter()
            .partition(|source| names.contains(&source.name));

        self.save_user_sources(&kept)?;
        debug!("Removed {} plugin sources", removed.len());
        Ok(removed)
    }

    /// Find one source by its unique, case-sensitive name
    pub async fn find_source(&self, name: &str) -> Result<Option<PluginSource>> {
        Ok(self
            .list_sources()
            .await?
            .into_iter()
            .find(|source| source.name == name))
    }

    async fn fetch_official(&self) -> Vec<PluginSource> {
        match self.try_fetch_official().await {
            Ok(sources) => sources,
            Err(e) => {
                warn!("Plugin source discovery failed, continuing without official sources: {e}");
                Vec::new()
            }
        }
    }

    async fn try_fetch_official(&self) -> Result<Vec<PluginSource>> {
        let response = self
            .client
            .get(&self.sources_url)
            .send()
            .await?
            .error_for_status()?;

        let mut sources: Vec<PluginSource> = response.json().await?;
        for source in &mut sources {
            source.is_official = true;
        }
        Ok(sources)
    }

    fn load_user_sources(&self) -> Result<Vec<PluginSource>> {
        if !self.user_sources_path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.user_sources_path)?;
        let mut sources: Vec<PluginSource> = serde_yaml_ng::from_str(&content)?;
        // The file is user-editable; the official flag is never honored
        // from it.
        for source in &mut sources {
            source.is_official = false;
        }
        Ok(sources)
    }

    fn save_user_sources(&self, sources: &[PluginSource]) -> Result<()> {
        if let Some(parent) = self.user_sources_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.user_sources_path, serde_yaml_ng::to_string(sources)?)?;
        Ok(())
    }

    pub fn user_sources_path(&self) -> &Path {
        &self.user_sources_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn apoc_json() -> serde_json::Value {
        json!([{
            "name": "apoc",
            "homepageUrl": "https://example.com/apoc",
            "versionsUrl": "https://example.com/apoc/versions.json"
        }])
    }

    fn user_source(name: &str, official: bool) -> PluginSource {
        PluginSource {
            name: name.to_string(),
            homepage_url: format!("https://example.com/{name}"),
            versions_url: format!("https://example.com/{name}/versions.json"),
            is_official: official,
        }
    }

    async fn registry_with(
        server: &MockServer,
        dir: &std::path::Path,
    ) -> PluginSourceRegistry {
        PluginSourceRegistry::with_sources_url(
            format!("{}/sources.json", server.uri()),
            dir.join("plugin-sources.yaml"),
        )
        .unwrap()
    }

    async fn mount_sources(server: &MockServer, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/sources.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_empty_discovery_yields_no_sources() {
        let server = MockServer::start().await;
        let tmp = tempfile::tempdir().unwrap();
        mount_sources(&server, json!([])).await;

        let registry = registry_with(&server, tmp.path()).await;
        assert!(registry.list_sources().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_discovery_error_degrades_to_empty() {
        let server = MockServer::start().await;
        let tmp = tempfile::tempdir().unwrap();
        Mock::given(method("GET"))
            .and(path("/sources.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let registry = registry_with(&server, tmp.path()).await;
        assert!(registry.list_sources().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_official_sources_are_flagged() {
        let server = MockServer::start().await;
        let tmp = tempfile::tempdir().unwrap();
        mount_sources(&server, apoc_json()).await;

        let registry = registry_with(&server, tmp.path()).await;
        let sources = registry.list_sources().await.unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name, "apoc");
        assert!(sources[0].is_official);
    }

    #[tokio::test]
    async fn test_add_colliding_source_fails_without_partial_application() {
        let server = MockServer::start().await;
        let tmp = tempfile::tempdir().unwrap();
        mount_sources(&server, apoc_json()).await;

        let registry = registry_with(&server, tmp.path()).await;
        let err = registry
            .add_sources(vec![user_source("apoc", false), user_source("mine", false)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TargetExists { .. }));
        assert_eq!(
            err.to_string(),
            "The following dbms plugin sources already exist: apoc"
        );

        // No partial application: "mine" was not added either.
        let sources = registry.list_sources().await.unwrap();
        assert!(!sources.iter().any(|s| s.name == "mine"));
    }

    #[tokio::test]
    async fn test_add_strips_official_flag() {
        let server = MockServer::start().await;
        let tmp = tempfile::tempdir().unwrap();
        mount_sources(&server, json!([])).await;

        let registry = registry_with(&server, tmp.path()).await;
        let added = registry
            .add_sources(vec![user_source("sneaky", true)])
            .await
            .unwrap();
        assert_eq!(added.len(), 1);
        assert!(!added[0].is_official);

        let listed = registry.list_sources().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].is_official);
    }

    #[tokio::test]
    async fn test_remove_skips_official_sources() {
        let server = MockServer::start().await;
        let tmp = tempfile::tempdir().unwrap();
        mount_sources(&server, apoc_json()).await;

        let registry = registry_with(&server, tmp.path()).await;
        let removed = registry
            .remove_sources(&["apoc".to_string()])
            .await
            .unwrap();
        assert!(removed.is_empty());

        let listed = registry.list_sources().await.unwrap();
        assert!(listed.iter().any(|s| s.name == "apoc" && s.is_official));
    }

    #[tokio::test]
    async fn test_remove_user_sources() {
        let server = MockServer::start().await;
        let tmp = tempfile::tempdir().unwrap();
        mount_sources(&server, json!([])).await;

        let registry = registry_with(&server, tmp.path()).await;
        registry
            .add_sources(vec![user_source("one", false), user_source("two", false)])
            .await
            .unwrap();

        let removed = registry
            .remove_sources(&["one".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].name, "one");

        let listed = registry.list_sources().await.unwrap();
        let names: Vec<&str> = listed.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["two"]);
    }

    #[tokio::test]
    async fn test_batch_with_duplicate_names_fails() {
        let server = MockServer::start().await;
        let tmp = tempfile::tempdir().unwrap();
        mount_sources(&server, json!([])).await;

        let registry = registry_with(&server, tmp.path()).await;
        let err = registry
            .add_sources(vec![user_source("dup", false), user_source("dup", false)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TargetExists { .. }));
        assert!(err.to_string().contains("dup"));
    }
}
