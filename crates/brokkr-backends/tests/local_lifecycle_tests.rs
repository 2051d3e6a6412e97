mod common;

use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use brokkr_backends::{DbmsLifecycle, LocalAccount};
use brokkr_core::types::{AuthToken, DbmsStatus, Edition};
use brokkr_core::Error;

use common::{account_config, seed_cache, write_distribution};

fn open(root: &std::path::Path) -> LocalAccount {
    LocalAccount::new(account_config(root))
        .unwrap()
        .with_timeouts(Duration::from_secs(5), Duration::from_secs(5))
}

#[tokio::test]
async fn test_install_and_list() {
    let tmp = tempfile::tempdir().unwrap();
    seed_cache(&tmp.path().join("cache"), "4.0.12", Edition::Enterprise);
    let account = open(tmp.path());

    let id = account
        .install("my dbms", "secret", "4.0.12", None)
        .await
        .unwrap();

    let listed = account.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, id);
    assert_eq!(listed[0].name, "my dbms");
    assert_eq!(listed[0].version.as_ref().unwrap().to_string(), "4.0.12");
    assert_eq!(listed[0].edition, Some(Edition::Enterprise));
    assert_eq!(listed[0].status, DbmsStatus::Stopped);
    assert_eq!(
        listed[0].connection_uri.as_deref(),
        Some("bolt://127.0.0.1:7687")
    );

    // Credentials are seeded into the instance configuration.
    let conf = account.dbms_config(&id.to_string()).await.unwrap();
    assert_eq!(conf.get("server.security.initial_password"), Some("secret"));
}

#[tokio::test]
async fn test_same_version_installs_as_distinct_instances() {
    let tmp = tempfile::tempdir().unwrap();
    seed_cache(&tmp.path().join("cache"), "4.0.12", Edition::Enterprise);
    let account = open(tmp.path());

    let first = account
        .install("first", "secret", "4.0.12", None)
        .await
        .unwrap();
    let second = account
        .install("second", "secret", "4.0.12", None)
        .await
        .unwrap();
    assert_ne!(first, second);

    let status = account
        .status_dbmss(&[first.to_string(), second.to_string()])
        .await
        .unwrap();
    assert_eq!(status.len(), 2);
    for line in &status {
        assert_eq!(line, "Database server is not running");
    }
}

#[tokio::test]
async fn test_install_duplicate_name_fails() {
    let tmp = tempfile::tempdir().unwrap();
    seed_cache(&tmp.path().join("cache"), "4.0.12", Edition::Enterprise);
    let account = open(tmp.path());

    account
        .install("taken", "secret", "4.0.12", None)
        .await
        .unwrap();
    let err = account
        .install("taken", "secret", "4.0.12", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TargetExists { .. }));
    assert!(err.to_string().contains("taken"));
}

#[tokio::test]
async fn test_failed_install_leaves_nothing_behind() {
    let tmp = tempfile::tempdir().unwrap();
    let account = open(tmp.path());

    let err = account
        .install("ghost", "secret", "4.0.12", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotSupported { .. }));

    assert!(account.list().await.unwrap().is_empty());
    let leftovers = std::fs::read_dir(tmp.path().join("dbmss"))
        .unwrap()
        .count();
    assert_eq!(leftovers, 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_start_status_stop_cycle() {
    let tmp = tempfile::tempdir().unwrap();
    seed_cache(&tmp.path().join("cache"), "4.0.12", Edition::Enterprise);
    let account = open(tmp.path());

    let id = account
        .install("runner", "secret", "4.0.12", None)
        .await
        .unwrap();
    let targets = vec![id.to_string()];

    let started = account.start(&targets).await.unwrap();
    assert!(started[0].contains("running"), "got: {}", started[0]);

    let status = account.status_dbmss(&targets).await.unwrap();
    assert!(status[0].starts_with("Database server is running (pid "));
    assert_eq!(account.get(&id.to_string()).await.unwrap().status, DbmsStatus::Running);

    let stopped = account.stop(&targets).await.unwrap();
    assert!(stopped[0].contains("stopped"));

    let status = account.status_dbmss(&targets).await.unwrap();
    assert_eq!(status[0], "Database server is not running");
}

#[tokio::test]
async fn test_listings_survive_reopening_the_account() {
    let tmp = tempfile::tempdir().unwrap();
    seed_cache(&tmp.path().join("cache"), "4.0.12", Edition::Enterprise);

    let id = {
        let account = open(tmp.path());
        account
            .install("durable", "secret", "4.0.12", None)
            .await
            .unwrap()
    };

    // A fresh account object over the same root sees the same instances;
    // the manifests on disk are the registry.
    let reopened = open(tmp.path());
    let listed = reopened.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, id);
    assert_eq!(listed[0].name, "durable");
}

#[cfg(unix)]
#[tokio::test]
async fn test_start_that_never_comes_up_times_out() {
    let tmp = tempfile::tempdir().unwrap();
    seed_cache(&tmp.path().join("cache"), "4.0.12", Edition::Enterprise);
    let account = LocalAccount::new(account_config(tmp.path()))
        .unwrap()
        .with_timeouts(Duration::from_millis(300), Duration::from_millis(300));

    let id = account
        .install("silent", "secret", "4.0.12", None)
        .await
        .unwrap();

    // A control script that exits without ever writing a pid.
    let script = tmp
        .path()
        .join("dbmss")
        .join(format!("dbms-{id}"))
        .join("bin")
        .join("server");
    std::fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();

    let err = account.start(&[id.to_string()]).await.unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));
}

#[tokio::test]
async fn test_status_with_unknown_target_fails_whole_call() {
    let tmp = tempfile::tempdir().unwrap();
    seed_cache(&tmp.path().join("cache"), "4.0.12", Edition::Enterprise);
    let account = open(tmp.path());

    account
        .install("known", "secret", "4.0.12", None)
        .await
        .unwrap();

    let err = account
        .status_dbmss(&["known".to_string(), "missing".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
    assert!(err.to_string().contains("missing"));
}

#[tokio::test]
async fn test_uninstall_removes_instance() {
    let tmp = tempfile::tempdir().unwrap();
    seed_cache(&tmp.path().join("cache"), "4.0.12", Edition::Enterprise);
    let account = open(tmp.path());

    let id = account
        .install("doomed", "secret", "4.0.12", None)
        .await
        .unwrap();
    let removed = account.uninstall("doomed").await.unwrap();
    assert_eq!(removed.id, id);

    assert!(account.list().await.unwrap().is_empty());
    assert!(!tmp.path().join("dbmss").join(format!("dbms-{id}")).exists());
}

#[tokio::test]
async fn test_clone_gets_fresh_identity() {
    let tmp = tempfile::tempdir().unwrap();
    seed_cache(&tmp.path().join("cache"), "4.0.12", Edition::Enterprise);
    let account = open(tmp.path());

    let original = account
        .install("original", "secret", "4.0.12", None)
        .await
        .unwrap();
    let clone = account.clone_dbms("original", "copy").await.unwrap();

    assert_ne!(clone.id, original);
    assert_eq!(clone.name, "copy");
    assert_eq!(clone.status, DbmsStatus::Stopped);

    let names: Vec<String> = account
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert_eq!(names, vec!["copy".to_string(), "original".to_string()]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_link_adopts_external_distribution() {
    let tmp = tempfile::tempdir().unwrap();
    let account = open(tmp.path());

    let external = tmp.path().join("external-dist");
    write_distribution(&external, "4.2.0", "enterprise");

    let linked = account.link(&external, "adopted").await.unwrap();
    assert_eq!(linked.name, "adopted");
    assert_eq!(linked.version.unwrap().to_string(), "4.2.0");

    // Uninstalling a linked instance drops the link, not the directory.
    account.uninstall("adopted").await.unwrap();
    assert!(external.join("distribution.yaml").exists());
    assert!(account.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_link_rejects_non_distribution() {
    let tmp = tempfile::tempdir().unwrap();
    let account = open(tmp.path());

    let plain = tmp.path().join("plain");
    std::fs::create_dir_all(&plain).unwrap();

    let err = account.link(&plain, "bogus").await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { .. }));
}

#[tokio::test]
async fn test_upgrade_carries_data_and_config() {
    let tmp = tempfile::tempdir().unwrap();
    seed_cache(&tmp.path().join("cache"), "4.0.12", Edition::Enterprise);
    seed_cache(&tmp.path().join("cache"), "4.2.0", Edition::Enterprise);
    let account = open(tmp.path());

    let id = account
        .install("mover", "secret", "4.0.12", None)
        .await
        .unwrap();
    let dbms_dir = tmp.path().join("dbmss").join(format!("dbms-{id}"));
    std::fs::create_dir_all(dbms_dir.join("data")).unwrap();
    std::fs::write(dbms_dir.join("data").join("store.db"), "precious").unwrap();

    let upgraded = account.upgrade("mover", "4.2.0").await.unwrap();
    assert_eq!(upgraded.version.unwrap().to_string(), "4.2.0");
    assert_eq!(upgraded.name, "mover");
    assert_eq!(upgraded.id, id);

    let data = std::fs::read_to_string(dbms_dir.join("data").join("store.db")).unwrap();
    assert_eq!(data, "precious");
    let conf = account.dbms_config("mover").await.unwrap();
    assert_eq!(conf.get("server.security.initial_password"), Some("secret"));
}

#[tokio::test]
async fn test_upgrade_must_move_forward() {
    let tmp = tempfile::tempdir().unwrap();
    seed_cache(&tmp.path().join("cache"), "4.0.12", Edition::Enterprise);
    let account = open(tmp.path());

    account
        .install("stuck", "secret", "4.0.12", None)
        .await
        .unwrap();
    let err = account.upgrade("stuck", "4.0.12").await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { .. }));
    assert!(err.to_string().contains("newer"));
}

#[tokio::test]
async fn test_update_config_reports_changes() {
    let tmp = tempfile::tempdir().unwrap();
    seed_cache(&tmp.path().join("cache"), "4.0.12", Edition::Enterprise);
    let account = open(tmp.path());

    account
        .install("tuned", "secret", "4.0.12", None)
        .await
        .unwrap();

    let pair = vec![("server.memory.heap.max_size".to_string(), "2g".to_string())];
    assert!(account.update_config("tuned", &pair).await.unwrap());
    // Writing the same value again changes nothing.
    assert!(!account.update_config("tuned", &pair).await.unwrap());

    let conf = account.dbms_config("tuned").await.unwrap();
    assert_eq!(conf.get("server.memory.heap.max_size"), Some("2g"));
}

#[tokio::test]
async fn test_versions_lists_cached_distributions() {
    let tmp = tempfile::tempdir().unwrap();
    seed_cache(&tmp.path().join("cache"), "4.0.12", Edition::Enterprise);
    seed_cache(&tmp.path().join("cache"), "4.2.0", Edition::Enterprise);
    let account = open(tmp.path());

    let versions = account.versions().await.unwrap();
    let listed: Vec<String> = versions.iter().map(|v| v.version.to_string()).collect();
    assert_eq!(listed, vec!["4.2.0".to_string(), "4.0.12".to_string()]);
}

#[tokio::test]
async fn test_create_access_token() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    seed_cache(&tmp.path().join("cache"), "4.0.12", Edition::Enterprise);
    let account = open(tmp.path());

    account
        .install("tokened", "secret", "4.0.12", None)
        .await
        .unwrap();

    // Point the instance's HTTP endpoint at the mock server.
    let address = server.uri().strip_prefix("http://").unwrap().to_string();
    account
        .update_config(
            "tokened",
            &[("server.http.listen_address".to_string(), address)],
        )
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/auth/tokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "token": "issued-token"
        })))
        .mount(&server)
        .await;

    let token = account
        .create_access_token(
            "brokkr-app",
            "tokened",
            AuthToken {
                principal: "admin".to_string(),
                credentials: "secret".to_string(),
                scheme: "basic".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(token, "issued-token");
}
