use std::io::Write;

use eyre::Result;
use nmz_common::{load_config, SignVersion};
use nmz_dispatcher::{StaticRepository, SubscriptionRepository};

const CONFIG: &str = r#"
source_endpoint = "wss://api.p2pquake.net/v2/ws"

[retry]
max_retries = 5
initial_ms = 500

[sender]
timeout_secs = 3

[logs]
level = "debug"
json = true

[metrics]
port = 9200

[[subscriptions]]
id = "ops"
name = "Operations"

[subscriptions.filter]
min_scale = 40
prefectures = ["東京都", "神奈川県"]

[subscriptions.delivery]
type = "webhook"
url = "https://hooks.example.com/quake"
secret = "nmz_abcdef0123456789"
sign_version = "v0"

[[subscriptions]]
id = "all"
name = "Everything"

[subscriptions.delivery]
url = "https://all.example.com/quake"
secret = "nmz_other"
"#;

fn write_config(contents: &str) -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    Ok(file)
}

#[tokio::test]
async fn test_config_file_drives_static_repository() -> Result<()> {
    let file = write_config(CONFIG)?;
    let config = load_config(file.path())?;
    config.validate()?;

    assert_eq!(config.retry.max_retries, 5);
    assert_eq!(config.retry.initial_ms, 500);
    assert_eq!(config.retry.max_ms, 60_000);
    assert_eq!(config.sender.timeout_secs, 3);
    assert_eq!(config.logs.level, "debug");
    assert_eq!(config.metrics.as_ref().map(|m| m.port), Some(9200));

    let repository = StaticRepository::new(config.subscriptions.clone());
    let subscriptions = repository.list().await?;
    assert_eq!(subscriptions.len(), 2);

    let ops = repository.get("ops").await?;
    assert_eq!(ops.delivery.sign_version, SignVersion::V0);
    assert_eq!(ops.filter.as_ref().map(|f| f.min_scale), Some(40));

    let all = repository.get("all").await?;
    assert_eq!(all.delivery.sign_version, SignVersion::Legacy);
    assert!(all.filter.is_none());
    assert!(all.target().is_some());

    assert!(repository.list_by_user_id("").await?.is_empty());

    Ok(())
}

#[test]
fn test_private_subscription_url_rejected() -> Result<()> {
    let file = write_config(
        r#"
source_endpoint = "wss://api.p2pquake.net/v2/ws"

[[subscriptions]]
id = "internal"

[subscriptions.delivery]
url = "https://10.0.0.5/hook"
"#,
    )?;

    let config = load_config(file.path())?;
    assert!(config.validate().is_err());

    Ok(())
}

#[test]
fn test_missing_file_reports_path() {
    let err = load_config("/nonexistent/namazu.toml").unwrap_err();
    assert!(err.to_string().contains("/nonexistent/namazu.toml"));
}
