use std::{future::Future, time::Duration};

use tokio::time::Instant;

pub fn setup_test_env() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}

/// Polls `condition` every 20ms until it holds or `timeout` elapses.
pub async fn wait_for<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// A code-551 frame as the P2P feed sends it.
pub fn quake_frame(id: &str, max_scale: i32, prefectures: &[&str]) -> String {
    let points: Vec<String> = prefectures
        .iter()
        .map(|pref| {
            format!(r#"{{"pref":"{pref}","addr":"{pref}内","scale":{max_scale},"isArea":false}}"#)
        })
        .collect();

    format!(
        r#"{{"_id":"{id}","code":551,"time":"2024/01/01 16:10:09.123","issue":{{"source":"気象庁","time":"2024/01/01 16:10:00","type":"DetailScale","correct":"None"}},"earthquake":{{"time":"2024/01/01 16:10:00","hypocenter":{{"name":"石川県能登地方","latitude":37.5,"longitude":137.3,"depth":10,"magnitude":7.6}},"maxScale":{max_scale},"domesticTsunami":"Warning"}},"points":[{}]}}"#,
        points.join(",")
    )
}
