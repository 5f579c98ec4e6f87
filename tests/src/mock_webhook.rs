use std::{
    collections::VecDeque,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    Router,
};
use parking_lot::RwLock;
use tokio::net::TcpListener;
use tracing::debug;

/// A webhook request as the receiver saw it
#[derive(Debug, Clone)]
pub struct ReceivedWebhook {
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub received_at: Instant,
}

impl ReceivedWebhook {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

pub struct MockWebhookState {
    received: AtomicU64,
    requests: RwLock<Vec<ReceivedWebhook>>,
    /// Served in order before falling back to `response_override`
    scripted: RwLock<VecDeque<StatusCode>>,
    response_override: RwLock<Option<StatusCode>>,
    delay: RwLock<Duration>,
}

impl Default for MockWebhookState {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWebhookState {
    pub fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            requests: RwLock::new(Vec::new()),
            scripted: RwLock::new(VecDeque::new()),
            response_override: RwLock::new(None),
            delay: RwLock::new(Duration::ZERO),
        }
    }

    pub fn with_statuses(self, statuses: &[StatusCode]) -> Self {
        *self.scripted.write() = statuses.iter().copied().collect();
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.write() = delay;
        self
    }

    pub fn set_response_override(&self, status: StatusCode) {
        *self.response_override.write() = Some(status);
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn requests(&self) -> Vec<ReceivedWebhook> {
        self.requests.read().clone()
    }

    fn next_status(&self) -> StatusCode {
        if let Some(status) = self.scripted.write().pop_front() {
            return status;
        }
        self.response_override.read().unwrap_or(StatusCode::OK)
    }
}

pub fn mock_webhook_router(state: Arc<MockWebhookState>) -> Router {
    Router::new().fallback(handle_webhook).with_state(state)
}

/// Binds an ephemeral port on 127.0.0.1 and serves in the background.
pub async fn start_mock_webhook(state: Arc<MockWebhookState>) -> eyre::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        let _ = axum::serve(listener, mock_webhook_router(state)).await;
    });

    Ok(addr)
}

async fn handle_webhook(
    State(state): State<Arc<MockWebhookState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    state.received.fetch_add(1, Ordering::Relaxed);
    state.requests.write().push(ReceivedWebhook {
        path: uri.path().to_string(),
        headers,
        body,
        received_at: Instant::now(),
    });

    let delay = *state.delay.read();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let status = state.next_status();
    debug!(path = %uri.path(), %status, "mock webhook answered");
    status
}
