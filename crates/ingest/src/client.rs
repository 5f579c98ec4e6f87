//! Upstream WebSocket ingestion.
//!
//! The read loop owns the connection. The reconnect scheduler never touches
//! the socket: it asks the read loop to rotate, and the rotation happens
//! between two frames. The upstream force-closes connections after ten
//! minutes, so rotating earlier keeps that drop from landing mid-message.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::Utc;
use futures::{FutureExt, StreamExt};
use nmz_common::{config::IngestConfig, ExponentialBackoff, SharedEvent};
use tokio::{
    net::TcpStream,
    sync::{
        mpsc::{self, error::TrySendError},
        Notify,
    },
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message},
    MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    decoder::{decode_frame, Discard, EventDecoder, P2pQuakeDecoder},
    dedup::Deduplicator,
    error::IngestError,
    metrics::{
        INGEST_CONNECTED, INGEST_EVENTS_DROPPED, INGEST_EVENTS_PUBLISHED,
        INGEST_MESSAGES_RECEIVED, INGEST_RECONNECTS,
    },
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Pause after a failed reconnect cycle before starting another one
const RECONNECT_PAUSE: Duration = Duration::from_secs(5);

pub struct IngestClient {
    endpoint: String,
    max_retries: u32,
    backoff: ExponentialBackoff,
    reconnect_interval: Duration,
    handshake_timeout: Duration,
    dedup: Deduplicator,
    decoder: Arc<dyn EventDecoder>,
    events: mpsc::Sender<SharedEvent>,
    done: CancellationToken,
    rotate: Notify,
    started: AtomicBool,
    connected: AtomicBool,
    reconnects: AtomicU64,
}

impl IngestClient {
    /// Creates a client for the P2P earthquake feed together with the
    /// receiving end of its bounded events channel.
    pub fn new(
        endpoint: impl Into<String>,
        config: &IngestConfig,
        dedup: Deduplicator,
    ) -> (Arc<Self>, mpsc::Receiver<SharedEvent>) {
        Self::with_decoder(endpoint, config, dedup, Arc::new(P2pQuakeDecoder))
    }

    pub fn with_decoder(
        endpoint: impl Into<String>,
        config: &IngestConfig,
        dedup: Deduplicator,
        decoder: Arc<dyn EventDecoder>,
    ) -> (Arc<Self>, mpsc::Receiver<SharedEvent>) {
        let (events, rx) = mpsc::channel(config.events_channel_capacity.max(1));

        let client = Arc::new(Self {
            endpoint: endpoint.into(),
            max_retries: config.max_retries.max(1),
            backoff: config.backoff(),
            reconnect_interval: config.reconnect_interval(),
            handshake_timeout: config.handshake_timeout(),
            dedup,
            decoder,
            events,
            done: CancellationToken::new(),
            rotate: Notify::new(),
            started: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            reconnects: AtomicU64::new(0),
        });

        (client, rx)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Reconnects performed since start, scheduled or not
    pub fn reconnect_count(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Connects to the upstream, retrying with backoff, then starts the read
    /// loop and the reconnect scheduler in the background. Both stop when
    /// `cancel` fires or [`IngestClient::close`] is called.
    ///
    /// A failed connect leaves the client unstarted, so it may be retried.
    pub async fn connect(self: &Arc<Self>, cancel: &CancellationToken) -> Result<(), IngestError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(IngestError::AlreadyStarted);
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(IngestError::Cancelled),
            outcome = self.connect_with_retry() => outcome,
        };
        let ws = match outcome {
            Ok(ws) => ws,
            Err(err) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(err);
            }
        };

        // either the caller's token or close() stops everything
        let parent = cancel.clone();
        let done = self.done.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = parent.cancelled() => done.cancel(),
                _ = done.cancelled() => {}
            }
        });

        self.set_connected(true);
        info!(endpoint = %self.endpoint, "connected to upstream");

        tokio::spawn(self.clone().read_loop(ws));
        tokio::spawn(self.clone().reconnect_scheduler());

        Ok(())
    }

    /// Stops ingestion. Safe to call more than once.
    pub fn close(&self) {
        if !self.done.is_cancelled() {
            info!(endpoint = %self.endpoint, "closing ingestion client");
        }
        self.done.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.done.is_cancelled()
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
        INGEST_CONNECTED.set(i64::from(connected));
    }

    async fn connect_with_retry(&self) -> Result<WsStream, IngestError> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let handshake =
                tokio::time::timeout(self.handshake_timeout, connect_async(self.endpoint.as_str()));
            let outcome = tokio::select! {
                _ = self.done.cancelled() => return Err(IngestError::Cancelled),
                outcome = handshake => {
                    outcome.unwrap_or_else(|_| Err(handshake_timed_out(self.handshake_timeout)))
                }
            };

            match outcome {
                Ok((ws, _)) => return Ok(ws),
                Err(err) if attempt >= self.max_retries => {
                    error!(
                        endpoint = %self.endpoint,
                        attempts = attempt,
                        error = %err,
                        "giving up connecting to upstream"
                    );
                    return Err(IngestError::Connect { attempts: attempt, source: err });
                }
                Err(err) => {
                    let delay = self.backoff.delay(attempt - 1);
                    warn!(
                        endpoint = %self.endpoint,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "upstream connection failed, retrying"
                    );

                    tokio::select! {
                        _ = self.done.cancelled() => return Err(IngestError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Reconnects until it succeeds; `None` once cancelled.
    async fn reconnect(&self, cause: &'static str) -> Option<WsStream> {
        self.set_connected(false);

        loop {
            match self.connect_with_retry().await {
                Ok(ws) => {
                    self.set_connected(true);
                    self.discard_pending_rotation();
                    self.reconnects.fetch_add(1, Ordering::Relaxed);
                    INGEST_RECONNECTS.with_label_values(&[cause]).inc();
                    info!(endpoint = %self.endpoint, cause, "reconnected to upstream");
                    return Some(ws);
                }
                Err(IngestError::Cancelled) => return None,
                Err(err) => {
                    error!(endpoint = %self.endpoint, error = %err, "reconnect failed");
                    tokio::select! {
                        _ = self.done.cancelled() => return None,
                        _ = tokio::time::sleep(RECONNECT_PAUSE) => {}
                    }
                }
            }
        }
    }

    /// Drops a rotation request left over from while the connection was
    /// being replaced. Returns whether one was pending.
    fn discard_pending_rotation(&self) -> bool {
        self.rotate.notified().now_or_never().is_some()
    }

    async fn read_loop(self: Arc<Self>, mut ws: WsStream) {
        loop {
            let frame = tokio::select! {
                biased;
                _ = self.done.cancelled() => break,
                _ = self.rotate.notified() => {
                    debug!(endpoint = %self.endpoint, "rotating upstream connection");
                    let _ = ws.close(None).await;
                    match self.reconnect("scheduled").await {
                        Some(next) => ws = next,
                        None => break,
                    }
                    continue;
                }
                frame = ws.next() => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()),
                Some(Ok(Message::Close(_))) | None => {
                    warn!(endpoint = %self.endpoint, "upstream closed the connection");
                    match self.reconnect("read_error").await {
                        Some(next) => ws = next,
                        None => break,
                    }
                }
                Some(Err(err)) => {
                    warn!(endpoint = %self.endpoint, error = %err, "upstream read failed");
                    match self.reconnect("read_error").await {
                        Some(next) => ws = next,
                        None => break,
                    }
                }
                // binary, ping and pong frames
                Some(Ok(_)) => {}
            }
        }

        let _ = ws.close(None).await;
        self.set_connected(false);
        debug!(endpoint = %self.endpoint, "read loop stopped");
    }

    async fn reconnect_scheduler(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.done.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_interval) => self.rotate.notify_one(),
            }
        }
    }

    fn handle_text(&self, text: &str) {
        INGEST_MESSAGES_RECEIVED.inc();

        let event = match decode_frame(text, Utc::now(), &self.dedup, self.decoder.as_ref()) {
            Ok(event) => event,
            Err(discard) => {
                INGEST_EVENTS_DROPPED.with_label_values(&[discard.reason()]).inc();
                match discard {
                    Discard::MalformedEnvelope(_) | Discard::Malformed { .. } => {
                        warn!(reason = %discard, "discarding upstream frame")
                    }
                    _ => debug!(reason = %discard, "discarding upstream frame"),
                }
                return;
            }
        };

        let id = event.id().to_string();
        match self.events.try_send(event) {
            Ok(()) => {
                INGEST_EVENTS_PUBLISHED.inc();
                debug!(event_id = %id, "event published");
            }
            Err(TrySendError::Full(_)) => {
                INGEST_EVENTS_DROPPED.with_label_values(&["channel_full"]).inc();
                warn!(event_id = %id, "events channel full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(event_id = %id, "events channel closed, dropping event");
            }
        }
    }
}

fn handshake_timed_out(timeout: Duration) -> tungstenite::Error {
    tungstenite::Error::Io(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        format!("websocket handshake timed out after {}ms", timeout.as_millis()),
    ))
}

impl Drop for IngestClient {
    fn drop(&mut self) {
        self.done.cancel();
    }
}
