use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use futures::{SinkExt, StreamExt};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::broadcast,
};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::debug;

#[derive(Debug, Clone)]
enum Command {
    Frame(String),
    Binary(Vec<u8>),
    Disconnect,
}

/// WebSocket server standing in for the upstream feed. Frames are pushed
/// to every open connection.
pub struct MockUpstream {
    addr: SocketAddr,
    connections: AtomicU64,
    open: AtomicU64,
    commands: broadcast::Sender<Command>,
}

impl MockUpstream {
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Connections accepted since start
    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::SeqCst)
    }

    /// Connections currently open
    pub fn open_connections(&self) -> u64 {
        self.open.load(Ordering::SeqCst)
    }

    pub fn send_text(&self, frame: impl Into<String>) {
        let _ = self.commands.send(Command::Frame(frame.into()));
    }

    pub fn send_binary(&self, data: Vec<u8>) {
        let _ = self.commands.send(Command::Binary(data));
    }

    /// Closes every open connection from the server side.
    pub fn disconnect_all(&self) {
        let _ = self.commands.send(Command::Disconnect);
    }
}

pub async fn start_mock_upstream() -> eyre::Result<Arc<MockUpstream>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let (commands, _) = broadcast::channel(64);

    let upstream = Arc::new(MockUpstream {
        addr: listener.local_addr()?,
        connections: AtomicU64::new(0),
        open: AtomicU64::new(0),
        commands,
    });

    let server = upstream.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_connection(server.clone(), stream));
        }
    });

    Ok(upstream)
}

async fn serve_connection(upstream: Arc<MockUpstream>, stream: TcpStream) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };

    // subscribe before the connection is counted so no frame is missed
    let mut commands = upstream.commands.subscribe();
    upstream.open.fetch_add(1, Ordering::SeqCst);
    upstream.connections.fetch_add(1, Ordering::SeqCst);
    debug!(connections = upstream.connections(), "mock upstream accepted connection");

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Ok(Command::Frame(text)) => {
                    if ws.send(Message::text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(Command::Binary(data)) => {
                    if ws.send(Message::binary(data)).await.is_err() {
                        break;
                    }
                }
                Ok(Command::Disconnect) | Err(_) => {
                    let _ = ws.close(None).await;
                    break;
                }
            },
            incoming = ws.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    upstream.open.fetch_sub(1, Ordering::SeqCst);
}
