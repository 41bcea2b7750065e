use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tracing::{debug, error, info, warn};

use super::actor::{SessionCommand, SessionHandle, session_actor};
use super::messages::ClientEvent;
use super::types::{ConnId, Outbound};

pub const DEFAULT_PORT: u16 = 3000;
const PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Canned reply for plain HTTP requests hitting the listener: a liveness
/// body plus the permissive CORS headers browser clients expect.
const PLAIN_HTTP_RESPONSE: &str = "HTTP/1.1 200 OK\r\n\
    Content-Type: text/plain\r\n\
    Access-Control-Allow-Origin: *\r\n\
    Access-Control-Allow-Headers: X-Requested-With\r\n\
    Access-Control-Allow-Methods: PUT,POST,GET,DELETE,OPTIONS\r\n\
    Content-Length: 11\r\n\
    Connection: close\r\n\
    \r\n\
    hello world";

pub struct SignalingServer {
    listener: TcpListener,
    handle: SessionHandle,
}

impl SignalingServer {
    /// Bind the listener and spawn the session actor.
    pub async fn bind(addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let (tx, rx) = mpsc::channel::<SessionCommand>(1024);
        tokio::spawn(session_actor(rx));

        info!("signaling server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            handle: SessionHandle { tx },
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> std::io::Result<()> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            let handle = self.handle.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, handle).await {
                    error!("connection error from {}: {}", addr, e);
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    handle: SessionHandle,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if !sniff_websocket_upgrade(&stream).await? {
        return serve_plain_http(stream, addr).await;
    }

    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let conn = ConnId::generate();
    info!("websocket connection from {} as {}", addr, conn);

    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    handle.connected(conn, tx).await;

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    let mut waiting_for_pong = false;
    let mut pong_deadline: Option<tokio::time::Instant> = None;

    loop {
        let pong_timeout = async {
            match pong_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = ping_interval.tick() => {
                if waiting_for_pong {
                    warn!("no pong received, disconnecting {}", conn);
                    break;
                }
                if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                waiting_for_pong = true;
                pong_deadline = Some(tokio::time::Instant::now() + PONG_TIMEOUT);
                debug!("ping sent to {}", conn);
            }

            _ = pong_timeout => {
                warn!("pong timeout, disconnecting {}", conn);
                break;
            }

            outbound = rx.recv() => {
                match outbound {
                    Some(Outbound::Event(msg)) => {
                        if ws_tx.send(Message::Text(msg.into_inner())).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Close) => {
                        info!("force-closing {}", conn);
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                    None => break,
                }
            }

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        warn!("websocket error: {}", e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => {
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => handle.event(conn, event).await,
                            Err(e) => debug!("ignoring unparseable frame from {}: {}", conn, e),
                        }
                    }
                    Message::Pong(_) => {
                        waiting_for_pong = false;
                        pong_deadline = None;
                        debug!("pong received from {}", conn);
                    }
                    Message::Close(_) => {
                        info!("close received from {}", conn);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    handle.disconnected(conn).await;
    info!("websocket disconnected: {}", conn);

    Ok(())
}

/// Peek at the request head to tell WebSocket upgrades apart from plain HTTP
/// requests (health checks, CORS preflight). Only the first segment is
/// examined.
async fn sniff_websocket_upgrade(stream: &TcpStream) -> std::io::Result<bool> {
    let mut buf = [0u8; 1024];
    let n = stream.peek(&mut buf).await?;
    let head = String::from_utf8_lossy(&buf[..n]).to_ascii_lowercase();
    Ok(head.contains("upgrade: websocket"))
}

async fn serve_plain_http(
    mut stream: TcpStream,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    debug!("plain http request from {}", addr);
    stream.write_all(PLAIN_HTTP_RESPONSE.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}
