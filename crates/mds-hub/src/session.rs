//! Per-connection read and write loops.
//!
//! A session registers with the hub, then runs two loops over the split
//! WebSocket:
//!
//! - **read**: parses client requests and forwards them to the hub. A read
//!   deadline of `pong_wait` is refreshed by every pong; expiry, a transport
//!   error, a close frame or an oversized frame ends the session.
//! - **write**: drains the mailbox one text frame per message and sends a
//!   ping every `ping_interval`. Each write is bounded by `write_wait`. When
//!   the hub closes the mailbox the writer sends a close frame and exits.
//!
//! Whichever loop ends first, the session unregisters from the hub exactly
//! once and waits for the writer to finish.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use mds_core::config::HubConfig;
use mds_core::time_util::now_ms;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout, timeout_at};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::error::{CapacityError, Error as WsError};
use tracing::{debug, info, warn};

use crate::hub::HubHandle;
use crate::protocol::{AckKind, ClientRequest, encode_ack, encode_pong, parse_client_message};

/// Per-connection limits and timings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub mailbox_size: usize,
    pub ping_interval: Duration,
    pub pong_wait: Duration,
    pub write_wait: Duration,
    pub max_message_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&HubConfig::default())
    }
}

impl From<&HubConfig> for SessionConfig {
    fn from(config: &HubConfig) -> Self {
        Self {
            mailbox_size: config.effective_mailbox_size(),
            ping_interval: config.ping_interval(),
            pong_wait: config.pong_wait(),
            write_wait: config.write_wait(),
            max_message_size: config.effective_max_message_size(),
        }
    }
}

/// Why the read loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    ClientClosed,
    PongTimeout,
    Oversized(usize),
    Transport(String),
    WriterStopped,
    Rejected(String),
}

/// Drive one connection until it ends. Returns the reason.
pub async fn run_session<S>(
    ws: WebSocketStream<S>,
    id: String,
    hub: HubHandle,
    config: SessionConfig,
) -> SessionEnd
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let label = format!("session-{id}");
    let (mailbox_tx, mailbox_rx) = mpsc::channel::<Arc<str>>(config.mailbox_size.max(1));

    let (mut sink, stream) = ws.split();
    if let Err(e) = hub.register(id.clone(), mailbox_tx).await {
        warn!("[{label}] registration rejected: {e}");
        let _ = timeout(config.write_wait, sink.send(Message::Close(None))).await;
        return SessionEnd::Rejected(e.to_string());
    }
    info!("[{label}] registered");

    let mut writer = tokio::spawn(write_loop(
        sink,
        mailbox_rx,
        config.ping_interval,
        config.write_wait,
        label.clone(),
    ));

    let end = tokio::select! {
        end = read_loop(stream, &id, &hub, &config, &label) => end,
        _ = &mut writer => SessionEnd::WriterStopped,
    };

    hub.unregister(id.clone());
    if !writer.is_finished() {
        // The hub drops the mailbox on unregister, so the writer sends a
        // close frame and exits within one write timeout.
        if let Err(e) = writer.await {
            warn!("[{label}] writer task failed: {e}");
        }
    }

    info!("[{label}] closed: {end:?}");
    end
}

async fn read_loop<S>(
    mut stream: SplitStream<WebSocketStream<S>>,
    id: &str,
    hub: &HubHandle,
    config: &SessionConfig,
    label: &str,
) -> SessionEnd
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut deadline = Instant::now() + config.pong_wait;

    loop {
        let frame = match timeout_at(deadline, stream.next()).await {
            Err(_) => {
                warn!("[{label}] no pong within {:?}", config.pong_wait);
                return SessionEnd::PongTimeout;
            }
            Ok(None) => return SessionEnd::ClientClosed,
            Ok(Some(Err(WsError::Capacity(CapacityError::MessageTooLong { size, max_size })))) => {
                warn!("[{label}] frame of {size} bytes exceeds limit of {max_size}");
                return SessionEnd::Oversized(size);
            }
            Ok(Some(Err(e))) => {
                debug!("[{label}] read error: {e}");
                return SessionEnd::Transport(e.to_string());
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => {
                if text.len() > config.max_message_size {
                    warn!("[{label}] frame of {} bytes exceeds limit", text.len());
                    return SessionEnd::Oversized(text.len());
                }
                handle_request(&text, id, hub, label);
            }
            Message::Binary(data) => {
                if data.len() > config.max_message_size {
                    warn!("[{label}] frame of {} bytes exceeds limit", data.len());
                    return SessionEnd::Oversized(data.len());
                }
                debug!("[{label}] ignoring binary frame");
            }
            Message::Pong(_) => deadline = Instant::now() + config.pong_wait,
            Message::Close(_) => return SessionEnd::ClientClosed,
            // Pings are answered by tungstenite itself.
            _ => {}
        }
    }
}

fn handle_request(text: &str, id: &str, hub: &HubHandle, label: &str) {
    match parse_client_message(text) {
        Ok(ClientRequest::Subscribe(symbol)) => {
            hub.subscribe(id, symbol.as_str());
            hub.send_to(id, encode_ack(AckKind::Subscribed, &symbol, now_ms()));
        }
        Ok(ClientRequest::Unsubscribe(symbol)) => {
            hub.unsubscribe(id, symbol.as_str());
            hub.send_to(id, encode_ack(AckKind::Unsubscribed, &symbol, now_ms()));
        }
        Ok(ClientRequest::Ping) => hub.send_to(id, encode_pong(now_ms())),
        Ok(ClientRequest::Ignored(reason)) => warn!("[{label}] ignored message: {reason}"),
        Err(e) => warn!("[{label}] unparseable message: {e}"),
    }
}

async fn write_loop<S>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut mailbox: mpsc::Receiver<Arc<str>>,
    ping_interval: Duration,
    write_wait: Duration,
    label: String,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut ping = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);

    loop {
        let frame = tokio::select! {
            message = mailbox.recv() => match message {
                Some(text) => Message::Text(text.to_string().into()),
                None => {
                    let _ = timeout(write_wait, sink.send(Message::Close(None))).await;
                    debug!("[{label}] mailbox closed");
                    return;
                }
            },
            _ = ping.tick() => Message::Ping(Vec::new().into()),
        };

        match timeout(write_wait, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("[{label}] write error: {e}");
                return;
            }
            Err(_) => {
                warn!("[{label}] write timed out after {write_wait:?}");
                return;
            }
        }
    }
}
