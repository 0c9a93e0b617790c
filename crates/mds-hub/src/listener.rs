//! TCP accept loop that upgrades connections and starts sessions.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{WebSocketStream, accept_hdr_async_with_config};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::hub::HubHandle;
use crate::session::{SessionConfig, run_session};

/// Upgrade request header naming the connection.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Complete the WebSocket handshake. The connection id comes from the
/// `X-Client-Id` header when present and non-empty, otherwise a fresh UUID.
///
/// Inbound messages and frames longer than `max_message_size` bytes fail the
/// read with a capacity error instead of being buffered.
pub async fn accept_connection<S>(
    stream: S,
    max_message_size: usize,
) -> Result<(WebSocketStream<S>, String), WsError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut requested: Option<String> = None;
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        requested = request
            .headers()
            .get(CLIENT_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        Ok(response)
    };

    let limits = WebSocketConfig::default()
        .max_message_size(Some(max_message_size))
        .max_frame_size(Some(max_message_size));
    let ws = accept_hdr_async_with_config(stream, callback, Some(limits)).await?;
    let id = requested.unwrap_or_else(|| Uuid::new_v4().to_string());
    Ok((ws, id))
}

/// Accept connections until `shutdown` flips to `true` or its sender is
/// dropped. Each connection runs in its own task.
pub async fn serve(
    listener: TcpListener,
    hub: HubHandle,
    config: SessionConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    match listener.local_addr() {
        Ok(addr) => info!("[listener] accepting on ws://{addr}"),
        Err(e) => warn!("[listener] local address unknown: {e}"),
    }

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("[listener] accept failed: {e}");
                    continue;
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("[listener] shutting down");
                    return;
                }
                continue;
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("[listener] set_nodelay failed for {peer}: {e}");
        }

        let hub = hub.clone();
        let config = config.clone();
        tokio::spawn(async move {
            match accept_connection(stream, config.max_message_size).await {
                Ok((ws, id)) => {
                    info!("[listener] {peer} connected as {id}");
                    run_session(ws, id, hub, config).await;
                }
                Err(e) => warn!("[listener] handshake with {peer} failed: {e}"),
            }
        });
    }
}
