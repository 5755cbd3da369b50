//! WebSocket transport to the conversation service.

use std::io::ErrorKind;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

use crate::dispatch::EventDispatcher;

/// Why a connection ended without an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Local shutdown was requested.
    Cancelled,
    /// The server sent a close frame (with its reason text, if any).
    Closed(Option<String>),
    /// The socket ended without a close frame (or the peer reset it).
    StreamEnded,
}

/// Connect to `url` and dispatch every text frame until the connection ends or `cancel` fires.
///
/// `wss://` URLs connect over rustls with the webpki root store.
pub async fn run_connection(
    url: &str,
    dispatcher: &EventDispatcher,
    cancel: &CancellationToken,
) -> Result<DisconnectReason> {
    tracing::info!(url, "connecting");
    let (ws, _response) = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(DisconnectReason::Cancelled),
        res = tokio_tungstenite::connect_async(url) => res.with_context(|| format!("connect {url}"))?,
    };
    tracing::info!(url, "connected");

    let (mut write, mut read) = ws.split();
    let reason = loop {
        let msg = tokio::select! {
            biased;
            _ = cancel.cancelled() => break DisconnectReason::Cancelled,
            msg = read.next() => msg,
        };
        match msg {
            None => break DisconnectReason::StreamEnded,
            Some(Err(e)) if is_abrupt_end(&e) => {
                tracing::debug!("socket ended without close handshake: {e}");
                break DisconnectReason::StreamEnded;
            }
            Some(Err(e)) => return Err(e).context("websocket read"),
            Some(Ok(Message::Text(text))) => handle_text_frame(dispatcher, &text),
            Some(Ok(Message::Binary(bytes))) => {
                tracing::debug!(len = bytes.len(), "binary frame ignored");
            }
            Some(Ok(Message::Close(frame))) => {
                break DisconnectReason::Closed(frame.map(|f| f.reason.to_string()));
            }
            Some(Ok(_)) => {}
        }
    };

    if reason == DisconnectReason::Cancelled {
        if let Err(e) = write.send(Message::Close(None)).await {
            tracing::debug!("close frame not sent: {e}");
        }
    }
    Ok(reason)
}

fn handle_text_frame(dispatcher: &EventDispatcher, text: &str) {
    if let Err(e) = dispatcher.handle_text(text) {
        tracing::warn!(len = text.len(), "ignoring malformed event: {e:#}");
    }
}

fn is_abrupt_end(err: &WsError) -> bool {
    match err {
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => true,
        WsError::Io(io) => matches!(
            io.kind(),
            ErrorKind::ConnectionReset | ErrorKind::UnexpectedEof
        ),
        _ => false,
    }
}
