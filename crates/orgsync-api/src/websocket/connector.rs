// ── Link establishment ──
//
// A `Connector` opens one text-frame link to the server. The channel
// drives the Engine.IO / Socket.IO session over whatever link it gets,
// so the reconnection logic never touches sockets directly.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;

const LINK_BUFFER: usize = 64;

/// One open, bidirectional stream of text frames.
///
/// The inbound side ends when the remote closes or errors. Dropping
/// `outbound` closes the connection from our side.
pub struct Link {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<String>,
}

impl Link {
    /// Create a link and the peer ends used to drive it: frames sent on
    /// `outbound` arrive at the returned receiver, and the returned sender
    /// feeds `inbound`.
    pub fn pair() -> (Self, mpsc::Receiver<String>, mpsc::Sender<String>) {
        let (out_tx, out_rx) = mpsc::channel(LINK_BUFFER);
        let (in_tx, in_rx) = mpsc::channel(LINK_BUFFER);
        (
            Self {
                outbound: out_tx,
                inbound: in_rx,
            },
            out_rx,
            in_tx,
        )
    }
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self) -> Result<Link, Error>;
}

// ── WebSocket connector ──────────────────────────────────────────────

/// Opens Engine.IO WebSocket-transport links with `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: Url,
}

impl WsConnector {
    /// Derive the Engine.IO endpoint from the server origin:
    /// `http(s)://host[:port]` becomes
    /// `ws(s)://host[:port]/socket.io/?EIO=4&transport=websocket`.
    pub fn new(server: &Url) -> Result<Self, Error> {
        let mut url = server.clone();
        let scheme = match server.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|()| Error::WebSocketConnect(format!("cannot use {server} as a socket URL")))?;
        url.set_path("/socket.io/");
        url.set_query(Some("EIO=4&transport=websocket"));
        url.set_fragment(None);
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self) -> Result<Link, Error> {
        debug!(url = %self.url, "opening WebSocket");
        let (ws_stream, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();
        let (link, mut out_rx, in_tx) = Link::pair();

        // Writer: forward outbound frames until the link owner drops its sender.
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = write.send(Message::text(text)).await {
                    debug!(error = %e, "WebSocket write failed");
                    return;
                }
            }
            let _ = write.close().await;
        });

        // Reader: forward text frames until the socket or the link owner goes away.
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(text.as_str().to_owned()).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "WebSocket close frame received");
                        break;
                    }
                    Ok(_) => trace!("ignoring non-text WebSocket frame"),
                    Err(e) => {
                        debug!(error = %e, "WebSocket read failed");
                        break;
                    }
                }
            }
        });

        Ok(link)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn socket_url_from_http_origin() {
        let c = WsConnector::new(&Url::parse("http://localhost:3000").unwrap()).unwrap();
        assert_eq!(
            c.url().as_str(),
            "ws://localhost:3000/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn socket_url_from_https_origin_drops_path() {
        let c = WsConnector::new(&Url::parse("https://office.example.com/app#x").unwrap()).unwrap();
        assert_eq!(
            c.url().as_str(),
            "wss://office.example.com/socket.io/?EIO=4&transport=websocket"
        );
    }
}
