use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// The session's view of the connection: ordered text frames out, ordered
/// byte frames in. Swapping this for an in-memory fake is how the session
/// logic is tested without a server.
#[async_trait]
pub trait MessageTransport: Send {
    /// Send one control document, already serialized.
    async fn send_text(&mut self, payload: String) -> Result<()>;

    /// Receive the next frame. `None` means the peer closed the
    /// connection; `Some(Err(_))` means the transport itself failed.
    async fn next_frame(&mut self) -> Option<Result<Vec<u8>>>;

    /// Close the connection. Safe to call more than once.
    async fn close(&mut self) -> Result<()>;
}

/// WebSocket transport. The API key travels as a query parameter, so it is
/// appended after the endpoint is logged.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTransport {
    pub async fn connect(url: &str, api_key: &str) -> Result<Self> {
        info!("Connecting to {}", url);

        let separator = if url.contains('?') { '&' } else { '?' };
        let request = format!("{}{}key={}", url, separator, api_key);

        let (stream, _response) = connect_async(&request)
            .await
            .map_err(|e| Error::Transport(format!("websocket connect failed: {}", e)))?;

        info!("Connected");

        Ok(Self { stream })
    }
}

#[async_trait]
impl MessageTransport for WsTransport {
    async fn send_text(&mut self, payload: String) -> Result<()> {
        self.stream
            .send(Message::Text(payload))
            .await
            .map_err(|e| Error::Transport(format!("websocket send failed: {}", e)))
    }

    async fn next_frame(&mut self) -> Option<Result<Vec<u8>>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.into_bytes())),
                Ok(Message::Binary(bytes)) => return Some(Ok(bytes)),
                // Pongs are answered by the library while the stream is
                // being polled; neither direction surfaces to the session.
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
                Ok(Message::Close(frame)) => {
                    debug!("Peer sent close frame: {:?}", frame);
                    return None;
                }
                Ok(Message::Frame(_)) => continue,
                Err(e) => {
                    return Some(Err(Error::Transport(format!(
                        "websocket receive failed: {}",
                        e
                    ))))
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Err(e) = self.stream.close(None).await {
            // Closing an already-closed stream is not an error worth
            // surfacing during teardown.
            debug!("Close handshake did not complete cleanly: {}", e);
        }
        Ok(())
    }
}
