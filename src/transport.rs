use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use crate::reconnect::ABNORMAL_CLOSE;

/// What the link yields when read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// The link is gone. Carries the peer's close code, or
    /// [`ABNORMAL_CLOSE`] when it dropped without one.
    Closed(u16),
}

/// Opens links to the push-update endpoint.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self, url: &str) -> Result<Box<dyn TransportLink>>;
}

/// One open connection. Owned by the client driver only.
#[async_trait]
pub trait TransportLink: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Keepalive. Links without a ping concept may ignore it.
    async fn ping(&mut self) -> Result<()> {
        Ok(())
    }

    /// Next inbound frame. Must be cancel-safe.
    async fn next_frame(&mut self) -> Frame;

    async fn close(&mut self, code: u16);
}

/// WebSocket transport over `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &str) -> Result<Box<dyn TransportLink>> {
        let (stream, response) = connect_async(url)
            .await
            .with_context(|| format!("failed to connect to {url}"))?;
        debug!(status = %response.status(), "WebSocket handshake complete");
        Ok(Box::new(WsLink { stream }))
    }
}

struct WsLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl TransportLink for WsLink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .context("failed to send frame")
    }

    async fn ping(&mut self) -> Result<()> {
        self.stream
            .send(Message::Ping(Vec::new().into()))
            .await
            .context("failed to send ping")
    }

    async fn next_frame(&mut self) -> Frame {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Frame::Text(text.as_str().to_owned()),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Frame::Text(text),
                    Err(_) => debug!("Ignoring non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let code = frame
                        .map(|f| u16::from(f.code))
                        .unwrap_or(ABNORMAL_CLOSE);
                    return Frame::Closed(code);
                }
                // tungstenite answers pings itself
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    debug!(error = %e, "WebSocket read error");
                    return Frame::Closed(ABNORMAL_CLOSE);
                }
                None => return Frame::Closed(ABNORMAL_CLOSE),
            }
        }
    }

    async fn close(&mut self, code: u16) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: "".into(),
        };
        if let Err(e) = self.stream.close(Some(frame)).await {
            debug!(error = %e, "Error while closing WebSocket");
        }
    }
}
