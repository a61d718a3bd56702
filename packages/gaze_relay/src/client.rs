//! Minimal WebSocket client for the relay protocol.
//!
//! Used by `gaze-relay query` and the integration tests.

use anyhow::{Context, Result, bail};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite};

use crate::ws::{Command, Response};

pub struct RelayClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl RelayClient {
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .with_context(|| format!("failed to connect to {}", url))?;
        Ok(Self { stream })
    }

    pub async fn request(&mut self, command: Command) -> Result<Response> {
        let text = serde_json::to_string(&command)?;
        self.send_text(&text).await
    }

    /// Send an arbitrary text frame and wait for the reply.
    pub async fn send_text(&mut self, text: &str) -> Result<Response> {
        self.stream
            .send(tungstenite::Message::Text(text.into()))
            .await
            .context("failed to send request")?;
        self.next_response().await
    }

    /// Wait for the next response, skipping control frames.
    pub async fn next_response(&mut self) -> Result<Response> {
        while let Some(msg) = self.stream.next().await {
            match msg.context("connection error")? {
                tungstenite::Message::Text(text) => {
                    return serde_json::from_str(text.as_str())
                        .with_context(|| format!("unexpected reply: {}", text.as_str()));
                }
                tungstenite::Message::Close(frame) => {
                    bail!("relay closed the connection: {:?}", frame)
                }
                _ => continue,
            }
        }
        bail!("relay closed the connection")
    }

    pub async fn close(mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}
