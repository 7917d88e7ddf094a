//! [`SessionTransport`] over an axum WebSocket.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};

use rag_chat_core::models::StreamEvent;
use rag_chat_core::session::{Inbound, SessionTransport, TransportError};

/// One upgraded `/ws/chat` connection.
pub struct WsTransport {
    socket: WebSocket,
}

impl WsTransport {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl SessionTransport for WsTransport {
    async fn recv(&mut self) -> Result<Inbound, TransportError> {
        loop {
            let inbound = match self.socket.recv().await {
                Some(Ok(Message::Text(text))) => Inbound::Text(text.as_str().to_owned()),
                Some(Ok(Message::Binary(bytes))) => {
                    Inbound::Text(String::from_utf8_lossy(&bytes).into_owned())
                }
                // axum answers pings itself.
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => Inbound::Closed,
                Some(Err(_)) => return Err(TransportError::Disconnected),
            };
            return Ok(inbound);
        }
    }

    async fn send(&mut self, event: &StreamEvent) -> Result<(), TransportError> {
        let text =
            serde_json::to_string(event).map_err(|e| TransportError::Other(e.to_string()))?;
        self.socket
            .send(Message::Text(text.into()))
            .await
            .map_err(|_| TransportError::Disconnected)
    }
}
