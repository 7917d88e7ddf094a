//! Persistent chat sessions.
//!
//! A session is one long-lived client connection serving any number of
//! sequential question/answer turns. [`SessionHandler::run`] owns the
//! receive → classify → dispatch loop; the wire itself is abstracted behind
//! [`SessionTransport`] so the loop runs unchanged over a WebSocket or an
//! in-memory fake.
//!
//! Messages are handled strictly in arrival order. A turn's event stream is
//! forwarded to completion before the next inbound frame is read, and a
//! disconnect observed while forwarding drops the stream (and with it the
//! provider connection) immediately.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::StreamExt;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::RagError;
use crate::models::{ClientMessage, StreamEvent};
use crate::query::QueryEngine;

pub const INVALID_MESSAGE_FORMAT: &str = "Invalid message format";
pub const NO_MESSAGE_PROVIDED: &str = "No message provided";
pub const NO_DOCUMENTS_ADVISORY: &str =
    "No documents uploaded yet. Please upload documents first to use RAG features.";

/// Unique handle of a live session.
pub type SessionId = Uuid;

/// Set of live sessions. Only used for connection-count logging.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    live: Mutex<HashSet<SessionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned set is still a valid set.
    fn live(&self) -> MutexGuard<'_, HashSet<SessionId>> {
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new session and return its handle.
    pub fn connect(&self) -> SessionId {
        let id = Uuid::new_v4();
        let total = {
            let mut live = self.live();
            live.insert(id);
            live.len()
        };
        info!(session = %id, total, "client connected");
        id
    }

    /// Deregister `id`. Returns false if it was not registered.
    pub fn disconnect(&self, id: &SessionId) -> bool {
        let (removed, total) = {
            let mut live = self.live();
            let removed = live.remove(id);
            (removed, live.len())
        };
        if removed {
            info!(session = %id, total, "client disconnected");
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.live().len()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.live().contains(id)
    }
}

/// One inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    /// The peer closed the connection cleanly.
    Closed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection is gone. Ends the session; not an application error.
    #[error("client disconnected")]
    Disconnected,
    #[error("transport error: {0}")]
    Other(String),
}

/// Bidirectional message channel for one session.
#[async_trait]
pub trait SessionTransport: Send {
    async fn recv(&mut self) -> Result<Inbound, TransportError>;

    async fn send(&mut self, event: &StreamEvent) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closed,
}

/// Drives sessions against the shared [`QueryEngine`].
#[derive(Clone)]
pub struct SessionHandler {
    engine: Arc<QueryEngine>,
    registry: Arc<ConnectionRegistry>,
}

impl SessionHandler {
    pub fn new(engine: Arc<QueryEngine>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { engine, registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Serve one connection until the client goes away.
    ///
    /// The session is registered on entry and deregistered on exit, however
    /// the loop ends.
    pub async fn run<T: SessionTransport>(&self, mut transport: T) {
        let id = self.registry.connect();
        let mut state = SessionState::Open;

        while state == SessionState::Open {
            state = match transport.recv().await {
                Ok(Inbound::Text(frame)) => self.turn(&id, &frame, &mut transport).await,
                Ok(Inbound::Closed) | Err(TransportError::Disconnected) => SessionState::Closed,
                Err(TransportError::Other(reason)) => {
                    warn!(session = %id, error = %reason, "receive failed");
                    report(&mut transport, RagError::Protocol(reason).to_string()).await
                }
            };
        }

        self.registry.disconnect(&id);
    }

    /// Handle one inbound frame and return the resulting session state.
    async fn turn<T: SessionTransport>(
        &self,
        id: &SessionId,
        frame: &str,
        transport: &mut T,
    ) -> SessionState {
        match self.dispatch(id, frame, transport).await {
            Ok(()) => SessionState::Open,
            Err(TransportError::Disconnected) => SessionState::Closed,
            Err(TransportError::Other(reason)) => {
                warn!(session = %id, error = %reason, "turn failed");
                report(transport, reason).await
            }
        }
    }

    async fn dispatch<T: SessionTransport>(
        &self,
        id: &SessionId,
        frame: &str,
        transport: &mut T,
    ) -> Result<(), TransportError> {
        let message: ClientMessage = match serde_json::from_str(frame) {
            Ok(message) => message,
            Err(err) => {
                debug!(session = %id, error = %err, "malformed frame");
                return transport
                    .send(&StreamEvent::Error(INVALID_MESSAGE_FORMAT.to_string()))
                    .await;
            }
        };

        if message.is_ping() {
            return transport.send(&StreamEvent::Pong).await;
        }

        let Some(question) = message.question() else {
            return transport
                .send(&StreamEvent::Error(NO_MESSAGE_PROVIDED.to_string()))
                .await;
        };

        match self.engine.index().count().await {
            Ok(0) => {
                return transport
                    .send(&StreamEvent::Info(NO_DOCUMENTS_ADVISORY.to_string()))
                    .await;
            }
            Ok(_) => {}
            Err(err) => {
                let err = RagError::retrieval(err);
                warn!(session = %id, error = %err, "index unavailable");
                return transport.send(&StreamEvent::Error(err.to_string())).await;
            }
        }

        debug!(session = %id, question = %question, "answering");
        let mut events = self.engine.answer_stream(question);
        while let Some(event) = events.next().await {
            transport.send(&event).await?;
        }
        Ok(())
    }
}

/// Best-effort error event after a failed turn. The session stays open
/// unless the attempt itself finds the client gone.
async fn report<T: SessionTransport>(transport: &mut T, message: String) -> SessionState {
    match transport.send(&StreamEvent::Error(message)).await {
        Err(TransportError::Disconnected) => SessionState::Closed,
        _ => SessionState::Open,
    }
}
