//! Outbound push channel for one live client connection.
//!
//! Every write enqueues a whole [`Frame`] on a bounded channel drained by the
//! SSE response, so concurrent writers can never interleave partial frames.

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::response::sse::Event;
use futures::{Stream, StreamExt};
use prx_bridge_core::JsonRpcResponse;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Announces where the client must POST its calls.
    Endpoint(String),
    /// A call-response or error envelope.
    Message(Value),
    /// Transport keep-alive with no call payload.
    Heartbeat,
}

impl Frame {
    pub fn message(response: &JsonRpcResponse) -> Self {
        Self::Message(response.to_value())
    }

    pub fn name(&self) -> Option<&'static str> {
        match self {
            Self::Endpoint(_) => Some("endpoint"),
            Self::Message(_) => Some("message"),
            Self::Heartbeat => None,
        }
    }

    /// SSE wire text for this frame.
    pub fn encode(&self) -> String {
        match self {
            Self::Endpoint(path) => format!("event: endpoint\ndata: {path}\n\n"),
            Self::Message(payload) => format!("event: message\ndata: {payload}\n\n"),
            Self::Heartbeat => ": ping\n\n".to_string(),
        }
    }

    pub fn into_event(self) -> Event {
        match self {
            Self::Endpoint(path) => Event::default().event("endpoint").data(path),
            Self::Message(payload) => Event::default().event("message").data(payload.to_string()),
            Self::Heartbeat => Event::default().comment("ping"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("connection already closed")]
    Closed,
    #[error("stream consumer went away")]
    ConsumerGone,
}

/// Write half of a live connection.
#[derive(Debug)]
pub struct Connection {
    id: u64,
    tx: mpsc::Sender<Frame>,
    closed: CancellationToken,
}

impl Connection {
    pub fn open(id: u64, buffer: usize) -> (Self, FrameStream) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let closed = CancellationToken::new();
        let frames = ReceiverStream::new(rx).take_until(closed.clone().cancelled_owned());
        let connection = Self { id, tx, closed };
        (connection, FrameStream::new(frames))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }

    pub async fn write(&self, frame: Frame) -> Result<(), StreamError> {
        if self.closed.is_cancelled() {
            return Err(StreamError::Closed);
        }
        tokio::select! {
            biased;
            () = self.closed.cancelled() => Err(StreamError::Closed),
            sent = self.tx.send(frame) => sent.map_err(|_| StreamError::ConsumerGone),
        }
    }

    /// Ends the stream for the consumer. Safe to call more than once.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }
}

type DisconnectHook = Box<dyn FnOnce() + Send>;

/// Read half handed to the HTTP layer; runs its hook when dropped.
pub struct FrameStream {
    inner: Pin<Box<dyn Stream<Item = Frame> + Send>>,
    on_drop: Option<DisconnectHook>,
}

impl FrameStream {
    fn new(inner: impl Stream<Item = Frame> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(inner),
            on_drop: None,
        }
    }

    pub fn on_disconnect(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_drop = Some(Box::new(hook));
        self
    }
}

impl Stream for FrameStream {
    type Item = Frame;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Frame>> {
        self.get_mut().inner.as_mut().poll_next(cx)
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        if let Some(hook) = self.on_drop.take() {
            hook();
        }
    }
}
