//! Periodic keep-alive frames tied to one connection's lifetime.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::stream::{Connection, Frame};

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// A keep-alive could not be written; the connection is dead.
    WriteFailed,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Emit a keep-alive every `interval` until cancelled or a write fails.
///
/// The first frame goes out one full `interval` after start.
pub async fn run_heartbeat(
    connection: Arc<Connection>,
    interval: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
            _ = ticker.tick() => {
                if let Err(err) = connection.write(Frame::Heartbeat).await {
                    debug!(connection_id = connection.id(), error = %err, "heartbeat write failed");
                    return HeartbeatResult::WriteFailed;
                }
            }
        }
    }
}

/// Running heartbeat task plus the token that stops it.
#[derive(Debug)]
pub struct HeartbeatHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    pub fn new(cancel: CancellationToken, task: JoinHandle<()>) -> Self {
        Self { cancel, task }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled() || self.task.is_finished()
    }
}
