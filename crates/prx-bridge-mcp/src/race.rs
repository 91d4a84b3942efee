//! Bounds how long a synchronous caller waits for an origin call.
//!
//! The call runs on a tracked task and is never cancelled by the race. If the
//! budget elapses first the caller is told the result is pending, and the task
//! hands the eventual response to `deliver_late` instead.

use std::future::Future;
use std::time::Duration;

use prx_bridge_core::JsonRpcResponse;
use tokio::sync::oneshot;
use tokio_util::task::TaskTracker;

#[derive(Debug, Clone, PartialEq)]
pub enum RaceResult {
    /// The call finished within budget; the caller owns delivery.
    Settled(JsonRpcResponse),
    /// The budget won; the background task owns delivery.
    Pending,
    /// The call task died without producing a response.
    Lost,
}

pub async fn race<F, D, DF>(
    tasks: &TaskTracker,
    budget: Duration,
    call: F,
    deliver_late: D,
) -> RaceResult
where
    F: Future<Output = JsonRpcResponse> + Send + 'static,
    D: FnOnce(JsonRpcResponse) -> DF + Send + 'static,
    DF: Future<Output = ()> + Send + 'static,
{
    let (tx, mut rx) = oneshot::channel();
    drop(tasks.spawn(async move {
        let response = call.await;
        if let Err(response) = tx.send(response) {
            deliver_late(response).await;
        }
    }));

    tokio::select! {
        biased;
        settled = &mut rx => match settled {
            Ok(response) => RaceResult::Settled(response),
            Err(_) => RaceResult::Lost,
        },
        () = tokio::time::sleep(budget) => {
            // Closing first means exactly one side ends up owning the response:
            // either it is already buffered here, or the task's send now fails.
            rx.close();
            match rx.try_recv() {
                Ok(response) => RaceResult::Settled(response),
                Err(_) => RaceResult::Pending,
            }
        }
    }
}
