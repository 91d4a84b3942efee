//! Per-(profile, user) session actor owning one live client connection.
//!
//! States: idle (no connection), open (`ready` with a heartbeat running), and
//! closed again after [`SessionActor::cleanup`]. A new `open_stream` always
//! supersedes the previous connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use prx_bridge_core::protocol::{INTERNAL_ERROR, PARSE_ERROR};
use prx_bridge_core::{
    reshape_result, translate_request, ClientProfile, JsonRpcRequest, JsonRpcResponse, Translation,
};
use prx_bridge_origin::{BackendProxy, OriginTarget};
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::heartbeat::{run_heartbeat, HeartbeatHandle, HeartbeatResult};
use crate::race::{race, RaceResult};
use crate::stream::{Connection, Frame, FrameStream};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub profile: ClientProfile,
    pub user_id: String,
}

impl SessionKey {
    pub fn new(profile: ClientProfile, user_id: impl Into<String>) -> Self {
        Self {
            profile,
            user_id: user_id.into(),
        }
    }

    /// Path clients POST their calls to, announced in the `endpoint` frame.
    pub fn endpoint_path(&self) -> String {
        format!("/mcp/{}/messages/{}", self.profile, self.user_id)
    }
}

/// Identity the router lifts out of request metadata.
#[derive(Debug, Clone, Default)]
pub struct SessionHeaders {
    pub backend_url: Option<String>,
    pub client_profile: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub key: SessionKey,
    pub backend_url: String,
}

impl SessionHeaders {
    pub fn new(
        backend_url: Option<String>,
        client_profile: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            backend_url,
            client_profile: Some(client_profile.into()),
            user_id: Some(user_id.into()),
        }
    }

    pub fn identity(&self) -> Result<SessionIdentity, SessionError> {
        let backend_url = required(self.backend_url.as_deref(), "backend_url")?;
        let profile = self
            .client_profile
            .as_deref()
            .and_then(ClientProfile::parse)
            .ok_or_else(|| SessionError::Config("missing required header: client_profile".into()))?;
        let user_id = required(self.user_id.as_deref(), "user_id")?;
        Ok(SessionIdentity {
            key: SessionKey::new(profile, user_id),
            backend_url,
        })
    }
}

fn required(value: Option<&str>, name: &str) -> Result<String, SessionError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| SessionError::Config(format!("missing required header: {name}")))
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no live stream for this session")]
    NotReady,
}

/// Synchronous reply to `submit_message`.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The response has already been written to the stream.
    Delivered,
    /// The response will follow on the stream.
    Processing,
    /// Notification forwarded; nothing will be streamed.
    Accepted,
    /// The body was not a usable call; the error envelope was also streamed.
    Rejected(JsonRpcResponse),
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub race_budget: Duration,
    pub heartbeat_interval: Duration,
    pub stream_buffer: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            race_budget: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(45),
            stream_buffer: 64,
        }
    }
}

#[derive(Default)]
struct ActorState {
    backend_url: Option<String>,
    connection: Option<Arc<Connection>>,
    ready: bool,
    heartbeat: Option<HeartbeatHandle>,
}

impl ActorState {
    /// Tears down whatever is live. Returns the closed connection id, if any.
    fn teardown(&mut self) -> Option<u64> {
        self.ready = false;
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.stop();
        }
        let connection = self.connection.take()?;
        connection.close();
        Some(connection.id())
    }
}

pub struct SessionActor {
    key: SessionKey,
    settings: SessionSettings,
    proxy: BackendProxy,
    state: Mutex<ActorState>,
    tasks: TaskTracker,
    next_connection_id: AtomicU64,
    last_activity: Mutex<Instant>,
}

impl SessionActor {
    pub fn new(key: SessionKey, settings: SessionSettings, proxy: BackendProxy) -> Self {
        Self {
            key,
            settings,
            proxy,
            state: Mutex::new(ActorState::default()),
            tasks: TaskTracker::new(),
            next_connection_id: AtomicU64::new(1),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn is_ready(&self) -> bool {
        let state = self.state.lock();
        state.ready && state.connection.as_ref().is_some_and(|c| !c.is_closed())
    }

    pub fn connection_id(&self) -> Option<u64> {
        self.state.lock().connection.as_ref().map(|c| c.id())
    }

    /// Origin base URL recorded by the last `open_stream`.
    pub fn backend_url(&self) -> Option<String> {
        self.state.lock().backend_url.clone()
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Stop token of the heartbeat bound to the live connection.
    pub fn heartbeat_token(&self) -> Option<CancellationToken> {
        self.state.lock().heartbeat.as_ref().map(HeartbeatHandle::cancel_token)
    }

    /// Background deliveries still running.
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub(crate) fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    fn check_key(&self, identity: &SessionIdentity) -> Result<(), SessionError> {
        if identity.key == self.key {
            Ok(())
        } else {
            Err(SessionError::Config(format!(
                "session key mismatch: actor serves {}/{}",
                self.key.profile, self.key.user_id
            )))
        }
    }

    pub async fn open_stream(
        self: &Arc<Self>,
        headers: &SessionHeaders,
    ) -> Result<FrameStream, SessionError> {
        let identity = headers.identity()?;
        self.check_key(&identity)?;
        self.touch();

        // The previous connection and heartbeat must be gone before the new
        // endpoint frame exists.
        self.cleanup();

        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let (connection, frames) = Connection::open(connection_id, self.settings.stream_buffer);
        let connection = Arc::new(connection);
        connection
            .write(Frame::Endpoint(self.key.endpoint_path()))
            .await
            .map_err(|_| SessionError::NotReady)?;
        let heartbeat = self.spawn_heartbeat(&connection);

        let superseded = {
            let mut state = self.state.lock();
            // A concurrent open may have installed itself meanwhile; last one wins.
            let superseded = state.teardown();
            state.connection = Some(connection);
            state.heartbeat = Some(heartbeat);
            state.backend_url = Some(identity.backend_url);
            state.ready = true;
            superseded
        };
        if let Some(old) = superseded {
            debug!(connection_id = old, "superseded by concurrent open");
        }
        info!(
            profile = %self.key.profile,
            user_id = %self.key.user_id,
            connection_id,
            "stream opened"
        );

        let actor = Arc::downgrade(self);
        Ok(frames.on_disconnect(move || {
            if let Some(actor) = actor.upgrade() {
                actor.release(connection_id);
            }
        }))
    }

    fn spawn_heartbeat(self: &Arc<Self>, connection: &Arc<Connection>) -> HeartbeatHandle {
        let cancel = connection.closed_token().child_token();
        let token = cancel.clone();
        let actor: Weak<Self> = Arc::downgrade(self);
        let connection = connection.clone();
        let interval = self.settings.heartbeat_interval;
        let task = tokio::spawn(async move {
            let result = run_heartbeat(connection.clone(), interval, token).await;
            if result == HeartbeatResult::WriteFailed {
                if let Some(actor) = actor.upgrade() {
                    warn!(connection_id = connection.id(), "heartbeat failed, closing stream");
                    actor.release(connection.id());
                }
            }
        });
        HeartbeatHandle::new(cancel, task)
    }

    /// Closes the live connection and heartbeat. Idempotent.
    pub fn cleanup(&self) {
        let closed = self.state.lock().teardown();
        if let Some(connection_id) = closed {
            info!(
                profile = %self.key.profile,
                user_id = %self.key.user_id,
                connection_id,
                "stream closed"
            );
        }
    }

    /// Cleanup scoped to one connection; a no-op once it has been replaced.
    pub fn release(&self, connection_id: u64) {
        let closed = {
            let mut state = self.state.lock();
            if state.connection.as_ref().map(|c| c.id()) != Some(connection_id) {
                return;
            }
            state.teardown()
        };
        if closed.is_some() {
            info!(
                profile = %self.key.profile,
                user_id = %self.key.user_id,
                connection_id,
                "stream released"
            );
        }
    }

    fn live_connection(&self) -> Result<Arc<Connection>, SessionError> {
        let state = self.state.lock();
        match state.connection.as_ref() {
            Some(connection) if state.ready && !connection.is_closed() => Ok(connection.clone()),
            _ => Err(SessionError::NotReady),
        }
    }

    /// Entry point for raw request bodies. A body that is not UTF-8 is a
    /// malformed call, never repaired.
    pub async fn submit_bytes(
        self: &Arc<Self>,
        headers: &SessionHeaders,
        body: &[u8],
    ) -> Result<SubmitOutcome, SessionError> {
        match std::str::from_utf8(body) {
            Ok(text) => self.submit_message(headers, text).await,
            Err(err) => {
                let identity = headers.identity()?;
                self.check_key(&identity)?;
                let connection = self.live_connection()?;
                self.touch();
                let rejection = JsonRpcResponse::error(
                    Value::Null,
                    PARSE_ERROR,
                    format!("parse error: body is not valid UTF-8: {err}"),
                );
                self.deliver(&connection, &rejection).await?;
                Ok(SubmitOutcome::Rejected(rejection))
            }
        }
    }

    pub async fn submit_message(
        self: &Arc<Self>,
        headers: &SessionHeaders,
        body: &str,
    ) -> Result<SubmitOutcome, SessionError> {
        let identity = headers.identity()?;
        self.check_key(&identity)?;
        let connection = self.live_connection()?;
        self.touch();

        let request = match JsonRpcRequest::parse(body) {
            Ok(v) => v,
            Err(rejection) => {
                debug!(user_id = %self.key.user_id, "rejecting malformed call");
                self.deliver(&connection, &rejection).await?;
                return Ok(SubmitOutcome::Rejected(rejection));
            }
        };

        let (request, reshape) = match translate_request(&self.key.profile, request) {
            Translation::Answer(response) => {
                self.deliver(&connection, &response).await?;
                return Ok(SubmitOutcome::Delivered);
            }
            Translation::Forward { request, reshape } => (request, reshape),
        };

        let target = OriginTarget::new(
            identity.backend_url,
            self.key.user_id.clone(),
            self.key.profile.as_str(),
        );
        let proxy = self.proxy.clone();
        // Untranslated calls travel as the client wrote them.
        let raw_body = reshape.is_none().then(|| body.to_string());

        let Some(request_id) = request.id.clone() else {
            let method = request.method.clone();
            drop(self.tasks.spawn(async move {
                let response = match raw_body {
                    Some(raw) => proxy.forward_raw(&target, &method, raw, Value::Null).await,
                    None => proxy.forward(&target, &request, Value::Null).await,
                };
                if let Some(err) = response.error {
                    warn!(%method, code = err.code, message = %err.message, "notification failed at origin");
                }
            }));
            return Ok(SubmitOutcome::Accepted);
        };

        let call = {
            let request_id = request_id.clone();
            async move {
                let response = match raw_body {
                    Some(raw) => {
                        proxy
                            .forward_raw(&target, &request.method, raw, request_id)
                            .await
                    }
                    None => proxy.forward(&target, &request, request_id).await,
                };
                match reshape {
                    Some(shape) => reshape_result(&shape, response),
                    None => response,
                }
            }
        };
        let actor = Arc::clone(self);
        let late_connection = connection.clone();
        let deliver_late = move |response: JsonRpcResponse| async move {
            actor.deliver_late(&late_connection, &response).await;
        };

        match race(&self.tasks, self.settings.race_budget, call, deliver_late).await {
            RaceResult::Settled(response) => {
                self.deliver(&connection, &response).await?;
                Ok(SubmitOutcome::Delivered)
            }
            RaceResult::Pending => {
                debug!(user_id = %self.key.user_id, id = %request_id, "origin slow, answering processing");
                Ok(SubmitOutcome::Processing)
            }
            RaceResult::Lost => {
                let response =
                    JsonRpcResponse::error(request_id, INTERNAL_ERROR, "proxy task aborted");
                self.deliver(&connection, &response).await?;
                Ok(SubmitOutcome::Delivered)
            }
        }
    }

    async fn deliver(
        &self,
        connection: &Connection,
        response: &JsonRpcResponse,
    ) -> Result<(), SessionError> {
        if let Err(err) = connection.write(Frame::message(response)).await {
            warn!(connection_id = connection.id(), error = %err, "stream write failed");
            self.release(connection.id());
            return Err(SessionError::NotReady);
        }
        Ok(())
    }

    /// Late results are bound to the connection that issued the call. If that
    /// connection is gone the result is logged and dropped.
    async fn deliver_late(&self, connection: &Connection, response: &JsonRpcResponse) {
        if let Err(err) = connection.write(Frame::message(response)).await {
            warn!(
                connection_id = connection.id(),
                id = %response.id,
                error = %err,
                "dropping late result, stream is gone"
            );
            self.release(connection.id());
        }
    }

    /// Waits up to `timeout` for detached deliveries. Returns `false` if some
    /// were still running when it gave up.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tasks.close();
        let drained = tokio::time::timeout(timeout, self.tasks.wait()).await.is_ok();
        self.tasks.reopen();
        drained
    }
}
