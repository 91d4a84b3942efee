//! HTTP surface: routes requests to the session actor for their key.

use std::convert::Infallible;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::{Stream, StreamExt};
use prx_bridge_origin::{
    BackendProxy, HttpOriginConfig, HttpOriginTransport, OriginError, OriginTransport,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::BridgeConfig;
use crate::registry::SessionRegistry;
use crate::session::{SessionError, SessionHeaders, SubmitOutcome};
use crate::stream::Frame;

const BACKEND_URL_HEADER: &str = "x-backend-url";
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub config: Arc<BridgeConfig>,
}

impl AppState {
    fn session_headers(&self, headers: &HeaderMap, profile: String, user: String) -> SessionHeaders {
        let backend_url = headers
            .get(BACKEND_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
            .or_else(|| self.config.backend_url.clone());
        SessionHeaders::new(backend_url, profile, user)
    }
}

pub struct BridgeServer {
    config: Arc<BridgeConfig>,
    registry: Arc<SessionRegistry>,
    shutdown: CancellationToken,
}

impl BridgeServer {
    pub fn new(config: BridgeConfig, transport: Arc<dyn OriginTransport>) -> Self {
        let proxy = BackendProxy::new(transport, config.proxy_config());
        let registry = SessionRegistry::new(proxy, config.session_settings());
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn from_config(config: BridgeConfig) -> Result<Self, OriginError> {
        let transport = HttpOriginTransport::new(HttpOriginConfig::default())?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            config: self.config.clone(),
        };

        Router::new()
            .route("/health", get(health_handler).fallback(method_not_allowed))
            .route(
                "/mcp/{profile}/sse/{user}",
                get(open_stream_handler).fallback(method_not_allowed),
            )
            .route(
                "/mcp/{profile}/messages/{user}",
                post(submit_message_handler).fallback(method_not_allowed),
            )
            .fallback(not_found)
            .with_state(state)
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn serve(self) -> io::Result<()> {
        let listener = TcpListener::bind(&self.config.http_addr).await?;
        self.serve_on(listener).await
    }

    pub async fn serve_on(self, listener: TcpListener) -> io::Result<()> {
        info!(addr = %listener.local_addr()?, "prx-bridge http listening");
        let sweeper = tokio::spawn(sweep_idle(
            self.registry.clone(),
            self.config.session_idle(),
            self.shutdown.clone(),
        ));

        let registry = self.registry.clone();
        let token = self.shutdown.clone();
        // Open SSE responses never finish on their own, so streams are closed
        // before the server waits for in-flight requests.
        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                token.cancelled().await;
                registry.close_all();
            })
            .await;

        self.shutdown.cancel();
        let _ = sweeper.await;
        self.registry.shutdown(SHUTDOWN_DRAIN).await;
        info!("prx-bridge http stopped");
        result
    }
}

async fn sweep_idle(registry: Arc<SessionRegistry>, max_idle: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval((max_idle / 4).max(Duration::from_secs(1)));
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {
                let _ = registry.evict_idle(max_idle);
            }
        }
    }
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            SessionError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error"),
            SessionError::NotReady => (StatusCode::REQUEST_TIMEOUT, "not_ready"),
        };
        (
            status,
            Json(json!({"error": code, "message": self.to_string()})),
        )
            .into_response()
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({"status": "ok", "sessions": state.registry.len()}))
}

async fn open_stream_handler(
    State(state): State<AppState>,
    Path((profile, user)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, SessionError> {
    let headers = state.session_headers(&headers, profile, user);
    let identity = headers.identity()?;
    let actor = state.registry.get_or_create(&identity.key);
    let frames = actor.open_stream(&headers).await?;
    Ok(Sse::new(
        frames.map(|frame: Frame| Ok::<_, Infallible>(frame.into_event())),
    ))
}

async fn submit_message_handler(
    State(state): State<AppState>,
    Path((profile, user)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, SessionError> {
    let headers = state.session_headers(&headers, profile, user);
    let identity = headers.identity()?;
    let Some(actor) = state.registry.get(&identity.key) else {
        debug!(user_id = %identity.key.user_id, "submit before any stream was opened");
        return Err(SessionError::NotReady);
    };
    let outcome = actor.submit_bytes(&headers, &body).await?;

    let response = match outcome {
        SubmitOutcome::Delivered => (StatusCode::OK, Json(json!({"status": "ok"}))).into_response(),
        SubmitOutcome::Processing => {
            (StatusCode::OK, Json(json!({"status": "processing"}))).into_response()
        }
        SubmitOutcome::Accepted => {
            (StatusCode::ACCEPTED, Json(json!({"status": "accepted"}))).into_response()
        }
        SubmitOutcome::Rejected(rejection) => {
            (StatusCode::OK, Json(rejection.to_value())).into_response()
        }
    };
    Ok(response)
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "error": "method_not_allowed",
            "message": "supported endpoints: GET /health, GET /mcp/{profile}/sse/{user}, POST /mcp/{profile}/messages/{user}"
        })),
    )
        .into_response()
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": "not_found", "message": "unknown path"})),
    )
        .into_response()
}
