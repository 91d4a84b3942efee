use std::time::Duration;

use prx_bridge_origin::ProxyConfig;
use serde::{Deserialize, Serialize};

use crate::session::SessionSettings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub http_addr: String,
    /// Fallback origin when a request carries no `x-backend-url` header.
    pub backend_url: Option<String>,
    pub origin_path: String,
    pub proxy_timeout_ms: u64,
    pub race_timeout_ms: u64,
    pub heartbeat_ms: u64,
    pub stream_buffer: usize,
    pub session_idle_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:8788".to_string(),
            backend_url: None,
            origin_path: "/mcp".to_string(),
            proxy_timeout_ms: 90_000,
            race_timeout_ms: 1_000,
            heartbeat_ms: 45_000,
            stream_buffer: 64,
            session_idle_ms: 1_800_000,
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let number = |name: &str, default: u64, min: u64, max: u64| {
            text(name)
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default)
                .clamp(min, max)
        };
        Self {
            http_addr: text("PRX_BRIDGE_HTTP_ADDR").unwrap_or(defaults.http_addr),
            backend_url: text("PRX_BRIDGE_BACKEND_URL"),
            origin_path: text("PRX_BRIDGE_ORIGIN_PATH").unwrap_or(defaults.origin_path),
            proxy_timeout_ms: number(
                "PRX_BRIDGE_PROXY_TIMEOUT_MS",
                defaults.proxy_timeout_ms,
                100,
                600_000,
            ),
            race_timeout_ms: number(
                "PRX_BRIDGE_RACE_TIMEOUT_MS",
                defaults.race_timeout_ms,
                10,
                60_000,
            ),
            heartbeat_ms: number("PRX_BRIDGE_HEARTBEAT_MS", defaults.heartbeat_ms, 100, 600_000),
            stream_buffer: usize::try_from(number(
                "PRX_BRIDGE_STREAM_BUFFER",
                defaults.stream_buffer as u64,
                1,
                4_096,
            ))
            .unwrap_or(defaults.stream_buffer),
            session_idle_ms: number(
                "PRX_BRIDGE_SESSION_IDLE_MS",
                defaults.session_idle_ms,
                1_000,
                86_400_000,
            ),
        }
    }

    pub fn proxy_config(&self) -> ProxyConfig {
        ProxyConfig {
            origin_path: self.origin_path.clone(),
            deadline: Duration::from_millis(self.proxy_timeout_ms),
            ..ProxyConfig::default()
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            race_budget: Duration::from_millis(self.race_timeout_ms),
            heartbeat_interval: Duration::from_millis(self.heartbeat_ms),
            stream_buffer: self.stream_buffer,
        }
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_millis(self.session_idle_ms)
    }
}
