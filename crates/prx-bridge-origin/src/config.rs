use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpOriginConfig {
    pub connect_timeout: Duration,
    pub user_header: String,
    pub profile_header: String,
}

impl Default for HttpOriginConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            user_header: "x-user-id".to_string(),
            profile_header: "x-client-name".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub origin_path: String,
    pub deadline: Duration,
    pub body_preview_chars: usize,
}

impl ProxyConfig {
    pub fn new(deadline: Duration) -> Self {
        Self {
            deadline,
            ..Self::default()
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            origin_path: "/mcp".to_string(),
            deadline: Duration::from_secs(90),
            body_preview_chars: 500,
        }
    }
}
