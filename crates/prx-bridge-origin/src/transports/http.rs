use reqwest::Client;
use reqwest::header::CONTENT_TYPE;

use crate::config::HttpOriginConfig;
use crate::error::OriginError;
use crate::traits::OriginTransport;
use crate::types::{OriginReply, OriginRequest};

#[derive(Clone)]
pub struct HttpOriginTransport {
    config: HttpOriginConfig,
    client: Client,
}

impl HttpOriginTransport {
    pub fn new(config: HttpOriginConfig) -> Result<Self, OriginError> {
        if config.user_header.trim().is_empty() || config.profile_header.trim().is_empty() {
            return Err(OriginError::Config(
                "identity header names must not be empty".to_string(),
            ));
        }
        // No request timeout here: the proxy deadline owns cancellation.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait::async_trait]
impl OriginTransport for HttpOriginTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn send(&self, request: OriginRequest) -> Result<OriginReply, OriginError> {
        let res = self
            .client
            .post(&request.url)
            .header(CONTENT_TYPE, "application/json")
            .header(self.config.user_header.as_str(), request.user_id.as_str())
            .header(
                self.config.profile_header.as_str(),
                request.client_profile.as_str(),
            )
            .body(request.body)
            .send()
            .await?;

        let status = res.status().as_u16();
        let body = res.text().await?;
        Ok(OriginReply { status, body })
    }
}
