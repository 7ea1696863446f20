use crate::error::TransportError;
use crate::traits::{HttpReply, Transport};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::Client;
use std::time::Duration;
use tracing::trace;

/// HTTPS transport authenticated with a static bearer token
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
    token: String,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, token: String, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("reeltrend/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError(format!("failed to construct HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }
}

/// Retry-After in its delta-seconds form; HTTP dates are ignored
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, endpoint: &str, query: &[(String, String)]) -> Result<HttpReply, TransportError> {
        let url = format!("{}{}", self.base_url, endpoint);
        trace!(url = %url, ?query, "GET");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json")
            .query(query)
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response
            .text()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        Ok(HttpReply {
            status,
            retry_after,
            body,
        })
    }
}
