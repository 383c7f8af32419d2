//! Gateway-info endpoint
//!
//! Resolves the gateway URL and the recommended shard count.

use crate::error::GatewayError;
use async_trait::async_trait;
use serde::Deserialize;

/// Response of `GET /gateway/bot`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayInfo {
    pub url: String,
    /// Recommended shard count
    #[serde(default = "default_shards")]
    pub shards: u32,
}

fn default_shards() -> u32 {
    1
}

/// Source of gateway URL and shard count
#[async_trait]
pub trait GatewayInfoProvider: Send + Sync + 'static {
    async fn gateway_info(&self) -> Result<GatewayInfo, GatewayError>;
}

/// Queries the REST API
#[derive(Clone)]
pub struct HttpGatewayInfo {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl HttpGatewayInfo {
    #[must_use]
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into(),
            token: token.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/gateway/bot", self.api_base.trim_end_matches('/'))
    }
}

impl std::fmt::Debug for HttpGatewayInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGatewayInfo")
            .field("api_base", &self.api_base)
            .finish()
    }
}

#[async_trait]
impl GatewayInfoProvider for HttpGatewayInfo {
    async fn gateway_info(&self) -> Result<GatewayInfo, GatewayError> {
        let resp = self
            .http
            .get(self.endpoint())
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(GatewayError::InvalidToken);
        }

        let info: GatewayInfo = resp.error_for_status()?.json().await?;
        tracing::debug!(url = %info.url, shards = info.shards, "Fetched gateway info");
        Ok(info)
    }
}

/// Fixed answer, for deployments that pin both URL and shard count
#[derive(Debug, Clone)]
pub struct StaticGatewayInfo(pub GatewayInfo);

#[async_trait]
impl GatewayInfoProvider for StaticGatewayInfo {
    async fn gateway_info(&self) -> Result<GatewayInfo, GatewayError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gateway_info() {
        let info: GatewayInfo =
            serde_json::from_str(r#"{"url":"wss://gateway.example.com","shards":3}"#).unwrap();
        assert_eq!(info.shards, 3);

        let info: GatewayInfo = serde_json::from_str(r#"{"url":"wss://gateway.example.com"}"#).unwrap();
        assert_eq!(info.shards, 1);
    }

    #[test]
    fn test_endpoint() {
        let info = HttpGatewayInfo::new("https://api.example.com/v6/", "tok");
        assert_eq!(info.endpoint(), "https://api.example.com/v6/gateway/bot");
        assert!(!format!("{info:?}").contains("tok"));
    }

    #[tokio::test]
    async fn test_static_info() {
        let provider = StaticGatewayInfo(GatewayInfo {
            url: "wss://gw".into(),
            shards: 2,
        });
        assert_eq!(provider.gateway_info().await.unwrap().shards, 2);
    }
}
