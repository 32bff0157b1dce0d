//! Opens the realtime AI connection for a call.

use super::link::Link;
use crate::config::{Config, Provider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_tungstenite::{connect_async, tungstenite::client::IntoClientRequest};
use tracing::info;

/// Opens one realtime AI link per call.
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    async fn connect(&self) -> Result<Link>;
}

/// Connects to an OpenAI-protocol realtime endpoint, either OpenAI itself or
/// an Azure OpenAI deployment.
pub struct RealtimeEndpoint {
    url: String,
    api_key: String,
    provider: Provider,
}

impl RealtimeEndpoint {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, provider: Provider) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            provider,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.realtime_url.clone(),
            config.realtime_api_key.clone(),
            config.provider.clone(),
        )
    }
}

#[async_trait]
impl RealtimeConnector for RealtimeEndpoint {
    async fn connect(&self) -> Result<Link> {
        let mut request = self.url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        match self.provider {
            Provider::OpenAI => {
                headers.insert("Authorization", format!("Bearer {}", self.api_key).parse()?);
                headers.insert("OpenAI-Beta", "realtime=v1".parse()?);
            }
            Provider::Azure => {
                headers.insert("api-key", self.api_key.parse()?);
            }
        }

        let (ws_stream, _) = connect_async(request)
            .await
            .with_context(|| format!("Failed to connect to realtime endpoint {:?}", self.provider))?;
        info!(provider = ?self.provider, "Connected to realtime endpoint.");
        Ok(Link::from_tungstenite(ws_stream))
    }
}
