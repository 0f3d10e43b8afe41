//! Builder for transport clients with telemetry
//!
//! ```rust,no_run
//! use triggerware_rpc::ClientBuilder;
//!
//! # async fn example() -> triggerware_core::Result<()> {
//! let client = ClientBuilder::new()
//!     .with_default_observability()
//!     .service_name("tweet-monitor")
//!     .connect("localhost", 5221)
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::{ClientMetrics, RpcClient};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use triggerware_core::{Error, ObservabilityConfig, Result};

/// Configures an [`RpcClient`] before it connects
#[derive(Debug, Default)]
pub struct ClientBuilder {
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize OpenTelemetry with this configuration and record transport metrics
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Overrides the service name of the observability config
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Build a disconnected client
    pub fn build(self) -> Result<RpcClient> {
        let metrics = match self.observability_config {
            Some(mut config) => {
                if let Some(name) = self.service_name {
                    config.service_name = name;
                }

                triggerware_core::init_observability(config.clone()).map_err(|e| {
                    Error::internal(format!("Failed to initialize observability: {}", e))
                })?;

                Some(Arc::new(ClientMetrics::new(config.service_name)))
            }
            None => None,
        };

        Ok(RpcClient::with_metrics(metrics))
    }

    /// Build and connect over TCP
    pub async fn connect(self, host: &str, port: u16) -> Result<RpcClient> {
        let client = self.build()?;
        client.connect(host, port).await?;
        Ok(client)
    }

    /// Build and run over an already-open stream
    pub async fn attach<S>(self, stream: S) -> Result<RpcClient>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let client = self.build()?;
        client.attach(stream).await?;
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConnectionState;

    #[test]
    fn test_builder_defaults() {
        let builder = ClientBuilder::new();
        assert!(builder.observability_config.is_none());
        assert!(builder.service_name.is_none());
    }

    #[test]
    fn test_builder_observability_fields() {
        let builder = ClientBuilder::new()
            .with_observability(ObservabilityConfig::new("configured").with_traces(false))
            .service_name("override");

        let config = builder.observability_config.as_ref().unwrap();
        assert_eq!(config.service_name, "configured");
        assert!(!config.enable_traces);
        assert_eq!(builder.service_name.as_deref(), Some("override"));
    }

    #[tokio::test]
    async fn test_build_without_observability_is_disconnected() {
        let client = ClientBuilder::new().build().unwrap();
        assert_eq!(client.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_attach_connects() {
        let (local, _remote) = tokio::io::duplex(1024);
        let client = ClientBuilder::new().attach(local).await.unwrap();
        assert!(client.is_connected().await);
        client.close().await;
    }
}
