//! NATS notifier: publishes alert events as JSON
//!
//! Events go to `<subject_prefix>.<kind>` on core NATS. Delivery is
//! at-most-once, which matches the fire-and-forget alert contract.

use super::{AlertEvent, Notifier};
use crate::error::{GovernanceError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// NATS notifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NatsNotifierConfig {
    /// NATS server URL
    pub url: String,

    /// Subject prefix, events publish to `<prefix>.<kind>`
    pub subject_prefix: String,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// Authentication token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for NatsNotifierConfig {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            subject_prefix: "governance.alerts".to_string(),
            connect_timeout_secs: 5,
            token: None,
        }
    }
}

impl NatsNotifierConfig {
    /// Subject for an event
    pub fn subject_for(&self, event: &AlertEvent) -> String {
        format!("{}.{}", self.subject_prefix, event.kind())
    }
}

/// Notifier backed by a NATS connection
pub struct NatsNotifier {
    client: async_nats::Client,
    config: NatsNotifierConfig,
}

impl NatsNotifier {
    /// Connect to the configured server
    pub async fn connect(config: NatsNotifierConfig) -> Result<Self> {
        let mut opts = async_nats::ConnectOptions::new()
            .connection_timeout(Duration::from_secs(config.connect_timeout_secs));

        if let Some(ref token) = config.token {
            opts = opts.token(token.clone());
        }

        let client = opts
            .connect(&config.url)
            .await
            .map_err(|e| GovernanceError::Notification(format!("{}: {}", config.url, e)))?;

        tracing::info!(url = %config.url, prefix = %config.subject_prefix, "Connected to NATS");

        Ok(Self { client, config })
    }

    /// Underlying client, e.g. to subscribe in tests
    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }

    pub fn config(&self) -> &NatsNotifierConfig {
        &self.config
    }
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn notify(&self, event: &AlertEvent) -> Result<()> {
        let subject = self.config.subject_for(event);
        let payload = Bytes::from(serde_json::to_vec(event)?);

        self.client
            .publish(subject.clone(), payload)
            .await
            .map_err(|e| {
                GovernanceError::Notification(format!("publish to {} failed: {}", subject, e))
            })?;
        self.client
            .flush()
            .await
            .map_err(|e| GovernanceError::Notification(format!("flush failed: {}", e)))?;

        tracing::debug!(subject = %subject, "Alert published");
        Ok(())
    }

    fn name(&self) -> &str {
        "nats"
    }
}
