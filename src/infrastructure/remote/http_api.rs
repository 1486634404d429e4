use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::application::ports::remote_api::{RemoteApi, RemoteResponse};
use crate::domain::action::ActionKind;
use crate::shared::config::RemoteConfig;
use crate::shared::error::{AppError, Result};

/// HTTP adapter for the remote authority. One POST per domain command; a
/// bounded GET against the health endpoint for reachability.
pub struct HttpRemoteApi {
    client: Client,
    probe_client: Client,
    base_url: String,
    probe_url: String,
}

impl HttpRemoteApi {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Network(e.to_string()))?;
        // Separate client so the probe timeout stays tight regardless of the
        // request timeout.
        let probe_client = Client::builder()
            .timeout(Duration::from_secs(config.probe_timeout_secs))
            .build()
            .map_err(|e| AppError::Network(e.to_string()))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        let probe_url = format!("{}/{}", base_url, config.probe_path.trim_start_matches('/'));

        Ok(Self {
            client,
            probe_client,
            base_url,
            probe_url,
        })
    }

    fn endpoint_url(&self, kind: ActionKind) -> String {
        format!("{}/{}", self.base_url, kind.endpoint())
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn submit(&self, kind: ActionKind, payload: Value) -> Result<RemoteResponse> {
        let url = self.endpoint_url(kind);
        let response = self.client.post(&url).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Rejected(format!("{url} returned HTTP {status}")));
        }

        let body: Value = response.json().await?;
        Ok(RemoteResponse::from_value(body))
    }

    async fn probe(&self) -> bool {
        match self.probe_client.get(&self.probe_url).send().await {
            Ok(response) => {
                let reachable = response.status().is_success();
                debug!(url = %self.probe_url, reachable, "reachability probe");
                reachable
            }
            Err(err) => {
                debug!(url = %self.probe_url, error = %err, "reachability probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::config::AppConfig;

    #[test]
    fn endpoint_urls_follow_kind_mapping() {
        let mut cfg = AppConfig::default().remote;
        cfg.base_url = "http://gate.example/api/".to_string();
        let api = HttpRemoteApi::new(&cfg).unwrap();

        assert_eq!(
            api.endpoint_url(ActionKind::Checkin),
            "http://gate.example/api/checkin"
        );
        assert_eq!(
            api.endpoint_url(ActionKind::VisitorCreate),
            "http://gate.example/api/visitors"
        );
        assert_eq!(
            api.endpoint_url(ActionKind::VisitorUpdate),
            "http://gate.example/api/visitors"
        );
        assert_eq!(
            api.endpoint_url(ActionKind::PreRegistration),
            "http://gate.example/api/pre-registrations"
        );
        assert_eq!(api.probe_url, "http://gate.example/api/health");
    }

    #[tokio::test]
    async fn probe_against_unreachable_host_reads_offline() {
        let mut cfg = AppConfig::default().remote;
        // Reserved TEST-NET address; connection refused or timeout either way.
        cfg.base_url = "http://192.0.2.1:9".to_string();
        cfg.probe_timeout_secs = 1;
        let api = HttpRemoteApi::new(&cfg).unwrap();

        assert!(!api.probe().await);
    }
}
