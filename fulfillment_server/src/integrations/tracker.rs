use fulfillment_engine::traits::{CollaboratorError, DeliveryTracker, TrackingSnapshot};
use log::*;
use serde::Serialize;

use crate::config::TrackerConfig;

/// HTTP client for the delivery-carrier tracking aggregator.
#[derive(Clone)]
pub struct HttpDeliveryTracker {
    client: reqwest::Client,
    config: TrackerConfig,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    carrier: &'a str,
    tracking_number: &'a str,
}

impl HttpDeliveryTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self { client: reqwest::Client::new(), config }
    }

    fn base_url(&self) -> Result<&str, CollaboratorError> {
        if self.config.base_url.is_empty() {
            Err(CollaboratorError::Unreachable("SFG_TRACKER_URL is not configured".to_string()))
        } else {
            Ok(self.config.base_url.trim_end_matches('/'))
        }
    }
}

impl DeliveryTracker for HttpDeliveryTracker {
    async fn track(&self, carrier: &str, tracking_number: &str) -> Result<TrackingSnapshot, CollaboratorError> {
        let url = format!("{}/v1/track/{carrier}/{tracking_number}", self.base_url()?);
        trace!("🚚️ Tracking lookup for {carrier}/{tracking_number}");
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.config.api_key.reveal())
            .send()
            .await
            .map_err(|e| CollaboratorError::Unreachable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(CollaboratorError::Rejected(format!("{}", response.status())));
        }
        let snapshot: TrackingSnapshot =
            response.json().await.map_err(|e| CollaboratorError::Rejected(e.to_string()))?;
        Ok(snapshot)
    }

    async fn register(&self, carrier: &str, tracking_number: &str) -> Result<(), CollaboratorError> {
        let url = format!("{}/v1/registrations", self.base_url()?);
        let body = RegisterRequest { carrier, tracking_number };
        debug!("🚚️ Registering shipment {carrier}/{tracking_number} for tracking");
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.reveal())
            .json(&body)
            .send()
            .await
            .map_err(|e| CollaboratorError::Unreachable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(CollaboratorError::Rejected(format!("{}", response.status())));
        }
        Ok(())
    }
}
