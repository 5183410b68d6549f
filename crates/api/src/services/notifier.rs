//! Operator alerts delivered to a webhook.

use std::time::Duration;

use domain::services::{AlertKind, AlertPayload, Notifier};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::NotifierConfig;

#[derive(Debug, Serialize)]
struct WebhookBody<'a> {
    kind: AlertKind,
    #[serde(flatten)]
    payload: &'a AlertPayload,
}

/// Posts each alert as JSON to the configured operator webhook.
///
/// Delivery failures are logged and dropped.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(config: &NotifierConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            url: config.webhook_url.clone(),
        })
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, kind: AlertKind, payload: AlertPayload) {
        let body = WebhookBody {
            kind,
            payload: &payload,
        };

        match self.client.post(&self.url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(alert = %kind, "Alert delivered");
            }
            Ok(response) => {
                warn!(
                    alert = %kind,
                    status = response.status().as_u16(),
                    summary = %payload.summary,
                    "Alert webhook rejected delivery"
                );
            }
            Err(e) => {
                warn!(
                    alert = %kind,
                    error = %e,
                    summary = %payload.summary,
                    "Alert webhook unreachable"
                );
            }
        }
    }
}
