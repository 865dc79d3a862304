//! JSON webhook notifier (Slack-compatible `text` field plus the raw anomaly).

use super::{summary_line, NotifyError, Notifier};
use crate::detect::Anomaly;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

pub struct WebhookNotifier {
    client: Client,
    url: String,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: String,
    anomaly: &'a Anomaly,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, anomaly: &Anomaly) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            text: summary_line(anomaly),
            anomaly,
        };

        let response = self.client.post(&self.url).json(&payload).send().await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}
