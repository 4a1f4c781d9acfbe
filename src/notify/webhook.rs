use super::{EmailMessage, Notification, Notifier};
use crate::error::NotifyError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Posts notifications and emails as JSON to HTTP endpoints
pub struct WebhookNotifier {
    client: reqwest::Client,
    event_url: Option<String>,
    email_url: Option<String>,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(event_url: Option<String>, email_url: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            event_url,
            email_url,
            timeout,
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<(), NotifyError> {
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, user_id: &str, notification: &Notification) -> Result<(), NotifyError> {
        let Some(url) = &self.event_url else {
            debug!("No event endpoint, skipping notification for {}", user_id);
            return Ok(());
        };
        let body = json!({ "userId": user_id, "notification": notification });
        self.post(url, &body).await
    }

    async fn email(&self, user_id: &str, message: &EmailMessage) -> Result<(), NotifyError> {
        let Some(url) = &self.email_url else {
            debug!("No email endpoint, skipping email for {}", user_id);
            return Ok(());
        };
        let body = json!({ "userId": user_id, "email": message });
        self.post(url, &body).await
    }
}
