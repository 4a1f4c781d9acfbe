//! Success notifications: one real-time event plus one email per applied plan
//!
//! Delivery is best effort. By the time anything is sent the plan is already
//! committed, so every failure here ends as a warn log.

mod webhook;

pub use webhook::WebhookNotifier;

use crate::apply::ApplyResult;
use crate::config::NotifyConfig;
use crate::error::NotifyError;
use crate::model::Goal;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Success,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub goal_id: String,
    pub created_ids: Vec<String>,
    pub updated_ids: Vec<String>,
    pub archived_ids: Vec<String>,
}

impl Notification {
    pub fn plan_updated(goal: &Goal, result: &ApplyResult) -> Self {
        Self {
            title: "Your plan was updated".to_string(),
            message: format!(
                "\"{}\": {} new, {} rescheduled, {} archived",
                goal.title,
                result.created_ids.len(),
                result.updated_ids.len(),
                result.archived_ids.len()
            ),
            kind: NotificationType::Success,
            goal_id: goal.id.clone(),
            created_ids: result.created_ids.clone(),
            updated_ids: result.updated_ids.clone(),
            archived_ids: result.archived_ids.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
    pub subject: String,
    pub goal_title: String,
    pub dashboard_link: String,
}

impl EmailMessage {
    pub fn plan_updated(goal: &Goal, dashboard_url: &str) -> Self {
        Self {
            subject: format!("Your plan for \"{}\" has been updated", goal.title),
            goal_title: goal.title.clone(),
            dashboard_link: format!(
                "{}?goal={}",
                dashboard_url.trim_end_matches('/'),
                goal.id
            ),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: &str, notification: &Notification) -> Result<(), NotifyError>;

    async fn email(&self, user_id: &str, message: &EmailMessage) -> Result<(), NotifyError>;
}

/// Stand-in used when no endpoint is configured
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, user_id: &str, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            "Notify {} about goal {}: {}",
            user_id, notification.goal_id, notification.message
        );
        Ok(())
    }

    async fn email(&self, user_id: &str, message: &EmailMessage) -> Result<(), NotifyError> {
        info!("Email {}: {} ({})", user_id, message.subject, message.dashboard_link);
        Ok(())
    }
}

pub fn create_notifier(config: &NotifyConfig) -> Arc<dyn Notifier> {
    if config.event_url.is_none() && config.email_url.is_none() {
        return Arc::new(LogNotifier);
    }
    Arc::new(WebhookNotifier::new(
        config.event_url.clone(),
        config.email_url.clone(),
        std::time::Duration::from_secs(config.timeout_sec),
    ))
}

/// Send the event and the email for one applied plan. Never fails.
pub async fn fan_out(
    notifier: &dyn Notifier,
    goal: &Goal,
    result: &ApplyResult,
    dashboard_url: &str,
) {
    let notification = Notification::plan_updated(goal, result);
    if let Err(e) = notifier.notify(&goal.user_id, &notification).await {
        warn!("Event notification for goal {} failed: {}", goal.id, e);
    }

    let email = EmailMessage::plan_updated(goal, dashboard_url);
    if let Err(e) = notifier.email(&goal.user_id, &email).await {
        warn!("Email for goal {} failed: {}", goal.id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::goal;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<(String, Notification)>>,
        emails: Mutex<Vec<(String, EmailMessage)>>,
        fail_events: bool,
    }

    #[async_trait]
    impl Notifier for Recording {
        async fn notify(&self, user_id: &str, n: &Notification) -> Result<(), NotifyError> {
            if self.fail_events {
                return Err(NotifyError::Rejected {
                    url: "http://events".to_string(),
                    status: 503,
                });
            }
            self.events
                .lock()
                .unwrap()
                .push((user_id.to_string(), n.clone()));
            Ok(())
        }

        async fn email(&self, user_id: &str, m: &EmailMessage) -> Result<(), NotifyError> {
            self.emails
                .lock()
                .unwrap()
                .push((user_id.to_string(), m.clone()));
            Ok(())
        }
    }

    fn result() -> ApplyResult {
        ApplyResult {
            created_ids: vec!["n1".to_string(), "n2".to_string()],
            updated_ids: vec![],
            archived_ids: vec!["t1".to_string()],
        }
    }

    #[test]
    fn test_notification_wire_format() {
        let n = Notification::plan_updated(&goal("goal-1", "user-1"), &result());
        let value = serde_json::to_value(&n).unwrap();
        assert_eq!(value["type"], "success");
        assert_eq!(value["goalId"], "goal-1");
        assert_eq!(value["createdIds"], serde_json::json!(["n1", "n2"]));
        assert_eq!(value["updatedIds"], serde_json::json!([]));
        assert_eq!(value["archivedIds"], serde_json::json!(["t1"]));
    }

    #[test]
    fn test_email_links_to_goal() {
        let email = EmailMessage::plan_updated(
            &goal("goal-1", "user-1"),
            "https://app.example.com/dashboard/",
        );
        assert_eq!(email.goal_title, "Learn Guitar");
        assert_eq!(
            email.dashboard_link,
            "https://app.example.com/dashboard?goal=goal-1"
        );
    }

    #[tokio::test]
    async fn test_fan_out_sends_both_to_owner() {
        let notifier = Recording::default();
        fan_out(&notifier, &goal("goal-1", "user-1"), &result(), "http://d").await;

        let events = notifier.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "user-1");
        assert_eq!(notifier.emails.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_event_still_sends_email() {
        let notifier = Recording {
            fail_events: true,
            ..Recording::default()
        };
        fan_out(&notifier, &goal("goal-1", "user-1"), &result(), "http://d").await;

        assert!(notifier.events.lock().unwrap().is_empty());
        assert_eq!(notifier.emails.lock().unwrap().len(), 1);
    }
}
