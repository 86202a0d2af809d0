use std::time::Duration;

use async_trait::async_trait;
use reqflow_core::config::NotificationsConfig;
use reqflow_core::notify::{Notification, Notifier, NotifyError};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

/// Posts each notification as JSON to the configured webhook, where the mail
/// relay picks it up.
pub struct WebhookNotifier {
    client: Client,
    url: String,
    auth_token: Option<SecretString>,
}

impl WebhookNotifier {
    pub fn new(
        url: impl Into<String>,
        auth_token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.into(), auth_token })
    }

    /// `None` unless notifications are enabled and a webhook is configured.
    pub fn from_config(config: &NotificationsConfig) -> Result<Option<Self>, reqwest::Error> {
        let Some(url) = config.webhook_url.as_deref().filter(|_| config.enabled) else {
            return Ok(None);
        };

        let auth_token = config
            .auth_token
            .as_ref()
            .map(|token| SecretString::from(token.expose_secret().to_owned()));
        Self::new(url, auth_token, Duration::from_secs(config.timeout_secs)).map(Some)
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        let mut request = self.client.post(&self.url).json(&notification);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response =
            request.send().await.map_err(|error| NotifyError::Delivery(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected { status: status.as_u16() });
        }

        debug!(
            event_name = "notification.webhook.delivered",
            correlation_id = %notification.correlation_id,
            requisition_id = %notification.requisition_id,
            kind = notification.kind.as_str(),
            "notification delivered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use chrono::Utc;
    use reqflow_core::config::NotificationsConfig;
    use reqflow_core::domain::requisition::{
        RequestFor, RequestType, Requisition, RequisitionId, RequisitionStatus,
    };
    use reqflow_core::domain::user::UserId;
    use reqflow_core::notify::{Notification, NotificationKind, Notifier, NotifyError};
    use secrecy::SecretString;

    use super::WebhookNotifier;

    type Received = Arc<Mutex<Vec<(Option<String>, serde_json::Value)>>>;

    async fn receiver(status: StatusCode) -> (String, Received) {
        let received: Received = Arc::default();
        let app = Router::new()
            .route(
                "/hooks/requisitions",
                post(
                    move |State(received): State<Received>,
                          headers: HeaderMap,
                          Json(body): Json<serde_json::Value>| async move {
                        let authorization = headers
                            .get("authorization")
                            .and_then(|value| value.to_str().ok())
                            .map(str::to_owned);
                        received.lock().expect("lock").push((authorization, body));
                        status
                    },
                ),
            )
            .with_state(received.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        (format!("http://{address}/hooks/requisitions"), received)
    }

    fn notification() -> Notification {
        let now = Utc::now();
        let requisition = Requisition {
            id: RequisitionId("REQ-hook".to_string()),
            requester_id: UserId("u-emp".to_string()),
            requester_name: "Emil Employee".to_string(),
            request_type: RequestType::NewAllocation,
            asset_type_id: "laptop".to_string(),
            asset_type_name: "Laptop".to_string(),
            request_for: RequestFor::Myself,
            team_member_id: None,
            team_member_name: None,
            justification: Some("new starter".to_string()),
            required_by: None,
            reason_for_return_or_replacement: None,
            asset_details: None,
            manager_id: Some(UserId("u-mgr".to_string())),
            manager_name: Some("Maya Manager".to_string()),
            status: RequisitionStatus::Pending,
            manager_decision: None,
            hr_decision: None,
            created_at: now,
            updated_at: now,
        };
        Notification::for_requisition(
            NotificationKind::Submitted,
            &requisition,
            Some(RequisitionStatus::Pending),
            UserId("u-emp".to_string()),
            "corr-hook",
        )
    }

    #[tokio::test]
    async fn webhook_receives_notification_with_bearer_token() {
        let (url, received) = receiver(StatusCode::ACCEPTED).await;
        let notifier = WebhookNotifier::new(
            url,
            Some(SecretString::from("hook-secret".to_string())),
            Duration::from_secs(5),
        )
        .expect("client");

        notifier.notify(notification()).await.expect("delivered");

        let received = received.lock().expect("lock").clone();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0.as_deref(), Some("Bearer hook-secret"));
        assert_eq!(received[0].1["kind"], "submitted");
        assert_eq!(received[0].1["requisition_id"], "REQ-hook");
    }

    #[tokio::test]
    async fn non_success_status_is_reported_as_rejection() {
        let (url, _received) = receiver(StatusCode::INTERNAL_SERVER_ERROR).await;
        let notifier = WebhookNotifier::new(url, None, Duration::from_secs(5)).expect("client");

        let error = notifier.notify(notification()).await.expect_err("rejected");

        assert_eq!(error, NotifyError::Rejected { status: 500 });
    }

    #[test]
    fn disabled_or_unconfigured_webhook_builds_nothing() {
        let mut config = NotificationsConfig {
            enabled: false,
            webhook_url: Some("http://127.0.0.1:9/hook".to_string()),
            auth_token: None,
            timeout_secs: 5,
        };
        assert!(WebhookNotifier::from_config(&config).expect("build").is_none());

        config.enabled = true;
        assert!(WebhookNotifier::from_config(&config).expect("build").is_some());

        config.webhook_url = None;
        assert!(WebhookNotifier::from_config(&config).expect("build").is_none());
    }
}
