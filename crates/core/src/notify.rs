use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::requisition::{Requisition, RequisitionId, RequisitionStatus};
use crate::domain::user::{User, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Submitted,
    ManagerDecision,
    HrDecision,
    Withdrawn,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::ManagerDecision => "manager_decision",
            Self::HrDecision => "hr_decision",
            Self::Withdrawn => "withdrawn",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub user_id: UserId,
    pub display_name: String,
    pub email: String,
}

impl From<&User> for Recipient {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            display_name: user.display_name.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub requisition_id: RequisitionId,
    /// Status after the change; absent once the requisition is withdrawn.
    pub status: Option<RequisitionStatus>,
    pub actor_id: UserId,
    pub recipients: Vec<Recipient>,
    pub subject: String,
    pub correlation_id: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn for_requisition(
        kind: NotificationKind,
        requisition: &Requisition,
        status: Option<RequisitionStatus>,
        actor_id: UserId,
        correlation_id: impl Into<String>,
    ) -> Self {
        let subject = match (kind, status) {
            (NotificationKind::Submitted, _) => {
                format!("{} submitted requisition {}", requisition.requester_name, requisition.id)
            }
            (NotificationKind::Withdrawn, _) => format!("Requisition {} was withdrawn", requisition.id),
            (_, Some(status)) => format!("Requisition {} is now {}", requisition.id, status),
            (_, None) => format!("Requisition {} was updated", requisition.id),
        };

        Self {
            kind,
            requisition_id: requisition.id.clone(),
            status,
            actor_id,
            recipients: Vec::new(),
            subject,
            correlation_id: correlation_id.into(),
            created_at: Utc::now(),
        }
    }

    /// Adds a recipient unless it is already present.
    pub fn with_recipient(mut self, recipient: Recipient) -> Self {
        if !self.recipients.iter().any(|existing| existing.user_id == recipient.user_id) {
            self.recipients.push(recipient);
        }
        self
    }

    pub fn with_recipients(self, recipients: impl IntoIterator<Item = Recipient>) -> Self {
        recipients.into_iter().fold(self, Self::with_recipient)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
    #[error("notification endpoint rejected the payload with status {status}")]
    Rejected { status: u16 },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _notification: Notification) -> Result<(), NotifyError> {
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl InMemoryNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        match self.sent.lock() {
            Ok(mut sent) => sent.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
        Ok(())
    }
}
