use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::requisition::RequisitionStatus;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerAction {
    Approve,
    Reject,
    Hold,
}

impl ManagerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Hold => "hold",
        }
    }

    pub fn event(&self) -> RequisitionEvent {
        match self {
            Self::Approve => RequisitionEvent::ManagerApproved,
            Self::Reject => RequisitionEvent::ManagerRejected,
            Self::Hold => RequisitionEvent::ManagerHeld,
        }
    }
}

impl FromStr for ManagerAction {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            "hold" => Ok(Self::Hold),
            _ => Err(DomainError::Validation(format!(
                "unsupported manager action `{}` (expected approve|reject|hold)",
                value.trim()
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HrAction {
    Approve,
    Reject,
}

impl HrAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }

    pub fn event(&self) -> RequisitionEvent {
        match self {
            Self::Approve => RequisitionEvent::HrApproved,
            Self::Reject => RequisitionEvent::HrRejected,
        }
    }
}

impl FromStr for HrAction {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            _ => Err(DomainError::Validation(format!(
                "unsupported hr action `{}` (expected approve|reject)",
                value.trim()
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequisitionEvent {
    ManagerApproved,
    ManagerRejected,
    ManagerHeld,
    HrApproved,
    HrRejected,
    Allocated,
    Withdrawn,
}

impl RequisitionEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManagerApproved => "manager_approved",
            Self::ManagerRejected => "manager_rejected",
            Self::ManagerHeld => "manager_held",
            Self::HrApproved => "hr_approved",
            Self::HrRejected => "hr_rejected",
            Self::Allocated => "allocated",
            Self::Withdrawn => "withdrawn",
        }
    }

    /// Audit slot written by the event, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::ManagerApproved | Self::ManagerRejected | Self::ManagerHeld => {
                Some(Stage::Manager)
            }
            Self::HrApproved | Self::HrRejected => Some(Stage::Hr),
            Self::Allocated | Self::Withdrawn => None,
        }
    }

    pub(crate) fn rejection_hint(&self) -> &'static str {
        match self.stage() {
            Some(Stage::Manager) => "is not awaiting manager action",
            Some(Stage::Hr) => "is not awaiting HR action",
            None if *self == Self::Withdrawn => "can no longer be withdrawn",
            None => "is not eligible for allocation",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Manager,
    Hr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: RequisitionStatus,
    /// `None` when the event removes the requisition.
    pub to: Option<RequisitionStatus>,
    pub event: RequisitionEvent,
}

#[cfg(test)]
mod tests {
    use crate::errors::DomainError;

    use super::{HrAction, ManagerAction, RequisitionEvent, Stage};

    #[test]
    fn manager_action_tokens_parse_case_insensitively() {
        assert_eq!(" Approve ".parse::<ManagerAction>(), Ok(ManagerAction::Approve));
        assert_eq!("REJECT".parse::<ManagerAction>(), Ok(ManagerAction::Reject));
        assert_eq!("hold".parse::<ManagerAction>(), Ok(ManagerAction::Hold));
    }

    #[test]
    fn unknown_action_tokens_are_validation_errors() {
        assert!(matches!("escalate".parse::<ManagerAction>(), Err(DomainError::Validation(_))));
        assert!(matches!("".parse::<ManagerAction>(), Err(DomainError::Validation(_))));
        assert!(matches!("hold".parse::<HrAction>(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn events_map_to_their_audit_stage() {
        assert_eq!(ManagerAction::Hold.event().stage(), Some(Stage::Manager));
        assert_eq!(HrAction::Reject.event().stage(), Some(Stage::Hr));
        assert_eq!(RequisitionEvent::Withdrawn.stage(), None);
    }
}
