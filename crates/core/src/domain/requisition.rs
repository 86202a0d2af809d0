use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::asset_type::AssetType;
use crate::domain::user::{Actor, User, UserId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequisitionId(pub String);

impl RequisitionId {
    pub fn generate() -> Self {
        Self(format!("REQ-{}", Uuid::new_v4().simple()))
    }
}

impl fmt::Display for RequisitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    #[serde(rename = "New Allocation", alias = "new_allocation")]
    NewAllocation,
    #[serde(rename = "Replacement", alias = "replacement")]
    Replacement,
    #[serde(rename = "Return", alias = "return")]
    Return,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewAllocation => "new_allocation",
            Self::Replacement => "replacement",
            Self::Return => "return",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace(' ', "_").as_str() {
            "new_allocation" => Some(Self::NewAllocation),
            "replacement" => Some(Self::Replacement),
            "return" => Some(Self::Return),
            _ => None,
        }
    }

    fn requires_return_details(&self) -> bool {
        matches!(self, Self::Replacement | Self::Return)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestFor {
    #[serde(rename = "Self", alias = "self")]
    Myself,
    #[serde(rename = "Team Member", alias = "team_member")]
    TeamMember,
}

impl RequestFor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Myself => "self",
            Self::TeamMember => "team_member",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace(' ', "_").as_str() {
            "self" => Some(Self::Myself),
            "team_member" => Some(Self::TeamMember),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequisitionStatus {
    #[serde(rename = "Pending")]
    Pending,
    #[serde(rename = "Manager Approved")]
    ManagerApproved,
    #[serde(rename = "Manager Rejected")]
    ManagerRejected,
    #[serde(rename = "On Hold")]
    OnHold,
    #[serde(rename = "HR Approved")]
    HrApproved,
    #[serde(rename = "HR Rejected")]
    HrRejected,
    #[serde(rename = "Allocated")]
    Allocated,
}

impl RequisitionStatus {
    pub const ALL: [RequisitionStatus; 7] = [
        Self::Pending,
        Self::ManagerApproved,
        Self::ManagerRejected,
        Self::OnHold,
        Self::HrApproved,
        Self::HrRejected,
        Self::Allocated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::ManagerApproved => "manager_approved",
            Self::ManagerRejected => "manager_rejected",
            Self::OnHold => "on_hold",
            Self::HrApproved => "hr_approved",
            Self::HrRejected => "hr_rejected",
            Self::Allocated => "allocated",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::ManagerApproved => "Manager Approved",
            Self::ManagerRejected => "Manager Rejected",
            Self::OnHold => "On Hold",
            Self::HrApproved => "HR Approved",
            Self::HrRejected => "HR Rejected",
            Self::Allocated => "Allocated",
        }
    }

    /// Accepts the storage encoding or the display label. Unknown values are
    /// `None`; callers must not fall back to a default status.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "pending" => Some(Self::Pending),
            "manager_approved" => Some(Self::ManagerApproved),
            "manager_rejected" => Some(Self::ManagerRejected),
            "on_hold" => Some(Self::OnHold),
            "hr_approved" => Some(Self::HrApproved),
            "hr_rejected" => Some(Self::HrRejected),
            "allocated" => Some(Self::Allocated),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ManagerRejected | Self::HrRejected | Self::Allocated)
    }

    pub fn awaits_manager(&self) -> bool {
        matches!(self, Self::Pending | Self::OnHold)
    }

    pub fn awaits_hr(&self) -> bool {
        matches!(self, Self::ManagerApproved)
    }

    pub fn is_withdrawable(&self) -> bool {
        matches!(self, Self::Pending | Self::OnHold | Self::ManagerApproved)
    }
}

impl fmt::Display for RequisitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Who decided a stage, why, and when.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDecision {
    pub actor_id: UserId,
    pub actor_name: String,
    pub reason: String,
    pub decided_at: DateTime<Utc>,
}

impl StageDecision {
    pub fn by(actor: &Actor, reason: impl Into<String>, decided_at: DateTime<Utc>) -> Self {
        Self {
            actor_id: actor.id.clone(),
            actor_name: actor.display_name.clone(),
            reason: reason.into(),
            decided_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requisition {
    pub id: RequisitionId,
    pub requester_id: UserId,
    pub requester_name: String,
    pub request_type: RequestType,
    pub asset_type_id: String,
    pub asset_type_name: String,
    pub request_for: RequestFor,
    pub team_member_id: Option<UserId>,
    pub team_member_name: Option<String>,
    pub justification: Option<String>,
    pub required_by: Option<NaiveDate>,
    pub reason_for_return_or_replacement: Option<String>,
    pub asset_details: Option<String>,
    pub manager_id: Option<UserId>,
    pub manager_name: Option<String>,
    pub status: RequisitionStatus,
    pub manager_decision: Option<StageDecision>,
    pub hr_decision: Option<StageDecision>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Requisition {
    /// Builds a freshly submitted requisition. The status is always `Pending`
    /// and both decision slots are empty.
    pub fn submit(
        requester: &Actor,
        fields: ValidatedRequisition,
        asset_type: &AssetType,
        team_member: Option<&User>,
        manager: Option<&User>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RequisitionId::generate(),
            requester_id: requester.id.clone(),
            requester_name: requester.display_name.clone(),
            request_type: fields.request_type,
            asset_type_id: asset_type.id.clone(),
            asset_type_name: asset_type.name.clone(),
            request_for: fields.request_for,
            team_member_id: team_member.map(|user| user.id.clone()),
            team_member_name: team_member.map(|user| user.display_name.clone()),
            justification: fields.justification,
            required_by: fields.required_by,
            reason_for_return_or_replacement: fields.reason_for_return_or_replacement,
            asset_details: fields.asset_details,
            manager_id: manager.map(|user| user.id.clone()),
            manager_name: manager.map(|user| user.display_name.clone()),
            status: RequisitionStatus::Pending,
            manager_decision: None,
            hr_decision: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn involves(&self, user_id: &UserId) -> bool {
        &self.requester_id == user_id
            || self.manager_id.as_ref() == Some(user_id)
            || self.team_member_id.as_ref() == Some(user_id)
    }
}

/// Creation input as submitted by a requester.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequisition {
    pub request_type: RequestType,
    pub asset_type_id: String,
    pub request_for: RequestFor,
    #[serde(default)]
    pub team_member_id: Option<String>,
    #[serde(default)]
    pub justification: Option<String>,
    #[serde(default)]
    pub required_by: Option<NaiveDate>,
    #[serde(default)]
    pub reason_for_return_or_replacement: Option<String>,
    #[serde(default)]
    pub asset_details: Option<String>,
}

/// Creation input whose type-conditional fields have been checked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedRequisition {
    pub request_type: RequestType,
    pub asset_type_id: String,
    pub request_for: RequestFor,
    pub team_member_id: Option<UserId>,
    pub justification: Option<String>,
    pub required_by: Option<NaiveDate>,
    pub reason_for_return_or_replacement: Option<String>,
    pub asset_details: Option<String>,
}

impl NewRequisition {
    pub fn validate(self, today: NaiveDate) -> Result<ValidatedRequisition, DomainError> {
        let asset_type_id = non_blank(Some(self.asset_type_id));
        let justification = non_blank(self.justification);
        let reason = non_blank(self.reason_for_return_or_replacement);
        let asset_details = non_blank(self.asset_details);
        let team_member_id = match self.request_for {
            RequestFor::TeamMember => non_blank(self.team_member_id),
            RequestFor::Myself => None,
        };

        let mut missing = Vec::new();
        if asset_type_id.is_none() {
            missing.push("asset_type_id");
        }
        if self.request_type.requires_return_details() {
            if reason.is_none() {
                missing.push("reason_for_return_or_replacement");
            }
            if asset_details.is_none() {
                missing.push("asset_details");
            }
        }
        if self.request_type == RequestType::NewAllocation && justification.is_none() {
            missing.push("justification");
        }
        if self.request_for == RequestFor::TeamMember {
            if team_member_id.is_none() {
                missing.push("team_member_id");
            }
            if self.required_by.is_none() {
                missing.push("required_by");
            }
        }

        if !missing.is_empty() {
            return Err(DomainError::MissingRequiredFields {
                fields: missing.into_iter().map(str::to_owned).collect(),
            });
        }

        if let Some(required_by) = self.required_by {
            if required_by < today {
                return Err(DomainError::Validation(format!(
                    "required_by {required_by} is earlier than {today}"
                )));
            }
        }

        Ok(ValidatedRequisition {
            request_type: self.request_type,
            asset_type_id: asset_type_id.unwrap_or_default(),
            request_for: self.request_for,
            team_member_id: team_member_id.map(UserId),
            justification,
            required_by: self.required_by,
            reason_for_return_or_replacement: reason,
            asset_details,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
}
