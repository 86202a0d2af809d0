use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::requisition::Requisition;
use crate::domain::user::{Actor, Role, UserId};

/// Roles that may act on any requisition regardless of reporting lines.
pub const OVERRIDE_ROLES: &[Role] = &[Role::Administrator];
/// Roles that may take the HR decision.
pub const HR_ROLES: &[Role] = &[Role::HrManager, Role::Administrator];
/// Roles that see every requisition.
pub const OVERSIGHT_ROLES: &[Role] = &[Role::HrManager, Role::Administrator];

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthorizationDenial {
    #[error("actor `{actor_id}` is not the assigned manager of this requisition")]
    NotAssignedManager { actor_id: UserId, assigned_manager: Option<UserId> },
    #[error("actor `{actor_id}` does not hold the HR Manager role")]
    MissingHrRole { actor_id: UserId },
    #[error("actor `{actor_id}` may not withdraw a requisition raised by `{requester_id}`")]
    NotRequester { actor_id: UserId, requester_id: UserId },
    #[error("actor `{actor_id}` is not involved in this requisition")]
    NotVisible { actor_id: UserId },
}

/// Authorization rules for requisition operations. Checks depend only on the
/// actor and the requisition's parties, never on its status.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthorityPolicy {
    /// Lets the requisition's assigned manager withdraw it as well.
    pub manager_can_withdraw: bool,
}

impl AuthorityPolicy {
    pub fn new(manager_can_withdraw: bool) -> Self {
        Self { manager_can_withdraw }
    }

    pub fn authorize_manager_action(
        &self,
        actor: &Actor,
        requisition: &Requisition,
    ) -> Result<(), AuthorizationDenial> {
        if requisition.manager_id.as_ref() == Some(&actor.id) || actor.has_any_role(OVERRIDE_ROLES)
        {
            return Ok(());
        }

        Err(AuthorizationDenial::NotAssignedManager {
            actor_id: actor.id.clone(),
            assigned_manager: requisition.manager_id.clone(),
        })
    }

    pub fn authorize_hr_action(&self, actor: &Actor) -> Result<(), AuthorizationDenial> {
        if actor.has_any_role(HR_ROLES) {
            return Ok(());
        }

        Err(AuthorizationDenial::MissingHrRole { actor_id: actor.id.clone() })
    }

    pub fn authorize_withdrawal(
        &self,
        actor: &Actor,
        requisition: &Requisition,
    ) -> Result<(), AuthorizationDenial> {
        let is_requester = requisition.requester_id == actor.id;
        let is_manager =
            self.manager_can_withdraw && requisition.manager_id.as_ref() == Some(&actor.id);

        if is_requester || is_manager || actor.has_any_role(OVERRIDE_ROLES) {
            return Ok(());
        }

        Err(AuthorizationDenial::NotRequester {
            actor_id: actor.id.clone(),
            requester_id: requisition.requester_id.clone(),
        })
    }

    pub fn sees_everything(&self, actor: &Actor) -> bool {
        actor.has_any_role(OVERSIGHT_ROLES)
    }

    pub fn authorize_view(
        &self,
        actor: &Actor,
        requisition: &Requisition,
    ) -> Result<(), AuthorizationDenial> {
        if self.sees_everything(actor) || requisition.involves(&actor.id) {
            return Ok(());
        }

        Err(AuthorizationDenial::NotVisible { actor_id: actor.id.clone() })
    }
}
