use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use reqflow_core::domain::asset_type::AssetType;
use reqflow_core::domain::requisition::{Requisition, RequisitionId, RequisitionStatus};
use reqflow_core::domain::user::{Role, User, UserId};
use reqflow_core::workflow::Stage;

use super::{
    AssetTypeRepository, CasOutcome, RepositoryError, RequisitionQuery, RequisitionRepository,
    SessionToken, StatusUpdate, UserRepository, VisibilityScope,
};

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
    tokens: RwLock<HashMap<String, SessionToken>>,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        let email = email.trim();
        Ok(users.values().find(|user| user.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn find_by_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, RepositoryError> {
        let user_id = {
            let tokens = self.tokens.read().await;
            match tokens.get(token) {
                Some(session) if session.is_live_at(now) => session.user_id.clone(),
                _ => return Ok(None),
            }
        };
        self.find_by_id(&user_id).await
    }

    async fn list_active_with_role(&self, role: Role) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        let mut matching = users
            .values()
            .filter(|user| user.active && user.roles.contains(role))
            .cloned()
            .collect::<Vec<_>>();
        matching.sort_by(|left, right| left.display_name.cmp(&right.display_name));
        Ok(matching)
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        users.insert(user.id.0.clone(), user);
        Ok(())
    }

    async fn issue_token(&self, token: SessionToken) -> Result<(), RepositoryError> {
        let mut tokens = self.tokens.write().await;
        tokens.insert(token.token.clone(), token);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAssetTypeRepository {
    asset_types: RwLock<HashMap<String, AssetType>>,
}

#[async_trait::async_trait]
impl AssetTypeRepository for InMemoryAssetTypeRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<AssetType>, RepositoryError> {
        let asset_types = self.asset_types.read().await;
        Ok(asset_types.get(id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<AssetType>, RepositoryError> {
        let asset_types = self.asset_types.read().await;
        let mut active =
            asset_types.values().filter(|asset_type| asset_type.active).cloned().collect::<Vec<_>>();
        active.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(active)
    }

    async fn save(&self, asset_type: AssetType) -> Result<(), RepositoryError> {
        let mut asset_types = self.asset_types.write().await;
        asset_types.insert(asset_type.id.clone(), asset_type);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRequisitionRepository {
    requisitions: RwLock<HashMap<String, Requisition>>,
}

#[async_trait::async_trait]
impl RequisitionRepository for InMemoryRequisitionRepository {
    async fn insert(&self, requisition: &Requisition) -> Result<(), RepositoryError> {
        let mut requisitions = self.requisitions.write().await;
        if requisitions.contains_key(&requisition.id.0) {
            return Err(RepositoryError::Duplicate(requisition.id.0.clone()));
        }
        requisitions.insert(requisition.id.0.clone(), requisition.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &RequisitionId,
    ) -> Result<Option<Requisition>, RepositoryError> {
        let requisitions = self.requisitions.read().await;
        Ok(requisitions.get(&id.0).cloned())
    }

    async fn list(&self, query: &RequisitionQuery) -> Result<Vec<Requisition>, RepositoryError> {
        let requisitions = self.requisitions.read().await;
        let mut matching = requisitions
            .values()
            .filter(|requisition| match &query.scope {
                VisibilityScope::All => true,
                VisibilityScope::InvolvedUser(user_id) => requisition.involves(user_id),
            })
            .filter(|requisition| query.status.map_or(true, |status| requisition.status == status))
            .cloned()
            .collect::<Vec<_>>();
        matching.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then_with(|| right.id.0.cmp(&left.id.0))
        });
        matching.truncate(usize::try_from(query.limit).unwrap_or(usize::MAX));
        Ok(matching)
    }

    async fn compare_and_set(
        &self,
        update: StatusUpdate,
    ) -> Result<CasOutcome<Requisition>, RepositoryError> {
        let mut requisitions = self.requisitions.write().await;
        let Some(requisition) = requisitions.get_mut(&update.id.0) else {
            return Ok(CasOutcome::Missing);
        };
        if requisition.status != update.expected {
            return Ok(CasOutcome::Stale(requisition.status));
        }

        requisition.status = update.next;
        requisition.updated_at = update.decision.decided_at;
        match update.stage {
            Stage::Manager => requisition.manager_decision = Some(update.decision),
            Stage::Hr => requisition.hr_decision = Some(update.decision),
        }
        Ok(CasOutcome::Applied(requisition.clone()))
    }

    async fn delete_if_status(
        &self,
        id: &RequisitionId,
        expected: RequisitionStatus,
    ) -> Result<CasOutcome<()>, RepositoryError> {
        let mut requisitions = self.requisitions.write().await;
        match requisitions.get(&id.0).map(|requisition| requisition.status) {
            None => Ok(CasOutcome::Missing),
            Some(status) if status != expected => Ok(CasOutcome::Stale(status)),
            Some(_) => {
                requisitions.remove(&id.0);
                Ok(CasOutcome::Applied(()))
            }
        }
    }
}
