use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use reqflow_core::domain::asset_type::AssetType;
use reqflow_core::domain::requisition::{
    Requisition, RequisitionId, RequisitionStatus, StageDecision,
};
use reqflow_core::domain::user::{Role, User, UserId};
use reqflow_core::errors::ApplicationError;
use reqflow_core::workflow::Stage;

pub mod asset_type;
pub mod memory;
pub mod requisition;
pub mod user;

pub use asset_type::SqlAssetTypeRepository;
pub use memory::{
    InMemoryAssetTypeRepository, InMemoryRequisitionRepository, InMemoryUserRepository,
};
pub use requisition::SqlRequisitionRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("duplicate key: {0}")]
    Duplicate(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        Self::Persistence(value.to_string())
    }
}

/// A bearer token bound to a directory user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionToken {
    pub token: String,
    pub user_id: UserId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionToken {
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expires_at| expires_at > now)
    }
}

/// Which requisitions a listing may return.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VisibilityScope {
    All,
    /// Requisitions where the user is requester, manager or team member.
    InvolvedUser(UserId),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequisitionQuery {
    pub scope: VisibilityScope,
    pub status: Option<RequisitionStatus>,
    pub limit: u32,
}

/// A status change guarded by the status the caller observed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusUpdate {
    pub id: RequisitionId,
    pub expected: RequisitionStatus,
    pub next: RequisitionStatus,
    pub stage: Stage,
    pub decision: StageDecision,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CasOutcome<T> {
    Applied(T),
    /// The row no longer exists.
    Missing,
    /// The row exists but its status moved away from the expected one.
    Stale(RequisitionStatus),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    /// Resolves a live (unexpired) token to its user, active or not.
    async fn find_by_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, RepositoryError>;
    async fn list_active_with_role(&self, role: Role) -> Result<Vec<User>, RepositoryError>;
    async fn save(&self, user: User) -> Result<(), RepositoryError>;
    async fn issue_token(&self, token: SessionToken) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait AssetTypeRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<AssetType>, RepositoryError>;
    async fn list_active(&self) -> Result<Vec<AssetType>, RepositoryError>;
    async fn save(&self, asset_type: AssetType) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait RequisitionRepository: Send + Sync {
    async fn insert(&self, requisition: &Requisition) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &RequisitionId)
        -> Result<Option<Requisition>, RepositoryError>;
    /// Newest first.
    async fn list(&self, query: &RequisitionQuery) -> Result<Vec<Requisition>, RepositoryError>;
    /// Writes the new status and the stage decision only if the stored status
    /// still equals `update.expected`.
    async fn compare_and_set(
        &self,
        update: StatusUpdate,
    ) -> Result<CasOutcome<Requisition>, RepositoryError>;
    /// Deletes the row only if its stored status still equals `expected`.
    async fn delete_if_status(
        &self,
        id: &RequisitionId,
        expected: RequisitionStatus,
    ) -> Result<CasOutcome<()>, RepositoryError>;
}
