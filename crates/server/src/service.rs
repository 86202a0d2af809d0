use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use reqflow_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink, NoopAuditSink};
use reqflow_core::config::WorkflowConfig;
use reqflow_core::domain::asset_type::AssetType;
use reqflow_core::domain::requisition::{
    NewRequisition, Requisition, RequisitionId, RequisitionStatus, StageDecision,
};
use reqflow_core::domain::user::{Actor, Role, User, UserId};
use reqflow_core::errors::{ApplicationError, DomainError};
use reqflow_core::notify::{NoopNotifier, Notification, NotificationKind, Notifier, Recipient};
use reqflow_core::workflow::{
    AuthorityPolicy, HrAction, ManagerAction, RequisitionEvent, Stage, TransitionError,
    WorkflowEngine,
};
use reqflow_db::repositories::{
    InMemoryAssetTypeRepository, InMemoryRequisitionRepository, InMemoryUserRepository,
    SqlAssetTypeRepository, SqlRequisitionRepository, SqlUserRepository,
};
use reqflow_db::{
    AssetTypeRepository, CasOutcome, DbPool, RequisitionQuery, RequisitionRepository,
    StatusUpdate, UserRepository, VisibilityScope,
};

#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub asset_types: Arc<dyn AssetTypeRepository>,
    pub requisitions: Arc<dyn RequisitionRepository>,
}

impl Repositories {
    pub fn sql(pool: DbPool) -> Self {
        Self {
            users: Arc::new(SqlUserRepository::new(pool.clone())),
            asset_types: Arc::new(SqlAssetTypeRepository::new(pool.clone())),
            requisitions: Arc::new(SqlRequisitionRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(InMemoryUserRepository::default()),
            asset_types: Arc::new(InMemoryAssetTypeRepository::default()),
            requisitions: Arc::new(InMemoryRequisitionRepository::default()),
        }
    }
}

/// What remains of a requisition after a successful withdrawal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WithdrawalReceipt {
    pub id: RequisitionId,
    pub withdrawn: bool,
    pub previous_status: RequisitionStatus,
    pub withdrawn_at: DateTime<Utc>,
}

/// Orchestrates the requisition lifecycle: every operation takes the acting
/// user explicitly, checks authority before status, and persists through a
/// single compare-and-set so at most one concurrent caller wins.
#[derive(Clone)]
pub struct RequisitionService {
    repositories: Repositories,
    policy: AuthorityPolicy,
    engine: WorkflowEngine,
    workflow: WorkflowConfig,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn Notifier>,
}

impl RequisitionService {
    pub fn new(repositories: Repositories, workflow: WorkflowConfig) -> Self {
        Self {
            repositories,
            policy: AuthorityPolicy::new(workflow.manager_can_withdraw),
            engine: WorkflowEngine::new(),
            workflow,
            audit: Arc::new(NoopAuditSink),
            notifier: Arc::new(NoopNotifier),
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn users(&self) -> &Arc<dyn UserRepository> {
        &self.repositories.users
    }

    pub async fn create(
        &self,
        actor: &Actor,
        input: NewRequisition,
        correlation_id: &str,
    ) -> Result<Requisition, ApplicationError> {
        let audit = AuditContext::new(None, correlation_id, actor.id.0.clone());
        let (requisition, manager) = match self.submit(actor, input).await {
            Ok(submission) => submission,
            Err(error) => return Err(self.record_failure("requisition.create", &audit, error)),
        };

        let audit = AuditContext::new(Some(requisition.id.clone()), correlation_id, actor.id.0.clone());
        self.audit.emit(
            audit
                .event("requisition.created", AuditCategory::Ingress, AuditOutcome::Success)
                .with_metadata("request_type", requisition.request_type.as_str())
                .with_metadata("asset_type_id", requisition.asset_type_id.clone()),
        );
        info!(
            event_name = "requisition.create.applied",
            correlation_id = %correlation_id,
            requisition_id = %requisition.id,
            requester_id = %requisition.requester_id,
            manager_id = requisition.manager_id.as_ref().map_or("unassigned", |id| id.0.as_str()),
            "requisition submitted"
        );

        let notification = Notification::for_requisition(
            NotificationKind::Submitted,
            &requisition,
            Some(requisition.status),
            actor.id.clone(),
            correlation_id,
        )
        .with_recipients(manager.as_ref().map(Recipient::from));
        self.dispatch(notification, &audit).await;

        Ok(requisition)
    }

    async fn submit(
        &self,
        actor: &Actor,
        input: NewRequisition,
    ) -> Result<(Requisition, Option<User>), ApplicationError> {
        let now = Utc::now();
        let fields = input.validate(now.date_naive())?;

        let asset_type = self.active_asset_type(&fields.asset_type_id).await?;

        let team_member = match &fields.team_member_id {
            Some(team_member_id) => Some(
                self.repositories
                    .users
                    .find_by_id(team_member_id)
                    .await?
                    .filter(|user| user.active)
                    .ok_or_else(|| {
                        DomainError::Validation(format!(
                            "team member `{team_member_id}` is unknown or inactive"
                        ))
                    })?,
            ),
            None => None,
        };

        let manager = self.resolve_manager(actor).await?;

        let requisition = Requisition::submit(
            actor,
            fields,
            &asset_type,
            team_member.as_ref(),
            manager.as_ref(),
            now,
        );
        self.repositories.requisitions.insert(&requisition).await?;

        Ok((requisition, manager))
    }

    async fn active_asset_type(&self, asset_type_id: &str) -> Result<AssetType, ApplicationError> {
        let asset_type = self
            .repositories
            .asset_types
            .find_by_id(asset_type_id)
            .await?
            .filter(|asset_type| asset_type.active)
            .ok_or_else(|| {
                DomainError::Validation(format!(
                    "asset type `{asset_type_id}` is unknown or inactive"
                ))
            })?;
        Ok(asset_type)
    }

    /// The requester's reporting manager, if one is on file and still active.
    async fn resolve_manager(&self, actor: &Actor) -> Result<Option<User>, ApplicationError> {
        let requester = self.repositories.users.find_by_id(&actor.id).await?;
        let Some(manager_id) = requester.and_then(|user| user.reporting_manager_id) else {
            warn!(
                event_name = "requisition.create.manager_unresolved",
                requester_id = %actor.id,
                "requester has no reporting manager; requisition needs an administrator"
            );
            return Ok(None);
        };

        match self.repositories.users.find_by_id(&manager_id).await? {
            Some(manager) if manager.active => Ok(Some(manager)),
            _ => {
                warn!(
                    event_name = "requisition.create.manager_unresolved",
                    requester_id = %actor.id,
                    manager_id = %manager_id,
                    "reporting manager is missing or inactive"
                );
                Ok(None)
            }
        }
    }

    pub async fn manager_action(
        &self,
        actor: &Actor,
        id: &RequisitionId,
        action: &str,
        reason: Option<String>,
        correlation_id: &str,
    ) -> Result<Requisition, ApplicationError> {
        let audit = AuditContext::new(Some(id.clone()), correlation_id, actor.id.0.clone());
        let (action, updated) = match self.apply_manager_action(actor, id, action, reason, &audit).await
        {
            Ok(applied) => applied,
            Err(error) => return Err(self.record_failure("requisition.manager_action", &audit, error)),
        };

        info!(
            event_name = "requisition.manager_action.applied",
            correlation_id = %correlation_id,
            requisition_id = %id,
            action = action.as_str(),
            status = updated.status.as_str(),
            "manager decision recorded"
        );

        let mut recipients = self.recipients([&updated.requester_id]).await;
        if action == ManagerAction::Approve {
            recipients.extend(self.active_with_role(Role::HrManager).await);
        }
        let notification = Notification::for_requisition(
            NotificationKind::ManagerDecision,
            &updated,
            Some(updated.status),
            actor.id.clone(),
            correlation_id,
        )
        .with_recipients(recipients);
        self.dispatch(notification, &audit).await;

        Ok(updated)
    }

    async fn apply_manager_action(
        &self,
        actor: &Actor,
        id: &RequisitionId,
        action: &str,
        reason: Option<String>,
        audit: &AuditContext,
    ) -> Result<(ManagerAction, Requisition), ApplicationError> {
        let action = action.parse::<ManagerAction>()?;
        let requisition = self.load(id).await?;
        self.policy.authorize_manager_action(actor, &requisition)?;

        let updated = self
            .decide(actor, &requisition, action.event(), Stage::Manager, reason, audit)
            .await?;
        Ok((action, updated))
    }

    pub async fn hr_action(
        &self,
        actor: &Actor,
        id: &RequisitionId,
        action: &str,
        reason: Option<String>,
        correlation_id: &str,
    ) -> Result<Requisition, ApplicationError> {
        let audit = AuditContext::new(Some(id.clone()), correlation_id, actor.id.0.clone());
        let (action, updated) = match self.apply_hr_action(actor, id, action, reason, &audit).await {
            Ok(applied) => applied,
            Err(error) => return Err(self.record_failure("requisition.hr_action", &audit, error)),
        };

        info!(
            event_name = "requisition.hr_action.applied",
            correlation_id = %correlation_id,
            requisition_id = %id,
            action = action.as_str(),
            status = updated.status.as_str(),
            "hr decision recorded"
        );

        let mut parties = vec![&updated.requester_id];
        parties.extend(updated.manager_id.as_ref());
        let recipients = self.recipients(parties).await;
        let notification = Notification::for_requisition(
            NotificationKind::HrDecision,
            &updated,
            Some(updated.status),
            actor.id.clone(),
            correlation_id,
        )
        .with_recipients(recipients);
        self.dispatch(notification, &audit).await;

        Ok(updated)
    }

    async fn apply_hr_action(
        &self,
        actor: &Actor,
        id: &RequisitionId,
        action: &str,
        reason: Option<String>,
        audit: &AuditContext,
    ) -> Result<(HrAction, Requisition), ApplicationError> {
        let action = action.parse::<HrAction>()?;
        let requisition = self.load(id).await?;
        self.policy.authorize_hr_action(actor)?;

        let updated =
            self.decide(actor, &requisition, action.event(), Stage::Hr, reason, audit).await?;
        Ok((action, updated))
    }

    /// Checks the transition against the observed status and writes it only
    /// if the stored status has not moved in the meantime.
    async fn decide(
        &self,
        actor: &Actor,
        requisition: &Requisition,
        event: RequisitionEvent,
        stage: Stage,
        reason: Option<String>,
        audit: &AuditContext,
    ) -> Result<Requisition, ApplicationError> {
        let outcome =
            self.engine.apply_with_audit(requisition.status, event, self.audit.as_ref(), audit)?;
        let next = outcome.to.ok_or_else(|| {
            DomainError::InvariantViolation(format!(
                "{} must not remove the requisition",
                event.as_str()
            ))
        })?;

        let reason = reason.map(|reason| reason.trim().to_owned()).unwrap_or_default();
        let update = StatusUpdate {
            id: requisition.id.clone(),
            expected: outcome.from,
            next,
            stage,
            decision: StageDecision::by(actor, reason, Utc::now()),
        };

        match self.repositories.requisitions.compare_and_set(update).await? {
            CasOutcome::Applied(updated) => Ok(updated),
            CasOutcome::Missing => Err(ApplicationError::not_found("requisition", &requisition.id.0)),
            CasOutcome::Stale(current) => Err(TransitionError::ConcurrentUpdate {
                expected: outcome.from,
                found: current,
                event,
            }
            .into()),
        }
    }

    pub async fn withdraw(
        &self,
        actor: &Actor,
        id: &RequisitionId,
        correlation_id: &str,
    ) -> Result<WithdrawalReceipt, ApplicationError> {
        let audit = AuditContext::new(Some(id.clone()), correlation_id, actor.id.0.clone());
        let (requisition, receipt) = match self.apply_withdrawal(actor, id, &audit).await {
            Ok(withdrawn) => withdrawn,
            Err(error) => return Err(self.record_failure("requisition.withdraw", &audit, error)),
        };

        info!(
            event_name = "requisition.withdraw.applied",
            correlation_id = %correlation_id,
            requisition_id = %id,
            previous_status = receipt.previous_status.as_str(),
            "requisition withdrawn"
        );

        let mut notify = Vec::with_capacity(2);
        if requisition.requester_id != actor.id {
            notify.push(&requisition.requester_id);
        }
        notify.extend(requisition.manager_id.as_ref());
        let recipients = self.recipients(notify).await;
        let notification = Notification::for_requisition(
            NotificationKind::Withdrawn,
            &requisition,
            None,
            actor.id.clone(),
            correlation_id,
        )
        .with_recipients(recipients);
        self.dispatch(notification, &audit).await;

        Ok(receipt)
    }

    async fn apply_withdrawal(
        &self,
        actor: &Actor,
        id: &RequisitionId,
        audit: &AuditContext,
    ) -> Result<(Requisition, WithdrawalReceipt), ApplicationError> {
        let requisition = self.load(id).await?;
        self.policy.authorize_withdrawal(actor, &requisition)?;

        let outcome = self.engine.apply_with_audit(
            requisition.status,
            RequisitionEvent::Withdrawn,
            self.audit.as_ref(),
            audit,
        )?;

        match self.repositories.requisitions.delete_if_status(id, outcome.from).await? {
            CasOutcome::Applied(()) => {
                let receipt = WithdrawalReceipt {
                    id: id.clone(),
                    withdrawn: true,
                    previous_status: outcome.from,
                    withdrawn_at: Utc::now(),
                };
                Ok((requisition, receipt))
            }
            CasOutcome::Missing => Err(ApplicationError::not_found("requisition", &id.0)),
            CasOutcome::Stale(current) => Err(TransitionError::ConcurrentUpdate {
                expected: outcome.from,
                found: current,
                event: RequisitionEvent::Withdrawn,
            }
            .into()),
        }
    }

    pub async fn get(
        &self,
        actor: &Actor,
        id: &RequisitionId,
    ) -> Result<Requisition, ApplicationError> {
        let requisition = self.load(id).await?;
        self.policy.authorize_view(actor, &requisition)?;
        Ok(requisition)
    }

    /// Newest first, limited to what the actor may see.
    pub async fn list(
        &self,
        actor: &Actor,
        status: Option<RequisitionStatus>,
        limit: Option<u32>,
    ) -> Result<Vec<Requisition>, ApplicationError> {
        let scope = if self.policy.sees_everything(actor) {
            VisibilityScope::All
        } else {
            VisibilityScope::InvolvedUser(actor.id.clone())
        };
        let query = RequisitionQuery { scope, status, limit: self.workflow.list_limit(limit) };
        Ok(self.repositories.requisitions.list(&query).await?)
    }

    pub async fn asset_types(&self) -> Result<Vec<AssetType>, ApplicationError> {
        Ok(self.repositories.asset_types.list_active().await?)
    }

    async fn load(&self, id: &RequisitionId) -> Result<Requisition, ApplicationError> {
        self.repositories
            .requisitions
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("requisition", &id.0))
    }

    async fn recipients<'a>(
        &self,
        user_ids: impl IntoIterator<Item = &'a UserId>,
    ) -> Vec<Recipient> {
        let mut recipients = Vec::new();
        for user_id in user_ids {
            match self.repositories.users.find_by_id(user_id).await {
                Ok(Some(user)) if user.active => recipients.push(Recipient::from(&user)),
                Ok(_) => {}
                Err(error) => warn!(
                    event_name = "notification.recipient_lookup_failed",
                    user_id = %user_id,
                    error = %error,
                    "skipping notification recipient"
                ),
            }
        }
        recipients
    }

    async fn active_with_role(&self, role: Role) -> Vec<Recipient> {
        match self.repositories.users.list_active_with_role(role).await {
            Ok(users) => users.iter().map(Recipient::from).collect(),
            Err(error) => {
                warn!(
                    event_name = "notification.recipient_lookup_failed",
                    role = role.as_str(),
                    error = %error,
                    "skipping role recipients"
                );
                Vec::new()
            }
        }
    }

    /// Best-effort delivery. Failures are logged and audited, never returned.
    async fn dispatch(&self, notification: Notification, audit: &AuditContext) {
        if notification.recipients.is_empty() {
            return;
        }

        let kind = notification.kind;
        let recipient_count = notification.recipients.len();
        match self.notifier.notify(notification).await {
            Ok(()) => self.audit.emit(
                audit
                    .event("notification.sent", AuditCategory::Notification, AuditOutcome::Success)
                    .with_metadata("kind", kind.as_str())
                    .with_metadata("recipients", recipient_count.to_string()),
            ),
            Err(error) => {
                warn!(
                    event_name = "notification.delivery_failed",
                    correlation_id = %audit.correlation_id,
                    kind = kind.as_str(),
                    error = %error,
                    "notification delivery failed"
                );
                self.audit.emit(
                    audit
                        .event(
                            "notification.failed",
                            AuditCategory::Notification,
                            AuditOutcome::Failed,
                        )
                        .with_metadata("kind", kind.as_str())
                        .with_metadata("error", error.to_string()),
                );
            }
        }
    }

    fn record_failure(
        &self,
        operation: &str,
        audit: &AuditContext,
        error: ApplicationError,
    ) -> ApplicationError {
        let (category, outcome) = match &error {
            ApplicationError::Forbidden(_) | ApplicationError::Unauthorized(_) => {
                (AuditCategory::Authorization, AuditOutcome::Rejected)
            }
            ApplicationError::Domain(DomainError::Transition(_)) => {
                (AuditCategory::Workflow, AuditOutcome::Rejected)
            }
            ApplicationError::Domain(DomainError::InvariantViolation(_))
            | ApplicationError::Configuration(_) => (AuditCategory::System, AuditOutcome::Failed),
            ApplicationError::Persistence(_) => (AuditCategory::Persistence, AuditOutcome::Failed),
            ApplicationError::Integration(_) => (AuditCategory::System, AuditOutcome::Failed),
            ApplicationError::Domain(_) | ApplicationError::NotFound { .. } => {
                (AuditCategory::Ingress, AuditOutcome::Rejected)
            }
        };

        self.audit.emit(
            audit
                .event(format!("{operation}_rejected"), category, outcome)
                .with_metadata("error", error.to_string()),
        );
        error
    }
}
