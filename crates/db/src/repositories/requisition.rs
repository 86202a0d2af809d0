use chrono::NaiveDate;
use sqlx::{sqlite::SqliteRow, Row};

use reqflow_core::domain::requisition::{
    RequestFor, RequestType, Requisition, RequisitionId, RequisitionStatus, StageDecision,
};
use reqflow_core::domain::user::UserId;
use reqflow_core::workflow::Stage;

use super::user::{format_timestamp, parse_timestamp};
use super::{
    CasOutcome, RepositoryError, RequisitionQuery, RequisitionRepository, StatusUpdate,
    VisibilityScope,
};
use crate::DbPool;

const REQUISITION_COLUMNS: &str = "id,
    requester_id,
    requester_name,
    request_type,
    asset_type_id,
    asset_type_name,
    request_for,
    team_member_id,
    team_member_name,
    justification,
    required_by,
    reason_for_return_or_replacement,
    asset_details,
    manager_id,
    manager_name,
    status,
    manager_actor_id,
    manager_actor_name,
    manager_reason,
    manager_decided_at,
    hr_actor_id,
    hr_actor_name,
    hr_reason,
    hr_decided_at,
    created_at,
    updated_at";

const REQUIRED_BY_FORMAT: &str = "%Y-%m-%d";

pub struct SqlRequisitionRepository {
    pool: DbPool,
}

impl SqlRequisitionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RequisitionRepository for SqlRequisitionRepository {
    async fn insert(&self, requisition: &Requisition) -> Result<(), RepositoryError> {
        let manager = requisition.manager_decision.as_ref();
        let hr = requisition.hr_decision.as_ref();

        sqlx::query(&format!(
            "INSERT INTO requisition ({REQUISITION_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&requisition.id.0)
        .bind(&requisition.requester_id.0)
        .bind(&requisition.requester_name)
        .bind(requisition.request_type.as_str())
        .bind(&requisition.asset_type_id)
        .bind(&requisition.asset_type_name)
        .bind(requisition.request_for.as_str())
        .bind(requisition.team_member_id.as_ref().map(|id| id.0.as_str()))
        .bind(requisition.team_member_name.as_deref())
        .bind(requisition.justification.as_deref())
        .bind(requisition.required_by.map(|date| date.format(REQUIRED_BY_FORMAT).to_string()))
        .bind(requisition.reason_for_return_or_replacement.as_deref())
        .bind(requisition.asset_details.as_deref())
        .bind(requisition.manager_id.as_ref().map(|id| id.0.as_str()))
        .bind(requisition.manager_name.as_deref())
        .bind(requisition.status.as_str())
        .bind(manager.map(|decision| decision.actor_id.0.as_str()))
        .bind(manager.map(|decision| decision.actor_name.as_str()))
        .bind(manager.map(|decision| decision.reason.as_str()))
        .bind(manager.map(|decision| format_timestamp(decision.decided_at)))
        .bind(hr.map(|decision| decision.actor_id.0.as_str()))
        .bind(hr.map(|decision| decision.actor_name.as_str()))
        .bind(hr.map(|decision| decision.reason.as_str()))
        .bind(hr.map(|decision| format_timestamp(decision.decided_at)))
        .bind(format_timestamp(requisition.created_at))
        .bind(format_timestamp(requisition.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &RequisitionId,
    ) -> Result<Option<Requisition>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {REQUISITION_COLUMNS} FROM requisition WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.map(requisition_from_row).transpose()
    }

    async fn list(&self, query: &RequisitionQuery) -> Result<Vec<Requisition>, RepositoryError> {
        let mut sql = format!("SELECT {REQUISITION_COLUMNS} FROM requisition WHERE 1 = 1");
        if matches!(query.scope, VisibilityScope::InvolvedUser(_)) {
            sql.push_str(" AND (requester_id = ? OR manager_id = ? OR team_member_id = ?)");
        }
        if query.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ?");

        let mut statement = sqlx::query(&sql);
        if let VisibilityScope::InvolvedUser(user_id) = &query.scope {
            statement = statement.bind(&user_id.0).bind(&user_id.0).bind(&user_id.0);
        }
        if let Some(status) = query.status {
            statement = statement.bind(status.as_str());
        }
        let rows = statement.bind(i64::from(query.limit)).fetch_all(&self.pool).await?;

        rows.into_iter().map(requisition_from_row).collect()
    }

    async fn compare_and_set(
        &self,
        update: StatusUpdate,
    ) -> Result<CasOutcome<Requisition>, RepositoryError> {
        let prefix = stage_prefix(update.stage);
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "UPDATE requisition SET
                status = ?,
                {prefix}_actor_id = ?,
                {prefix}_actor_name = ?,
                {prefix}_reason = ?,
                {prefix}_decided_at = ?,
                updated_at = ?
             WHERE id = ? AND status = ?
             RETURNING {REQUISITION_COLUMNS}"
        ))
        .bind(update.next.as_str())
        .bind(&update.decision.actor_id.0)
        .bind(&update.decision.actor_name)
        .bind(&update.decision.reason)
        .bind(format_timestamp(update.decision.decided_at))
        .bind(format_timestamp(update.decision.decided_at))
        .bind(&update.id.0)
        .bind(update.expected.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match row {
            Some(row) => CasOutcome::Applied(requisition_from_row(row)?),
            None => current_status(&mut tx, &update.id).await?,
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn delete_if_status(
        &self,
        id: &RequisitionId,
        expected: RequisitionStatus,
    ) -> Result<CasOutcome<()>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM requisition WHERE id = ? AND status = ?")
            .bind(&id.0)
            .bind(expected.as_str())
            .execute(&mut *tx)
            .await?;

        let outcome = if result.rows_affected() == 1 {
            CasOutcome::Applied(())
        } else {
            current_status(&mut tx, id).await?
        };

        tx.commit().await?;
        Ok(outcome)
    }
}

async fn current_status<T>(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    id: &RequisitionId,
) -> Result<CasOutcome<T>, RepositoryError> {
    let status: Option<String> = sqlx::query_scalar("SELECT status FROM requisition WHERE id = ?")
        .bind(&id.0)
        .fetch_optional(&mut **tx)
        .await?;

    match status {
        None => Ok(CasOutcome::Missing),
        Some(raw) => decode_status(&raw).map(CasOutcome::Stale),
    }
}

fn stage_prefix(stage: Stage) -> &'static str {
    match stage {
        Stage::Manager => "manager",
        Stage::Hr => "hr",
    }
}

fn decode_status(raw: &str) -> Result<RequisitionStatus, RepositoryError> {
    RequisitionStatus::ALL
        .into_iter()
        .find(|status| status.as_str() == raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown requisition status `{raw}`")))
}

fn decode_decision(
    row: &SqliteRow,
    prefix: &str,
) -> Result<Option<StageDecision>, RepositoryError> {
    let actor_id: Option<String> = row.try_get(format!("{prefix}_actor_id").as_str())?;
    let Some(actor_id) = actor_id else {
        return Ok(None);
    };

    let actor_name: Option<String> = row.try_get(format!("{prefix}_actor_name").as_str())?;
    let reason: Option<String> = row.try_get(format!("{prefix}_reason").as_str())?;
    let decided_at: Option<String> = row.try_get(format!("{prefix}_decided_at").as_str())?;
    let decided_at = decided_at.ok_or_else(|| {
        RepositoryError::Decode(format!("{prefix} decision by `{actor_id}` has no timestamp"))
    })?;

    Ok(Some(StageDecision {
        actor_id: UserId(actor_id),
        actor_name: actor_name.unwrap_or_default(),
        reason: reason.unwrap_or_default(),
        decided_at: parse_timestamp(&decided_at)?,
    }))
}

fn requisition_from_row(row: SqliteRow) -> Result<Requisition, RepositoryError> {
    let request_type: String = row.try_get("request_type")?;
    let request_for: String = row.try_get("request_for")?;
    let status: String = row.try_get("status")?;
    let required_by: Option<String> = row.try_get("required_by")?;
    let team_member_id: Option<String> = row.try_get("team_member_id")?;
    let manager_id: Option<String> = row.try_get("manager_id")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    let required_by = required_by
        .map(|value| {
            NaiveDate::parse_from_str(&value, REQUIRED_BY_FORMAT).map_err(|error| {
                RepositoryError::Decode(format!("invalid required_by `{value}`: {error}"))
            })
        })
        .transpose()?;

    Ok(Requisition {
        id: RequisitionId(row.try_get("id")?),
        requester_id: UserId(row.try_get("requester_id")?),
        requester_name: row.try_get("requester_name")?,
        request_type: RequestType::parse(&request_type).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown request type `{request_type}`"))
        })?,
        asset_type_id: row.try_get("asset_type_id")?,
        asset_type_name: row.try_get("asset_type_name")?,
        request_for: RequestFor::parse(&request_for).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown request target `{request_for}`"))
        })?,
        team_member_id: team_member_id.map(UserId),
        team_member_name: row.try_get("team_member_name")?,
        justification: row.try_get("justification")?,
        required_by,
        reason_for_return_or_replacement: row.try_get("reason_for_return_or_replacement")?,
        asset_details: row.try_get("asset_details")?,
        manager_id: manager_id.map(UserId),
        manager_name: row.try_get("manager_name")?,
        status: decode_status(&status)?,
        manager_decision: decode_decision(&row, "manager")?,
        hr_decision: decode_decision(&row, "hr")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use reqflow_core::domain::asset_type::AssetType;
    use reqflow_core::domain::requisition::{
        RequestFor, RequestType, Requisition, RequisitionId, RequisitionStatus, StageDecision,
    };
    use reqflow_core::domain::user::{Actor, Role, RoleSet, User, UserId};
    use reqflow_core::workflow::Stage;

    use super::SqlRequisitionRepository;
    use crate::repositories::{
        AssetTypeRepository, CasOutcome, RequisitionQuery, RequisitionRepository,
        SqlAssetTypeRepository, SqlUserRepository, StatusUpdate, UserRepository,
        VisibilityScope,
    };
    use crate::{connect_with_settings, migrations, DbPool};

    async fn seeded_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let users = SqlUserRepository::new(pool.clone());
        for (id, role) in [("mgr", Role::Manager), ("emp", Role::Employee), ("peer", Role::Employee)]
        {
            users
                .save(User {
                    id: UserId(id.to_string()),
                    display_name: id.to_string(),
                    email: format!("{id}@example.test"),
                    roles: RoleSet::new([role]),
                    reporting_manager_id: None,
                    active: true,
                    created_at: Utc::now(),
                })
                .await
                .expect("save user");
        }
        SqlAssetTypeRepository::new(pool.clone())
            .save(AssetType { id: "laptop".to_string(), name: "Laptop".to_string(), active: true })
            .await
            .expect("save asset type");

        pool
    }

    fn requisition(id: &str, requester: &str, offset_secs: i64) -> Requisition {
        let created_at = Utc::now() + Duration::seconds(offset_secs);
        Requisition {
            id: RequisitionId(id.to_string()),
            requester_id: UserId(requester.to_string()),
            requester_name: requester.to_string(),
            request_type: RequestType::Replacement,
            asset_type_id: "laptop".to_string(),
            asset_type_name: "Laptop".to_string(),
            request_for: RequestFor::Myself,
            team_member_id: None,
            team_member_name: None,
            justification: None,
            required_by: Some(created_at.date_naive()),
            reason_for_return_or_replacement: Some("cracked screen".to_string()),
            asset_details: Some("LT-0042".to_string()),
            manager_id: Some(UserId("mgr".to_string())),
            manager_name: Some("mgr".to_string()),
            status: RequisitionStatus::Pending,
            manager_decision: None,
            hr_decision: None,
            created_at,
            updated_at: created_at,
        }
    }

    fn manager_update(id: &str, expected: RequisitionStatus, next: RequisitionStatus) -> StatusUpdate {
        let actor = Actor {
            id: UserId("mgr".to_string()),
            display_name: "mgr".to_string(),
            roles: RoleSet::new([Role::Manager]),
        };
        StatusUpdate {
            id: RequisitionId(id.to_string()),
            expected,
            next,
            stage: Stage::Manager,
            decision: StageDecision::by(&actor, "looks fine", Utc::now()),
        }
    }

    #[tokio::test]
    async fn insert_and_find_round_trip() {
        let repo = SqlRequisitionRepository::new(seeded_pool().await);
        let original = requisition("REQ-1", "emp", 0);

        repo.insert(&original).await.expect("insert");
        let found = repo.find_by_id(&original.id).await.expect("find").expect("exists");

        assert_eq!(found.id, original.id);
        assert_eq!(found.status, RequisitionStatus::Pending);
        assert_eq!(found.required_by, original.required_by);
        assert_eq!(found.asset_details.as_deref(), Some("LT-0042"));
        assert!(found.manager_decision.is_none());
    }

    #[tokio::test]
    async fn compare_and_set_applies_once() {
        let repo = SqlRequisitionRepository::new(seeded_pool().await);
        repo.insert(&requisition("REQ-1", "emp", 0)).await.expect("insert");

        let first = repo
            .compare_and_set(manager_update(
                "REQ-1",
                RequisitionStatus::Pending,
                RequisitionStatus::ManagerApproved,
            ))
            .await
            .expect("first cas");
        let CasOutcome::Applied(updated) = first else {
            panic!("first transition should apply");
        };
        assert_eq!(updated.status, RequisitionStatus::ManagerApproved);
        assert_eq!(
            updated.manager_decision.as_ref().map(|decision| decision.reason.as_str()),
            Some("looks fine")
        );

        let second = repo
            .compare_and_set(manager_update(
                "REQ-1",
                RequisitionStatus::Pending,
                RequisitionStatus::ManagerRejected,
            ))
            .await
            .expect("second cas");
        assert_eq!(second, CasOutcome::Stale(RequisitionStatus::ManagerApproved));

        let missing = repo
            .compare_and_set(manager_update(
                "REQ-404",
                RequisitionStatus::Pending,
                RequisitionStatus::ManagerApproved,
            ))
            .await
            .expect("missing cas");
        assert_eq!(missing, CasOutcome::Missing);
    }

    #[tokio::test]
    async fn delete_if_status_is_conditional() {
        let repo = SqlRequisitionRepository::new(seeded_pool().await);
        repo.insert(&requisition("REQ-1", "emp", 0)).await.expect("insert");

        let stale = repo
            .delete_if_status(&RequisitionId("REQ-1".to_string()), RequisitionStatus::OnHold)
            .await
            .expect("stale delete");
        assert_eq!(stale, CasOutcome::Stale(RequisitionStatus::Pending));

        let deleted = repo
            .delete_if_status(&RequisitionId("REQ-1".to_string()), RequisitionStatus::Pending)
            .await
            .expect("delete");
        assert_eq!(deleted, CasOutcome::Applied(()));

        let again = repo
            .delete_if_status(&RequisitionId("REQ-1".to_string()), RequisitionStatus::Pending)
            .await
            .expect("repeat delete");
        assert_eq!(again, CasOutcome::Missing);
    }

    #[tokio::test]
    async fn odd_identifiers_are_plain_misses() {
        let repo = SqlRequisitionRepository::new(seeded_pool().await);
        repo.insert(&requisition("REQ-1", "emp", 0)).await.expect("insert");

        for id in [String::new(), "x".repeat(1000), "申請-ü".to_string(), "' OR 1=1 --".to_string()]
        {
            let outcome = repo
                .delete_if_status(&RequisitionId(id), RequisitionStatus::Pending)
                .await
                .expect("delete");
            assert_eq!(outcome, CasOutcome::Missing);
        }
        assert!(repo.find_by_id(&RequisitionId("REQ-1".to_string())).await.expect("find").is_some());
    }

    #[tokio::test]
    async fn listing_honors_scope_status_and_order() {
        let repo = SqlRequisitionRepository::new(seeded_pool().await);
        repo.insert(&requisition("REQ-old", "emp", -60)).await.expect("insert old");
        repo.insert(&requisition("REQ-new", "emp", 0)).await.expect("insert new");
        repo.insert(&requisition("REQ-peer", "peer", -30)).await.expect("insert peer");
        repo.compare_and_set(manager_update(
            "REQ-peer",
            RequisitionStatus::Pending,
            RequisitionStatus::OnHold,
        ))
        .await
        .expect("hold");

        let ids = |rows: Vec<Requisition>| rows.into_iter().map(|row| row.id.0).collect::<Vec<_>>();

        let all = repo
            .list(&RequisitionQuery { scope: VisibilityScope::All, status: None, limit: 10 })
            .await
            .expect("list all");
        assert_eq!(ids(all), vec!["REQ-new", "REQ-peer", "REQ-old"]);

        let mine = repo
            .list(&RequisitionQuery {
                scope: VisibilityScope::InvolvedUser(UserId("emp".to_string())),
                status: None,
                limit: 10,
            })
            .await
            .expect("list mine");
        assert_eq!(ids(mine), vec!["REQ-new", "REQ-old"]);

        let held = repo
            .list(&RequisitionQuery {
                scope: VisibilityScope::InvolvedUser(UserId("mgr".to_string())),
                status: Some(RequisitionStatus::OnHold),
                limit: 10,
            })
            .await
            .expect("list held");
        assert_eq!(ids(held), vec!["REQ-peer"]);

        let limited = repo
            .list(&RequisitionQuery { scope: VisibilityScope::All, status: None, limit: 1 })
            .await
            .expect("list limited");
        assert_eq!(limited.len(), 1);
    }
}
