use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use reqflow_core::domain::user::{Role, RoleSet, User, UserId};

use super::{RepositoryError, SessionToken, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_roles(&self, user_id: &str) -> Result<RoleSet, RepositoryError> {
        let rows = sqlx::query("SELECT role FROM user_role WHERE user_id = ? ORDER BY role")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let raw: String = row.try_get("role")?;
                Role::parse(&raw)
                    .ok_or_else(|| RepositoryError::Decode(format!("unknown role `{raw}`")))
            })
            .collect()
    }

    async fn hydrate(&self, row: Option<SqliteRow>) -> Result<Option<User>, RepositoryError> {
        let Some(row) = row else {
            return Ok(None);
        };
        let id: String = row.try_get("id")?;
        let roles = self.load_roles(&id).await?;
        user_from_row(&row, roles).map(Some)
    }
}

const USER_COLUMNS: &str = "id, display_name, email, reporting_manager_id, active, created_at";

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM app_user WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        self.hydrate(row).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM app_user WHERE email = ?"))
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await?;

        self.hydrate(row).await
    }

    async fn find_by_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                u.id,
                u.display_name,
                u.email,
                u.reporting_manager_id,
                u.active,
                u.created_at,
                t.expires_at
             FROM session_token t
             JOIN app_user u ON u.id = t.user_id
             WHERE t.token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let expires_at: Option<String> = row.try_get("expires_at")?;
        if let Some(expires_at) = expires_at.as_deref().map(parse_timestamp).transpose()? {
            if expires_at <= now {
                return Ok(None);
            }
        }

        self.hydrate(Some(row)).await
    }

    async fn list_active_with_role(&self, role: Role) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT u.id, u.display_name, u.email, u.reporting_manager_id, u.active, u.created_at
             FROM app_user u
             JOIN user_role r ON r.user_id = u.id
             WHERE r.role = ? AND u.active = 1
             ORDER BY u.display_name ASC",
        )
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut users = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(user) = self.hydrate(Some(row)).await? {
                users.push(user);
            }
        }
        Ok(users)
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO app_user (id, display_name, email, reporting_manager_id, active, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                email = excluded.email,
                reporting_manager_id = excluded.reporting_manager_id,
                active = excluded.active",
        )
        .bind(&user.id.0)
        .bind(&user.display_name)
        .bind(&user.email)
        .bind(user.reporting_manager_id.as_ref().map(|id| id.0.as_str()))
        .bind(user.active)
        .bind(format_timestamp(user.created_at))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM user_role WHERE user_id = ?")
            .bind(&user.id.0)
            .execute(&mut *tx)
            .await?;
        for role in user.roles.iter() {
            sqlx::query("INSERT INTO user_role (user_id, role) VALUES (?, ?)")
                .bind(&user.id.0)
                .bind(role.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn issue_token(&self, token: SessionToken) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO session_token (token, user_id, issued_at, expires_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(token) DO UPDATE SET
                user_id = excluded.user_id,
                issued_at = excluded.issued_at,
                expires_at = excluded.expires_at",
        )
        .bind(&token.token)
        .bind(&token.user_id.0)
        .bind(format_timestamp(token.issued_at))
        .bind(token.expires_at.map(format_timestamp))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn user_from_row(row: &SqliteRow, roles: RoleSet) -> Result<User, RepositoryError> {
    let reporting_manager_id: Option<String> = row.try_get("reporting_manager_id")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(User {
        id: UserId(row.try_get("id")?),
        display_name: row.try_get("display_name")?,
        email: row.try_get("email")?,
        roles,
        reporting_manager_id: reporting_manager_id.map(UserId),
        active: row.try_get("active")?,
        created_at: parse_timestamp(&created_at)?,
    })
}

/// Fixed-width UTC form so stored timestamps sort lexicographically.
pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp `{value}`: {error}")))
}
