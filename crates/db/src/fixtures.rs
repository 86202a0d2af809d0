use sqlx::Executor;

use reqflow_core::domain::user::Role;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Canonical demo users and the facts `verify` checks for each of them.
const SEED_USERS: &[SeedUserContract] = &[
    SeedUserContract {
        id: "u-admin",
        email: "admin@reqflow.test",
        roles: &[Role::Administrator],
        reporting_manager_id: None,
        token: "demo-token-admin",
        active: true,
    },
    SeedUserContract {
        id: "u-hr",
        email: "hr@reqflow.test",
        roles: &[Role::HrManager, Role::Employee],
        reporting_manager_id: None,
        token: "demo-token-hr",
        active: true,
    },
    SeedUserContract {
        id: "u-mgr",
        email: "manager@reqflow.test",
        roles: &[Role::Manager, Role::Employee],
        reporting_manager_id: None,
        token: "demo-token-manager",
        active: true,
    },
    SeedUserContract {
        id: "u-mgr-2",
        email: "manager2@reqflow.test",
        roles: &[Role::Manager, Role::Employee],
        reporting_manager_id: None,
        token: "demo-token-manager-2",
        active: true,
    },
    SeedUserContract {
        id: "u-emp",
        email: "employee@reqflow.test",
        roles: &[Role::Employee],
        reporting_manager_id: Some("u-mgr"),
        token: "demo-token-employee",
        active: true,
    },
    SeedUserContract {
        id: "u-emp-2",
        email: "employee2@reqflow.test",
        roles: &[Role::Employee],
        reporting_manager_id: Some("u-mgr-2"),
        token: "demo-token-employee-2",
        active: true,
    },
    SeedUserContract {
        id: "u-former",
        email: "former@reqflow.test",
        roles: &[Role::Employee],
        reporting_manager_id: Some("u-mgr"),
        token: "demo-token-former",
        active: false,
    },
];

const SEED_ACTIVE_ASSET_TYPES: &[&str] = &["laptop", "monitor", "phone", "headset"];
const SEED_INACTIVE_ASSET_TYPES: &[&str] = &["pager"];

/// Demo directory for local runs and end-to-end tests.
///
/// Loads one administrator, one HR manager, two managers with a direct report
/// each, and an inactive former employee, together with a bearer token per
/// user and a small asset-type catalog.
pub struct DemoDirectory;

impl DemoDirectory {
    /// SQL fixture content for the demo directory.
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_directory.sql");

    /// Load the demo directory into the database. Existing rows are kept.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::raw_sql(Self::SQL)).await?;
        tx.commit().await?;

        let users_seeded = SEED_USERS
            .iter()
            .map(|user| SeededUser {
                user_id: user.id,
                email: user.email,
                token: user.token,
                roles: user.roles.iter().map(Role::label).collect(),
                active: user.active,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult {
            users_seeded,
            asset_types_seeded: SEED_ACTIVE_ASSET_TYPES.len() + SEED_INACTIVE_ASSET_TYPES.len(),
        })
    }

    /// Verify that seed data exists and matches the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for user in SEED_USERS {
            let user_ok: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                    SELECT 1 FROM app_user
                    WHERE id = ?1 AND email = ?2 AND active = ?3
                      AND reporting_manager_id IS ?4
                 )",
            )
            .bind(user.id)
            .bind(user.email)
            .bind(user.active)
            .bind(user.reporting_manager_id)
            .fetch_one(pool)
            .await?;
            checks.push((user.id, user_ok == 1));

            let mut stored_roles: Vec<String> =
                sqlx::query_scalar("SELECT role FROM user_role WHERE user_id = ?1 ORDER BY role")
                    .bind(user.id)
                    .fetch_all(pool)
                    .await?;
            stored_roles.sort();
            let mut expected_roles =
                user.roles.iter().map(|role| role.as_str().to_string()).collect::<Vec<_>>();
            expected_roles.sort();
            checks.push((user.roles_label(), stored_roles == expected_roles));

            let token_ok: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM session_token WHERE token = ?1 AND user_id = ?2)",
            )
            .bind(user.token)
            .bind(user.id)
            .fetch_one(pool)
            .await?;
            checks.push((user.token, token_ok == 1));
        }

        for (ids, active) in [(SEED_ACTIVE_ASSET_TYPES, true), (SEED_INACTIVE_ASSET_TYPES, false)] {
            for id in ids {
                let asset_type_ok: i64 = sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM asset_type WHERE id = ?1 AND active = ?2)",
                )
                .bind(*id)
                .bind(active)
                .fetch_one(pool)
                .await?;
                checks.push((*id, asset_type_ok == 1));
            }
        }

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }
}

struct SeedUserContract {
    id: &'static str,
    email: &'static str,
    roles: &'static [Role],
    reporting_manager_id: Option<&'static str>,
    token: &'static str,
    active: bool,
}

impl SeedUserContract {
    fn roles_label(&self) -> &'static str {
        match self.id {
            "u-admin" => "u-admin-roles",
            "u-hr" => "u-hr-roles",
            "u-mgr" => "u-mgr-roles",
            "u-mgr-2" => "u-mgr-2-roles",
            "u-emp" => "u-emp-roles",
            "u-emp-2" => "u-emp-2-roles",
            _ => "u-former-roles",
        }
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub users_seeded: Vec<SeededUser>,
    pub asset_types_seeded: usize,
}

#[derive(Debug)]
pub struct SeededUser {
    pub user_id: &'static str,
    pub email: &'static str,
    pub token: &'static str,
    pub roles: Vec<&'static str>,
    pub active: bool,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
