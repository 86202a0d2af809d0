use chrono::Utc;
use serde::Deserialize;

use reqflow_core::domain::user::{Role, UserId};
use reqflow_db::repositories::{
    AssetTypeRepository, SqlAssetTypeRepository, SqlUserRepository, UserRepository,
};
use reqflow_db::{connect_with_settings, migrations, DemoDirectory, DbPool};

type SeedContractTestResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

#[derive(Debug, Deserialize)]
struct DirectoryContract {
    dataset: String,
    users: Vec<UserContract>,
    asset_types: Vec<AssetTypeContract>,
}

#[derive(Debug, Deserialize)]
struct UserContract {
    id: String,
    email: String,
    token: String,
    roles: Vec<Role>,
    reporting_manager_id: Option<String>,
    active: bool,
}

#[derive(Debug, Deserialize)]
struct AssetTypeContract {
    id: String,
    name: String,
    active: bool,
}

fn contract() -> SeedContractTestResult<DirectoryContract> {
    serde_json::from_str(include_str!("../../../config/fixtures/demo_directory_contract.json"))
        .map_err(|error| format!("contract JSON must parse: {error}"))
}

async fn seeded_pool() -> SeedContractTestResult<DbPool> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30)
        .await
        .map_err(|error| format!("connect: {error}"))?;
    migrations::run_pending(&pool).await.map_err(|error| format!("migrate: {error}"))?;
    DemoDirectory::load(&pool).await.map_err(|error| format!("load: {error}"))?;
    Ok(pool)
}

#[tokio::test]
async fn every_contract_user_resolves_by_token() -> SeedContractTestResult {
    let contract = contract()?;
    require!(contract.dataset == "demo_directory", "unexpected dataset {}", contract.dataset);

    let users = SqlUserRepository::new(seeded_pool().await?);
    let now = Utc::now();

    for expected in &contract.users {
        let user = users
            .find_by_token(&expected.token, now)
            .await
            .map_err(|error| format!("token lookup for {}: {error}", expected.id))?
            .ok_or_else(|| format!("token {} should resolve", expected.token))?;

        require!(user.id == UserId(expected.id.clone()), "token {} resolved to {}", expected.token, user.id);
        require!(user.email == expected.email, "email mismatch for {}", expected.id);
        require!(user.active == expected.active, "active flag mismatch for {}", expected.id);
        require!(
            user.reporting_manager_id.as_ref().map(|id| id.0.as_str())
                == expected.reporting_manager_id.as_deref(),
            "reporting line mismatch for {}",
            expected.id
        );
        for role in &expected.roles {
            require!(user.roles.contains(*role), "{} should hold {role}", expected.id);
        }
        require!(
            user.roles.iter().count() == expected.roles.len(),
            "{} holds unexpected roles",
            expected.id
        );
    }

    Ok(())
}

#[tokio::test]
async fn asset_catalog_matches_contract() -> SeedContractTestResult {
    let contract = contract()?;
    let asset_types = SqlAssetTypeRepository::new(seeded_pool().await?);

    for expected in &contract.asset_types {
        let stored = asset_types
            .find_by_id(&expected.id)
            .await
            .map_err(|error| format!("lookup {}: {error}", expected.id))?
            .ok_or_else(|| format!("asset type {} should exist", expected.id))?;
        require!(stored.name == expected.name, "name mismatch for {}", expected.id);
        require!(stored.active == expected.active, "active mismatch for {}", expected.id);
    }

    let active = asset_types.list_active().await.map_err(|error| error.to_string())?;
    let expected_active = contract.asset_types.iter().filter(|asset| asset.active).count();
    require!(active.len() == expected_active, "expected {expected_active} active asset types");

    Ok(())
}

#[tokio::test]
async fn verification_passes_after_load() -> SeedContractTestResult {
    let pool = seeded_pool().await?;
    let verification = DemoDirectory::verify(&pool).await.map_err(|error| error.to_string())?;
    require!(verification.all_present, "verification failed: {:?}", verification.checks);
    Ok(())
}
