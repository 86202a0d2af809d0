use chrono::{Duration, Utc};
use reqflow_db::repositories::SqlUserRepository;
use reqflow_db::{SessionToken, UserRepository};

use crate::commands::{load_config, migrated_pool, runtime, CommandResult, StepFailure};

pub const TOKEN_PREFIX: &str = "rqf_";

pub fn run(email: &str, ttl_hours: Option<i64>) -> CommandResult {
    let config = match load_config("issue-token") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("issue-token") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = migrated_pool(&config).await?;
        let users = SqlUserRepository::new(pool.clone());
        let issued = issue(&users, email, ttl_hours).await;
        pool.close().await;
        issued
    });

    match result {
        Ok(session) => {
            let expiry = session
                .expires_at
                .map(|at| format!("expires {}", at.to_rfc3339()))
                .unwrap_or_else(|| "never expires".to_string());
            CommandResult::success(
                "issue-token",
                format!("issued token for user {} ({expiry}): {}", session.user_id, session.token),
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("issue-token", error_class, message, exit_code)
        }
    }
}

async fn issue(
    users: &dyn UserRepository,
    email: &str,
    ttl_hours: Option<i64>,
) -> Result<SessionToken, StepFailure> {
    let user = users
        .find_by_email(email)
        .await
        .map_err(|error| ("user_lookup", error.to_string(), 5u8))?
        .ok_or_else(|| ("user_verification", format!("no user with email `{}`", email.trim()), 6u8))?;

    if !user.active {
        return Err(("user_verification", format!("user `{}` is inactive", user.id), 6u8));
    }

    let issued_at = Utc::now();
    let session = SessionToken {
        token: mint_token(),
        user_id: user.id,
        issued_at,
        expires_at: ttl_hours.map(|hours| issued_at + Duration::hours(hours)),
    };

    users
        .issue_token(session.clone())
        .await
        .map_err(|error| ("token_persistence", error.to_string(), 5u8))?;

    Ok(session)
}

fn mint_token() -> String {
    format!("{TOKEN_PREFIX}{}", uuid::Uuid::new_v4().simple())
}
