use reqflow_db::{DemoDirectory, SeededUser};

use crate::commands::{load_config, migrated_pool, runtime, CommandResult, StepFailure};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = migrated_pool(&config).await?;

        let seeded = DemoDirectory::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoDirectory::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<_, StepFailure> = if verification.all_present {
            Ok(seeded)
        } else {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            Err(("seed_verification", verification_message(&failed_checks), 6u8))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(seeded) => {
            let lines = seeded.users_seeded.iter().map(describe_user).collect::<Vec<_>>();
            let message = format!(
                "demo directory loaded ({} users, {} asset types):\n{}",
                seeded.users_seeded.len(),
                seeded.asset_types_seeded,
                lines.join("\n")
            );
            CommandResult::success("seed", message)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn describe_user(user: &SeededUser) -> String {
    let state = if user.active { "" } else { ", inactive" };
    format!(
        "  - {} <{}> [{}{}] token: {}",
        user.user_id,
        user.email,
        user.roles.join(", "),
        state,
        user.token
    )
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
