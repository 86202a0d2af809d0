use std::env;
use std::sync::{Mutex, OnceLock};

use reqflow_cli::commands::{config, doctor, issue_token, migrate, seed};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("REQFLOW_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_invalid_override() {
    with_env(
        &[("REQFLOW_DATABASE_URL", "sqlite::memory:"), ("REQFLOW_SERVER_PORT", "eighty")],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 2, "expected config validation failure code");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["status"], "error");
            assert_eq!(payload["error_class"], "config_validation");
        },
    );
}

#[test]
fn seed_lists_demo_users_and_tokens() {
    with_env(&[("REQFLOW_DATABASE_URL", "sqlite::memory:")], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected seed success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.starts_with("demo directory loaded (7 users, 5 asset types):"));
        assert!(message.contains(
            "  - u-emp <employee@reqflow.test> [Employee] token: demo-token-employee"
        ));
        assert!(message.contains("[Employee, inactive] token: demo-token-former"));
    });
}

#[test]
fn seed_then_issue_token_against_a_file_database() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("reqflow.db").display());

    with_env(&[("REQFLOW_DATABASE_URL", url.as_str())], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed success: {}", first.output);
        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected idempotent reseed: {}", second.output);
        assert_eq!(
            parse_payload(&first.output)["message"],
            parse_payload(&second.output)["message"]
        );

        let issued = issue_token::run("employee@reqflow.test", Some(8));
        assert_eq!(issued.exit_code, 0, "expected token issue success: {}", issued.output);
        let payload = parse_payload(&issued.output);
        assert_eq!(payload["command"], "issue-token");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.starts_with("issued token for user u-emp (expires "));
        assert!(message.contains(issue_token::TOKEN_PREFIX));

        let inactive = issue_token::run("former@reqflow.test", None);
        assert_eq!(inactive.exit_code, 6);
        assert_eq!(parse_payload(&inactive.output)["error_class"], "user_verification");

        let unknown = issue_token::run("nobody@reqflow.test", None);
        assert_eq!(unknown.exit_code, 6);
    });
}

#[test]
fn config_redacts_the_webhook_token_and_attributes_env() {
    with_env(
        &[
            ("REQFLOW_DATABASE_URL", "sqlite::memory:"),
            ("REQFLOW_NOTIFICATIONS_ENABLED", "true"),
            ("REQFLOW_NOTIFICATIONS_WEBHOOK_URL", "https://hooks.example.test/reqflow"),
            ("REQFLOW_NOTIFICATIONS_AUTH_TOKEN", "hook-s3cr3t-value"),
        ],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0);
            assert!(!result.output.contains("s3cr3t"));
            assert!(result.output.contains(
                "- notifications.auth_token = hook-*** (source: env (REQFLOW_NOTIFICATIONS_AUTH_TOKEN))"
            ));
            assert!(result.output.contains(
                "- workflow.manager_can_withdraw = false (source: default)"
            ));
        },
    );
}

#[test]
fn config_reports_invalid_env_with_exit_code_two() {
    with_env(&[("REQFLOW_WORKFLOW_MANAGER_CAN_WITHDRAW", "sometimes")], || {
        let result = config::run();
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "config");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_passes_on_a_migrated_database() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("doctor.db").display());

    with_env(&[("REQFLOW_DATABASE_URL", url.as_str())], || {
        let before = doctor::run(true);
        assert_eq!(before.exit_code, 6, "unmigrated schema should fail: {}", before.output);

        assert_eq!(migrate::run().exit_code, 0);

        let after = doctor::run(true);
        assert_eq!(after.exit_code, 0, "expected doctor pass: {}", after.output);
        let report: Value = serde_json::from_str(&after.output).expect("doctor json");
        assert_eq!(report["overall_status"], "pass");
        let names: Vec<&str> = report["checks"]
            .as_array()
            .map(|checks| checks.iter().filter_map(|check| check["name"].as_str()).collect())
            .unwrap_or_else(Vec::new);
        assert_eq!(
            names,
            ["config_validation", "notification_readiness", "database_connectivity", "schema_migrations"]
        );
    });
}

#[test]
fn doctor_skips_database_checks_when_config_fails() {
    with_env(
        &[
            ("REQFLOW_DATABASE_URL", "sqlite::memory:"),
            ("REQFLOW_NOTIFICATIONS_ENABLED", "true"),
        ],
        || {
            let result = doctor::run(false);
            assert_eq!(result.exit_code, 6);
            assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
            assert!(result.output.contains("- [fail] config_validation:"));
            assert!(result.output.contains(
                "- [skip] database_connectivity: skipped because configuration did not load"
            ));
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "REQFLOW_DATABASE_URL",
        "REQFLOW_DATABASE_MAX_CONNECTIONS",
        "REQFLOW_DATABASE_TIMEOUT_SECS",
        "REQFLOW_SERVER_BIND_ADDRESS",
        "REQFLOW_SERVER_PORT",
        "REQFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "REQFLOW_WORKFLOW_MANAGER_CAN_WITHDRAW",
        "REQFLOW_WORKFLOW_DEFAULT_LIST_LIMIT",
        "REQFLOW_NOTIFICATIONS_ENABLED",
        "REQFLOW_NOTIFICATIONS_WEBHOOK_URL",
        "REQFLOW_NOTIFICATIONS_AUTH_TOKEN",
        "REQFLOW_NOTIFICATIONS_TIMEOUT_SECS",
        "REQFLOW_LOGGING_LEVEL",
        "REQFLOW_LOGGING_FORMAT",
        "REQFLOW_LOG_LEVEL",
        "REQFLOW_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
