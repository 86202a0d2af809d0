use reqflow_core::config::AppConfig;
use reqflow_db::{connect_with_config, migrations, ping};
use serde::Serialize;

use crate::commands::{load_config, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 6 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match load_config("doctor") {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            checks.push(check_notification_readiness(&config));
            checks.extend(check_database(&config));
        }
        Err(failure) => {
            checks.push(DoctorCheck::fail("config_validation", failure.output));
            for name in ["notification_readiness", "database_connectivity", "schema_migrations"] {
                checks.push(DoctorCheck::skipped(name, "configuration did not load"));
            }
        }
    }

    summarize(checks)
}

fn summarize(checks: Vec<DoctorCheck>) -> DoctorReport {
    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_notification_readiness(config: &AppConfig) -> DoctorCheck {
    let notifications = &config.notifications;
    if !notifications.enabled {
        return DoctorCheck::pass(
            "notification_readiness",
            "notifications disabled; workflow events are only logged",
        );
    }

    match notifications.webhook_url.as_deref() {
        Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
            DoctorCheck::pass("notification_readiness", format!("webhook target `{url}`"))
        }
        Some(url) => DoctorCheck::fail(
            "notification_readiness",
            format!("webhook url `{url}` is not an http(s) url"),
        ),
        None => DoctorCheck::fail("notification_readiness", "webhook url is not set"),
    }
}

/// Connectivity first; schema state is only inspected on a live pool.
fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck::fail(
                    "database_connectivity",
                    format!("failed to initialize async runtime: {error}"),
                ),
                DoctorCheck::skipped("schema_migrations", "no async runtime"),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::fail(
                        "database_connectivity",
                        format!("failed to connect to database: {error}"),
                    ),
                    DoctorCheck::skipped("schema_migrations", "the database is unreachable"),
                ];
            }
        };

        let connectivity = match ping(&pool).await {
            Ok(()) => DoctorCheck::pass(
                "database_connectivity",
                format!("connected using `{}`", config.database.url),
            ),
            Err(error) => DoctorCheck::fail("database_connectivity", format!("ping failed: {error}")),
        };

        let schema = schema_check(
            migrations::schema_state(&pool)
                .await
                .map(|state| (state.applied, state.expected))
                .map_err(|error| error.to_string()),
        );

        pool.close().await;
        vec![connectivity, schema]
    })
}

fn schema_check(counts: Result<(i64, i64), String>) -> DoctorCheck {
    match counts {
        Ok((applied, expected)) if applied >= expected => DoctorCheck::pass(
            "schema_migrations",
            format!("{applied} of {expected} migrations applied"),
        ),
        Ok((applied, expected)) => DoctorCheck::fail(
            "schema_migrations",
            format!("{applied} of {expected} migrations applied; run `reqflow migrate`"),
        ),
        Err(_) => DoctorCheck::fail(
            "schema_migrations",
            "migration ledger not found; run `reqflow migrate`",
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::{render_human, schema_check, summarize, CheckStatus, DoctorCheck};

    #[test]
    fn pending_migrations_fail_the_schema_check() {
        assert_eq!(schema_check(Ok((2, 2))).status, CheckStatus::Pass);
        assert_eq!(schema_check(Ok((1, 2))).status, CheckStatus::Fail);
        assert_eq!(schema_check(Err("no such table".to_string())).status, CheckStatus::Fail);
    }

    #[test]
    fn any_skipped_check_fails_the_report() {
        let report = summarize(vec![
            DoctorCheck::pass("config_validation", "ok"),
            DoctorCheck::skipped("schema_migrations", "the database is unreachable"),
        ]);

        assert_eq!(report.overall_status, CheckStatus::Fail);
        let rendered = render_human(&report);
        assert!(rendered.starts_with("doctor: one or more readiness checks failed"));
        assert!(rendered.contains(
            "- [skip] schema_migrations: skipped because the database is unreachable"
        ));
    }
}
