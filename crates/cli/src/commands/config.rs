use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use reqflow_core::config::AppConfig;
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::{load_config, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("config") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    CommandResult { exit_code: 0, output: render(&config) }
}

fn render(config: &AppConfig) -> String {
    let file_path = detect_config_path();
    let file_doc = load_config_file_doc(file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, Some(env_key), file_doc.as_ref(), file_path.as_deref())
    };

    let webhook_token = config
        .notifications
        .auth_token
        .as_ref()
        .map(|token| redact_token(token.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    let fields: Vec<(&str, &str, String)> = vec![
        ("database.url", "REQFLOW_DATABASE_URL", config.database.url.clone()),
        (
            "database.max_connections",
            "REQFLOW_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        (
            "database.timeout_secs",
            "REQFLOW_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        ("server.bind_address", "REQFLOW_SERVER_BIND_ADDRESS", config.server.bind_address.clone()),
        ("server.port", "REQFLOW_SERVER_PORT", config.server.port.to_string()),
        (
            "server.graceful_shutdown_secs",
            "REQFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        (
            "workflow.manager_can_withdraw",
            "REQFLOW_WORKFLOW_MANAGER_CAN_WITHDRAW",
            config.workflow.manager_can_withdraw.to_string(),
        ),
        (
            "workflow.default_list_limit",
            "REQFLOW_WORKFLOW_DEFAULT_LIST_LIMIT",
            config.workflow.default_list_limit.to_string(),
        ),
        (
            "notifications.enabled",
            "REQFLOW_NOTIFICATIONS_ENABLED",
            config.notifications.enabled.to_string(),
        ),
        (
            "notifications.webhook_url",
            "REQFLOW_NOTIFICATIONS_WEBHOOK_URL",
            config.notifications.webhook_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        ("notifications.auth_token", "REQFLOW_NOTIFICATIONS_AUTH_TOKEN", webhook_token),
        (
            "notifications.timeout_secs",
            "REQFLOW_NOTIFICATIONS_TIMEOUT_SECS",
            config.notifications.timeout_secs.to_string(),
        ),
        ("logging.level", "REQFLOW_LOGGING_LEVEL", config.logging.level.clone()),
        ("logging.format", "REQFLOW_LOGGING_FORMAT", config.logging.format.as_str().to_string()),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        fields
            .into_iter()
            .map(|(key_path, env_key, value)| render_line(key_path, &value, source(key_path, env_key))),
    );
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("reqflow.toml"), PathBuf::from("config/reqflow.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var(env_key).is_ok_and(|value| !value.trim().is_empty()) {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps at most a short recognizable prefix of a secret.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once(['-', '_']) {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, field_source, redact_token};

    #[test]
    fn redaction_never_echoes_the_secret() {
        assert_eq!(redact_token("hook-abcdef123"), "hook-***");
        assert_eq!(redact_token("rqf_0123abcd"), "rqf-***");
        assert_eq!(redact_token("opaque"), "<redacted>");
        assert_eq!(redact_token("   "), "<empty>");
    }

    #[test]
    fn file_values_are_attributed_to_the_file() {
        let doc: Value = "[workflow]\nmanager_can_withdraw = true\n".parse().expect("toml");

        assert!(contains_path(&doc, "workflow.manager_can_withdraw"));
        assert!(!contains_path(&doc, "workflow.default_list_limit"));
        assert_eq!(
            field_source(
                "workflow.manager_can_withdraw",
                Some("REQFLOW_TEST_UNSET_SOURCE_KEY"),
                Some(&doc),
                Some(std::path::Path::new("reqflow.toml")),
            ),
            "file (reqflow.toml)"
        );
        assert_eq!(
            field_source("server.port", Some("REQFLOW_TEST_UNSET_SOURCE_KEY"), Some(&doc), None),
            "default"
        );
    }
}
