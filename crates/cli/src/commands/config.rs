use std::env;
use std::fs;
use std::path::Path;

use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use signcfg_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

use crate::commands::CommandResult;

struct ConfigEntry {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run(options: LoadOptions) -> CommandResult {
    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let entries = effective_entries(&config);
    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    let mut details = Vec::with_capacity(entries.len());
    for entry in &entries {
        let source = field_source(
            entry.key,
            entry.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(entry.key, &entry.value, &source));
        details.push(json!({ "key": entry.key, "value": entry.value, "source": source }));
    }

    CommandResult::success_with("config", lines.join("\n"), json!(details))
}

fn effective_entries(config: &AppConfig) -> Vec<ConfigEntry> {
    vec![
        ConfigEntry {
            key: "database.url",
            env_keys: &["SIGNCFG_DATABASE_URL"],
            value: config.database.url.clone(),
        },
        ConfigEntry {
            key: "database.max_connections",
            env_keys: &["SIGNCFG_DATABASE_MAX_CONNECTIONS"],
            value: config.database.max_connections.to_string(),
        },
        ConfigEntry {
            key: "database.timeout_secs",
            env_keys: &["SIGNCFG_DATABASE_TIMEOUT_SECS"],
            value: config.database.timeout_secs.to_string(),
        },
        ConfigEntry {
            key: "host.base_url",
            env_keys: &["SIGNCFG_HOST_BASE_URL"],
            value: config.host.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        },
        ConfigEntry {
            key: "host.api_key",
            env_keys: &["SIGNCFG_HOST_API_KEY"],
            value: redact_secret(config.host.api_key.as_ref()),
        },
        ConfigEntry {
            key: "host.api_secret",
            env_keys: &["SIGNCFG_HOST_API_SECRET"],
            value: redact_secret(config.host.api_secret.as_ref()),
        },
        ConfigEntry {
            key: "host.timeout_secs",
            env_keys: &["SIGNCFG_HOST_TIMEOUT_SECS"],
            value: config.host.timeout_secs.to_string(),
        },
        ConfigEntry {
            key: "workflow.default_price_list",
            env_keys: &["SIGNCFG_WORKFLOW_DEFAULT_PRICE_LIST"],
            value: config.workflow.default_price_list.clone(),
        },
        ConfigEntry {
            key: "workflow.default_uom",
            env_keys: &["SIGNCFG_WORKFLOW_DEFAULT_UOM"],
            value: config.workflow.default_uom.clone(),
        },
        ConfigEntry {
            key: "workflow.default_currency",
            env_keys: &["SIGNCFG_WORKFLOW_DEFAULT_CURRENCY"],
            value: config.workflow.default_currency.clone(),
        },
        ConfigEntry {
            key: "workflow.default_qty",
            env_keys: &["SIGNCFG_WORKFLOW_DEFAULT_QTY"],
            value: config.workflow.default_qty.to_string(),
        },
        ConfigEntry {
            key: "workflow.pricing_model",
            env_keys: &["SIGNCFG_WORKFLOW_PRICING_MODEL"],
            value: config.workflow.pricing_model.to_string(),
        },
        ConfigEntry {
            key: "logging.level",
            env_keys: &["SIGNCFG_LOGGING_LEVEL", "SIGNCFG_LOG_LEVEL"],
            value: config.logging.level.clone(),
        },
        ConfigEntry {
            key: "logging.format",
            env_keys: &["SIGNCFG_LOGGING_FORMAT", "SIGNCFG_LOG_FORMAT"],
            value: format!("{:?}", config.logging.format).to_ascii_lowercase(),
        },
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
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

fn render_line(key: &str, value: &str, source: &str) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    match secret.map(|secret| secret.expose_secret().trim().is_empty()) {
        None => "<unset>".to_string(),
        Some(true) => "<empty>".to_string(),
        Some(false) => "<redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::{contains_path, redact_secret};

    #[test]
    fn secrets_are_never_rendered() {
        assert_eq!(redact_secret(None), "<unset>");
        assert_eq!(redact_secret(Some(&SecretString::from(" ".to_owned()))), "<empty>");
        assert_eq!(redact_secret(Some(&SecretString::from("abc123".to_owned()))), "<redacted>");
    }

    #[test]
    fn dotted_paths_are_looked_up_in_file_tables() {
        let doc: toml::Value =
            "[host]\nbase_url = \"https://erp.example\"\n".parse().expect("toml");
        assert!(contains_path(&doc, "host.base_url"));
        assert!(!contains_path(&doc, "host.api_key"));
        assert!(!contains_path(&doc, "workflow.default_uom"));
    }
}
