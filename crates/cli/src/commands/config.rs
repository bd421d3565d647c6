use std::env;
use std::fs;
use std::path::Path;

use toml::Value;
use tripgate_core::config::{resolve_config_path, AppConfig, LoadOptions};

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key_path,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key_path, &field.value, source));
    }

    lines.join("\n")
}

struct EffectiveField {
    key_path: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

fn effective_fields(config: &AppConfig) -> Vec<EffectiveField> {
    let field = |key_path: &'static str, env_keys: &'static [&'static str], value: String| {
        EffectiveField { key_path, env_keys, value }
    };

    vec![
        field("database.url", &["TRIPGATE_DATABASE_URL"], config.database.url.clone()),
        field(
            "database.max_connections",
            &["TRIPGATE_DATABASE_MAX_CONNECTIONS"],
            config.database.max_connections.to_string(),
        ),
        field(
            "database.timeout_secs",
            &["TRIPGATE_DATABASE_TIMEOUT_SECS"],
            config.database.timeout_secs.to_string(),
        ),
        field(
            "notifications.enabled",
            &["TRIPGATE_NOTIFICATIONS_ENABLED"],
            config.notifications.enabled.to_string(),
        ),
        field(
            "notifications.sender_address",
            &["TRIPGATE_NOTIFICATIONS_SENDER_ADDRESS"],
            config.notifications.sender_address.clone(),
        ),
        field(
            "notifications.subject_prefix",
            &["TRIPGATE_NOTIFICATIONS_SUBJECT_PREFIX"],
            config.notifications.subject_prefix.clone(),
        ),
        field(
            "notifications.portal_base_url",
            &["TRIPGATE_NOTIFICATIONS_PORTAL_BASE_URL"],
            config.notifications.portal_base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        field(
            "workflow.default_security_level",
            &["TRIPGATE_WORKFLOW_DEFAULT_SECURITY_LEVEL"],
            config.workflow.default_security_level.to_string(),
        ),
        field(
            "logging.level",
            &["TRIPGATE_LOGGING_LEVEL", "TRIPGATE_LOG_LEVEL"],
            config.logging.level.clone(),
        ),
        field(
            "logging.format",
            &["TRIPGATE_LOGGING_FORMAT", "TRIPGATE_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use toml::Value;
    use tripgate_core::config::AppConfig;

    use super::{contains_path, effective_fields, field_source};

    #[test]
    fn every_section_is_reported() {
        let fields = effective_fields(&AppConfig::default());
        for section in ["database.", "notifications.", "workflow.", "logging."] {
            assert!(
                fields.iter().any(|field| field.key_path.starts_with(section)),
                "missing section {section}"
            );
        }
    }

    #[test]
    fn nested_keys_are_found_in_the_file() {
        let doc: Value = "[workflow]\ndefault_security_level = 2\n".parse().expect("valid toml");
        assert!(contains_path(&doc, "workflow.default_security_level"));
        assert!(!contains_path(&doc, "workflow.missing"));
        assert!(!contains_path(&doc, "database.url"));
    }

    #[test]
    fn file_values_are_attributed_to_the_file() {
        let doc: Value = "[notifications]\nsubject_prefix = \"[Trips]\"\n".parse().expect("toml");
        let source = field_source(
            "notifications.subject_prefix",
            &["TRIPGATE_TEST_UNSET_SUBJECT_PREFIX"],
            Some(&doc),
            Some(Path::new("config/tripgate.toml")),
        );
        assert_eq!(source, "file (config/tripgate.toml)");

        let fallback = field_source(
            "notifications.sender_address",
            &["TRIPGATE_TEST_UNSET_SENDER"],
            Some(&doc),
            None,
        );
        assert_eq!(fallback, "default");
    }
}
