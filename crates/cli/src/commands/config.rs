use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use advocado_core::config::{resolve_config_path, AppConfig};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

use crate::commands::GlobalOptions;

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Field {
    fn new(key: &'static str, value: impl Into<String>, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.into(), env_keys }
    }
}

pub fn run(global: &GlobalOptions) -> String {
    let config = match global.load_config() {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(global.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }
    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let optional = |value: &Option<String>| value.clone().unwrap_or_else(|| "<unset>".to_string());
    let optional_path =
        |value: &Option<PathBuf>| value.as_ref().map_or("<unset>".to_string(), |path| path.display().to_string());

    vec![
        Field::new(
            "langbase.api_key",
            redact_secret(&config.langbase.api_key),
            &["ADVOCADO_LANGBASE_API_KEY", "LANGBASE_API_KEY"],
        ),
        Field::new("langbase.base_url", &config.langbase.base_url, &["ADVOCADO_LANGBASE_BASE_URL"]),
        Field::new("langbase.memory_name", &config.langbase.memory_name, &["ADVOCADO_LANGBASE_MEMORY_NAME"]),
        Field::new("langbase.pipe_name", &config.langbase.pipe_name, &["ADVOCADO_LANGBASE_PIPE_NAME"]),
        Field::new("llm.model", &config.llm.model, &["ADVOCADO_LLM_MODEL"]),
        Field::new("llm.timeout_secs", config.llm.timeout_secs.to_string(), &["ADVOCADO_LLM_TIMEOUT_SECS"]),
        Field::new("persona.full_name", &config.persona.full_name, &["ADVOCADO_PERSONA_FULL_NAME"]),
        Field::new("persona.short_name", &config.persona.short_name, &["ADVOCADO_PERSONA_SHORT_NAME"]),
        Field::new("persona.site_url", &config.persona.site_url, &["ADVOCADO_PERSONA_SITE_URL"]),
        Field::new(
            "memory.manifest_path",
            optional_path(&config.memory.manifest_path),
            &["ADVOCADO_MEMORY_MANIFEST_PATH"],
        ),
        Field::new(
            "memory.docs_root",
            config.memory.docs_root.display().to_string(),
            &["ADVOCADO_MEMORY_DOCS_ROOT"],
        ),
        Field::new(
            "memory.retrieval_top_k",
            config.memory.retrieval_top_k.to_string(),
            &["ADVOCADO_MEMORY_RETRIEVAL_TOP_K"],
        ),
        Field::new("email.endpoint", optional(&config.email.endpoint), &["ADVOCADO_EMAIL_ENDPOINT"]),
        Field::new(
            "email.api_key",
            config.email.api_key.as_ref().map_or("<unset>".to_string(), redact_secret),
            &["ADVOCADO_EMAIL_API_KEY"],
        ),
        Field::new("email.recipient", optional(&config.email.recipient), &["ADVOCADO_EMAIL_RECIPIENT"]),
        Field::new("server.bind_address", &config.server.bind_address, &["ADVOCADO_SERVER_BIND_ADDRESS"]),
        Field::new("server.port", config.server.port.to_string(), &["ADVOCADO_SERVER_PORT"]),
        Field::new(
            "server.session_idle_secs",
            config.server.session_idle_secs.to_string(),
            &["ADVOCADO_SERVER_SESSION_IDLE_SECS"],
        ),
        Field::new(
            "logging.level",
            &config.logging.level,
            &["ADVOCADO_LOGGING_LEVEL", "ADVOCADO_LOG_LEVEL"],
        ),
        Field::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["ADVOCADO_LOGGING_FORMAT", "ADVOCADO_LOG_FORMAT"],
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

/// Keeps a short key prefix such as `lb-` and hides the rest.
fn redact_secret(secret: &SecretString) -> String {
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.split_once('-') {
        Some((prefix, _)) if prefix.len() <= 8 => format!("{prefix}-***"),
        _ => "<redacted>".to_string(),
    }
}
