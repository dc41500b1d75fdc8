use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["advocado.toml", "config/advocado.toml"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub langbase: LangbaseConfig,
    pub llm: LlmConfig,
    pub persona: PersonaConfig,
    pub memory: MemoryConfig,
    pub email: EmailConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LangbaseConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub memory_name: String,
    pub pipe_name: String,
    pub pipe_description: String,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct PersonaConfig {
    pub full_name: String,
    pub short_name: String,
    pub role: String,
    pub site_url: String,
}

#[derive(Clone, Debug)]
pub struct MemoryConfig {
    pub manifest_path: Option<PathBuf>,
    pub docs_root: PathBuf,
    pub private_root: PathBuf,
    pub retrieval_top_k: usize,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<SecretString>,
    pub recipient: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    pub session_idle_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub langbase_api_key: Option<String>,
    pub memory_name: Option<String>,
    pub pipe_name: Option<String>,
    pub llm_model: Option<String>,
    pub manifest_path: Option<PathBuf>,
    pub docs_root: Option<PathBuf>,
    pub server_port: Option<u16>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            langbase: LangbaseConfig {
                api_key: String::new().into(),
                base_url: "https://api.langbase.com".to_string(),
                memory_name: "advocado-memory".to_string(),
                pipe_name: "advocado".to_string(),
                pipe_description: "The only avocado advocating for Steve".to_string(),
            },
            llm: LlmConfig {
                model: "openai:gpt-4.1-nano".to_string(),
                timeout_secs: 30,
                max_retries: 1,
            },
            persona: PersonaConfig {
                full_name: "Stevanus Satria".to_string(),
                short_name: "Steve".to_string(),
                role: "product manager with a software engineering background".to_string(),
                site_url: "https://stevanussatria.com".to_string(),
            },
            memory: MemoryConfig {
                manifest_path: None,
                docs_root: PathBuf::from("docs"),
                private_root: PathBuf::from("private"),
                retrieval_top_k: 5,
                timeout_secs: 15,
            },
            email: EmailConfig {
                endpoint: None,
                api_key: None,
                recipient: None,
                timeout_secs: 15,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
                session_idle_secs: 1_800,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(langbase) = patch.langbase {
            if let Some(api_key_value) = langbase.api_key {
                self.langbase.api_key = secret_value(api_key_value);
            }
            if let Some(base_url) = langbase.base_url {
                self.langbase.base_url = base_url;
            }
            if let Some(memory_name) = langbase.memory_name {
                self.langbase.memory_name = memory_name;
            }
            if let Some(pipe_name) = langbase.pipe_name {
                self.langbase.pipe_name = pipe_name;
            }
            if let Some(pipe_description) = langbase.pipe_description {
                self.langbase.pipe_description = pipe_description;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(persona) = patch.persona {
            if let Some(full_name) = persona.full_name {
                self.persona.full_name = full_name;
            }
            if let Some(short_name) = persona.short_name {
                self.persona.short_name = short_name;
            }
            if let Some(role) = persona.role {
                self.persona.role = role;
            }
            if let Some(site_url) = persona.site_url {
                self.persona.site_url = site_url;
            }
        }

        if let Some(memory) = patch.memory {
            if let Some(manifest_path) = memory.manifest_path {
                self.memory.manifest_path = Some(manifest_path);
            }
            if let Some(docs_root) = memory.docs_root {
                self.memory.docs_root = docs_root;
            }
            if let Some(private_root) = memory.private_root {
                self.memory.private_root = private_root;
            }
            if let Some(retrieval_top_k) = memory.retrieval_top_k {
                self.memory.retrieval_top_k = retrieval_top_k;
            }
            if let Some(timeout_secs) = memory.timeout_secs {
                self.memory.timeout_secs = timeout_secs;
            }
        }

        if let Some(email) = patch.email {
            if let Some(endpoint) = email.endpoint {
                self.email.endpoint = Some(endpoint);
            }
            if let Some(email_api_key_value) = email.api_key {
                self.email.api_key = Some(secret_value(email_api_key_value));
            }
            if let Some(recipient) = email.recipient {
                self.email.recipient = Some(recipient);
            }
            if let Some(timeout_secs) = email.timeout_secs {
                self.email.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
            if let Some(session_idle_secs) = server.session_idle_secs {
                self.server.session_idle_secs = session_idle_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let api_key =
            read_env("ADVOCADO_LANGBASE_API_KEY").or_else(|| read_env("LANGBASE_API_KEY"));
        if let Some(value) = api_key {
            self.langbase.api_key = secret_value(value);
        }
        if let Some(value) = read_env("ADVOCADO_LANGBASE_BASE_URL") {
            self.langbase.base_url = value;
        }
        if let Some(value) = read_env("ADVOCADO_LANGBASE_MEMORY_NAME") {
            self.langbase.memory_name = value;
        }
        if let Some(value) = read_env("ADVOCADO_LANGBASE_PIPE_NAME") {
            self.langbase.pipe_name = value;
        }
        if let Some(value) = read_env("ADVOCADO_LANGBASE_PIPE_DESCRIPTION") {
            self.langbase.pipe_description = value;
        }

        if let Some(value) = read_env("ADVOCADO_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("ADVOCADO_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("ADVOCADO_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("ADVOCADO_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("ADVOCADO_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("ADVOCADO_PERSONA_FULL_NAME") {
            self.persona.full_name = value;
        }
        if let Some(value) = read_env("ADVOCADO_PERSONA_SHORT_NAME") {
            self.persona.short_name = value;
        }
        if let Some(value) = read_env("ADVOCADO_PERSONA_SITE_URL") {
            self.persona.site_url = value;
        }

        if let Some(value) = read_env("ADVOCADO_MEMORY_MANIFEST_PATH") {
            self.memory.manifest_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("ADVOCADO_MEMORY_DOCS_ROOT") {
            self.memory.docs_root = PathBuf::from(value);
        }
        if let Some(value) = read_env("ADVOCADO_MEMORY_PRIVATE_ROOT") {
            self.memory.private_root = PathBuf::from(value);
        }
        if let Some(value) = read_env("ADVOCADO_MEMORY_RETRIEVAL_TOP_K") {
            self.memory.retrieval_top_k = parse_usize("ADVOCADO_MEMORY_RETRIEVAL_TOP_K", &value)?;
        }
        if let Some(value) = read_env("ADVOCADO_MEMORY_TIMEOUT_SECS") {
            self.memory.timeout_secs = parse_u64("ADVOCADO_MEMORY_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ADVOCADO_EMAIL_ENDPOINT") {
            self.email.endpoint = Some(value);
        }
        if let Some(value) = read_env("ADVOCADO_EMAIL_API_KEY") {
            self.email.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("ADVOCADO_EMAIL_RECIPIENT") {
            self.email.recipient = Some(value);
        }
        if let Some(value) = read_env("ADVOCADO_EMAIL_TIMEOUT_SECS") {
            self.email.timeout_secs = parse_u64("ADVOCADO_EMAIL_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ADVOCADO_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("ADVOCADO_SERVER_PORT") {
            self.server.port = parse_u16("ADVOCADO_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("ADVOCADO_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("ADVOCADO_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("ADVOCADO_SERVER_SESSION_IDLE_SECS") {
            self.server.session_idle_secs = parse_u64("ADVOCADO_SERVER_SESSION_IDLE_SECS", &value)?;
        }

        let log_level =
            read_env("ADVOCADO_LOGGING_LEVEL").or_else(|| read_env("ADVOCADO_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ADVOCADO_LOGGING_FORMAT").or_else(|| read_env("ADVOCADO_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(api_key) = overrides.langbase_api_key {
            self.langbase.api_key = secret_value(api_key);
        }
        if let Some(memory_name) = overrides.memory_name {
            self.langbase.memory_name = memory_name;
        }
        if let Some(pipe_name) = overrides.pipe_name {
            self.langbase.pipe_name = pipe_name;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(manifest_path) = overrides.manifest_path {
            self.memory.manifest_path = Some(manifest_path);
        }
        if let Some(docs_root) = overrides.docs_root {
            self.memory.docs_root = docs_root;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_langbase(&self.langbase)?;
        validate_llm(&self.llm)?;
        validate_persona(&self.persona)?;
        validate_memory(&self.memory)?;
        validate_email(&self.email)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Explicit path when it exists, otherwise the first default location found.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_FILES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{key} must start with http:// or https://")))
    }
}

fn validate_timeout(key: &str, timeout_secs: u64) -> Result<(), ConfigError> {
    if timeout_secs == 0 || timeout_secs > 300 {
        return Err(ConfigError::Validation(format!("{key} must be in range 1..=300")));
    }
    Ok(())
}

fn validate_langbase(langbase: &LangbaseConfig) -> Result<(), ConfigError> {
    if langbase.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "langbase.api_key is required. Set ADVOCADO_LANGBASE_API_KEY (or LANGBASE_API_KEY) with a key from https://langbase.com > Settings > API keys".to_string(),
        ));
    }
    validate_http_url("langbase.base_url", &langbase.base_url)?;

    if langbase.memory_name.trim().is_empty() {
        return Err(ConfigError::Validation("langbase.memory_name must not be empty".to_string()));
    }
    if langbase.pipe_name.trim().is_empty() {
        return Err(ConfigError::Validation("langbase.pipe_name must not be empty".to_string()));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    validate_timeout("llm.timeout_secs", llm.timeout_secs)?;

    let Some((provider, model)) = llm.model.split_once(':') else {
        return Err(ConfigError::Validation(format!(
            "llm.model `{}` must be written as `<provider>:<model>` (for example `openai:gpt-4.1-nano`)",
            llm.model
        )));
    };
    if provider.trim().is_empty() || model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.model must name both a provider and a model".to_string(),
        ));
    }

    Ok(())
}

fn validate_persona(persona: &PersonaConfig) -> Result<(), ConfigError> {
    if persona.full_name.trim().is_empty() || persona.short_name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "persona.full_name and persona.short_name must not be empty".to_string(),
        ));
    }
    validate_http_url("persona.site_url", &persona.site_url)
}

fn validate_memory(memory: &MemoryConfig) -> Result<(), ConfigError> {
    if memory.retrieval_top_k == 0 || memory.retrieval_top_k > 50 {
        return Err(ConfigError::Validation(
            "memory.retrieval_top_k must be in range 1..=50".to_string(),
        ));
    }
    validate_timeout("memory.timeout_secs", memory.timeout_secs)
}

fn validate_email(email: &EmailConfig) -> Result<(), ConfigError> {
    validate_timeout("email.timeout_secs", email.timeout_secs)?;
    if let Some(endpoint) = &email.endpoint {
        validate_http_url("email.endpoint", endpoint)?;
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    if !(60..=86_400).contains(&server.session_idle_secs) {
        return Err(ConfigError::Validation(
            "server.session_idle_secs must be between 60 and 86400".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    langbase: Option<LangbasePatch>,
    llm: Option<LlmPatch>,
    persona: Option<PersonaPatch>,
    memory: Option<MemoryPatch>,
    email: Option<EmailPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LangbasePatch {
    api_key: Option<String>,
    base_url: Option<String>,
    memory_name: Option<String>,
    pipe_name: Option<String>,
    pipe_description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct PersonaPatch {
    full_name: Option<String>,
    short_name: Option<String>,
    role: Option<String>,
    site_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MemoryPatch {
    manifest_path: Option<PathBuf>,
    docs_root: Option<PathBuf>,
    private_root: Option<PathBuf>,
    retrieval_top_k: Option<usize>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EmailPatch {
    endpoint: Option<String>,
    api_key: Option<String>,
    recipient: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    session_idle_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
