use advocado_core::config::{AppConfig, LogFormat};
use tracing_subscriber::EnvFilter;

use crate::commands::GlobalOptions;

/// Logs go to stderr so stdout stays machine-readable. Falls back to defaults when config is broken;
/// the command itself reports the config error.
pub fn init(global: &GlobalOptions) {
    let config = global.load_config().unwrap_or_default();
    let filter = EnvFilter::try_from_env("ADVOCADO_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config)));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

/// CLI output is JSON on stdout, so info-level chatter is limited to our own crates.
fn default_directive(config: &AppConfig) -> String {
    let level = config.logging.level.trim().to_ascii_lowercase();
    format!("warn,advocado_agent={level},advocado_memory={level},advocado_langbase={level},advocado_cli={level}")
}
