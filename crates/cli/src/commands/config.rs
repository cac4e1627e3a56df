use std::env;
use std::path::PathBuf;

use loa_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line("database.url", &config.database.url, source("LOA_DATABASE_URL")));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("LOA_DATABASE_MAX_CONNECTIONS"),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("LOA_DATABASE_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("LOA_SERVER_BIND_ADDRESS"),
    ));
    lines.push(render_line("server.port", &config.server.port.to_string(), source("LOA_SERVER_PORT")));
    lines.push(render_line(
        "server.graceful_shutdown_secs",
        &config.server.graceful_shutdown_secs.to_string(),
        source("LOA_SERVER_GRACEFUL_SHUTDOWN_SECS"),
    ));
    let admin_token = config
        .server
        .admin_token
        .as_ref()
        .map(|token| redact(token.expose_secret()))
        .unwrap_or_else(|| "(unset)".to_string());
    lines.push(render_line("server.admin_token", &admin_token, source("LOA_SERVER_ADMIN_TOKEN")));

    lines.push(render_line(
        "audit.signing_key",
        &redact(config.audit.signing_key.expose_secret()),
        source("LOA_AUDIT_SIGNING_KEY"),
    ));

    lines.push(render_line("logging.level", &config.logging.level, source("LOA_LOGGING_LEVEL")));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format).to_ascii_lowercase(),
        source("LOA_LOGGING_FORMAT"),
    ));

    if let Some(path) = detect_config_path() {
        lines.push(format!("config file: {}", path.display()));
    } else {
        lines.push("config file: (none found)".to_string());
    }

    lines.join("\n")
}

fn render_line(key: &str, value: &str, source: &'static str) -> String {
    format!("  {key} = {value}  [{source}]")
}

fn source(env_key: &str) -> &'static str {
    match env::var(env_key) {
        Ok(value) if !value.trim().is_empty() => "env",
        _ => "file|default",
    }
}

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        return "(unset)".to_string();
    }
    let visible: String = secret.chars().take(4).collect();
    format!("{visible}*** ({} chars)", secret.len())
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("loa.toml"), PathBuf::from("config/loa.toml")]
        .into_iter()
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::redact;

    #[test]
    fn redaction_keeps_only_a_short_prefix() {
        let redacted = redact("super-secret-token");
        assert!(redacted.starts_with("supe***"));
        assert!(!redacted.contains("secret"));
    }

    #[test]
    fn empty_secret_renders_as_unset() {
        assert_eq!(redact(""), "(unset)");
    }
}
