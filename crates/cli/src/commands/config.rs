use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use mystyle_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, value, env_key) in effective_values(&config) {
        lines.push(render_line(
            &key_path,
            &value,
            field_source(
                &key_path,
                env_key.as_deref(),
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            ),
        ));
    }

    lines.join("\n")
}

fn effective_values(config: &AppConfig) -> Vec<(String, String, Option<String>)> {
    let mut values = vec![
        entry("database.url", config.database.url.clone(), "MYSTYLE_DATABASE_URL"),
        entry(
            "database.max_connections",
            config.database.max_connections.to_string(),
            "MYSTYLE_DATABASE_MAX_CONNECTIONS",
        ),
        entry(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            "MYSTYLE_DATABASE_TIMEOUT_SECS",
        ),
        entry("server.bind_address", config.server.bind_address.clone(), "MYSTYLE_SERVER_BIND_ADDRESS"),
        entry("server.port", config.server.port.to_string(), "MYSTYLE_SERVER_PORT"),
        entry(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            "MYSTYLE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        ),
        entry("logging.level", config.logging.level.clone(), "MYSTYLE_LOGGING_LEVEL"),
        entry("logging.format", format!("{:?}", config.logging.format), "MYSTYLE_LOGGING_FORMAT"),
        entry(
            "scoring.window_days",
            config.scoring.window_days.to_string(),
            "MYSTYLE_SCORING_WINDOW_DAYS",
        ),
        entry(
            "scoring.retention_days",
            config.scoring.retention_days.to_string(),
            "MYSTYLE_SCORING_RETENTION_DAYS",
        ),
        entry(
            "scoring.utc_offset_hours",
            config.scoring.utc_offset_hours.to_string(),
            "MYSTYLE_SCORING_UTC_OFFSET_HOURS",
        ),
    ];

    for (event_type, weight) in &config.scoring.weights {
        values.push((format!("scoring.weights.{event_type}"), weight.to_string(), None));
    }

    for key in config.signals.keys() {
        let Some(source) = config.signals.source(&key) else {
            continue;
        };
        let prefix = format!("MYSTYLE_SIGNALS_{}", key.as_str().to_ascii_uppercase());
        values.push(entry(
            &format!("signals.{key}.enabled"),
            source.enabled.to_string(),
            &format!("{prefix}_ENABLED"),
        ));
        values.push(entry(
            &format!("signals.{key}.ttl_secs"),
            source.ttl_secs.to_string(),
            &format!("{prefix}_TTL_SECS"),
        ));
        values.push(entry(
            &format!("signals.{key}.endpoint"),
            source.endpoint.as_deref().map(redact_endpoint).unwrap_or_else(|| "<unset>".to_string()),
            &format!("{prefix}_ENDPOINT"),
        ));
    }

    let location = &config.signals.weather_location;
    values.push((
        "signals.weather_location".to_string(),
        format!("{} ({}, {}) {}", location.name, location.latitude, location.longitude, location.timezone),
        None,
    ));
    values.push(entry(
        "session.trail_limit",
        config.session.trail_limit.to_string(),
        "MYSTYLE_SESSION_TRAIL_LIMIT",
    ));

    values
}

fn entry(key_path: &str, value: String, env_key: &str) -> (String, String, Option<String>) {
    (key_path.to_string(), value, Some(env_key.to_string()))
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("mystyle.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/mystyle.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
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
        if env::var_os(env_key).is_some() {
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

/// Query strings on operator endpoints tend to carry API keys.
fn redact_endpoint(endpoint: &str) -> String {
    match endpoint.split_once('?') {
        Some((base, _)) => format!("{base}?<redacted>"),
        None => endpoint.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use mystyle_core::config::AppConfig;
    use toml::Value;

    use super::{contains_path, effective_values, field_source, redact_endpoint};

    #[test]
    fn endpoint_query_strings_are_redacted() {
        assert_eq!(
            redact_endpoint("https://trends.example/api?key=secret"),
            "https://trends.example/api?<redacted>"
        );
        assert_eq!(redact_endpoint("https://trends.example/api"), "https://trends.example/api");
    }

    #[test]
    fn file_values_are_attributed_to_the_file() {
        let doc = "[scoring]\nwindow_days = 5\n".parse::<Value>().expect("toml");

        assert!(contains_path(&doc, "scoring.window_days"));
        assert!(!contains_path(&doc, "scoring.retention_days"));
        assert_eq!(
            field_source("scoring.window_days", None, Some(&doc), None),
            "file (config file)"
        );
        assert_eq!(field_source("scoring.retention_days", None, Some(&doc), None), "default");
    }

    #[test]
    fn every_signal_key_is_listed() {
        let values = effective_values(&AppConfig::default());
        let keys = values.iter().map(|(key, _, _)| key.as_str()).collect::<Vec<_>>();

        for key in ["signals.trends.enabled", "signals.weather.ttl_secs", "signals.wiki.endpoint"] {
            assert!(keys.contains(&key), "missing `{key}`");
        }
        assert!(keys.contains(&"scoring.weights.save"));
    }
}
