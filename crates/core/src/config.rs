use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::domain::item::EventType;
use crate::domain::signal::SignalKey;
use crate::rules::{Dimension, RuleThresholds};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub scoring: ScoringConfig,
    pub signals: SignalsConfig,
    pub recommendations: RecommendationsConfig,
    pub session: SessionConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Debug)]
pub struct ScoringConfig {
    pub window_days: u32,
    pub retention_days: u32,
    pub utc_offset_hours: i32,
    pub weights: BTreeMap<EventType, i64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SignalSourceConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub refresh_interval_secs: Option<u64>,
    pub fetch_timeout_secs: u64,
    pub endpoint: Option<String>,
    pub synthetic_default: Option<Value>,
}

impl SignalSourceConfig {
    fn with_ttl(ttl_secs: u64) -> Self {
        Self {
            enabled: true,
            ttl_secs,
            refresh_interval_secs: None,
            fetch_timeout_secs: 8,
            endpoint: None,
            synthetic_default: None,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.unwrap_or(self.ttl_secs))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct WeatherLocation {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiArticle {
    pub article: String,
    #[serde(default = "default_wiki_lang")]
    pub lang: String,
}

fn default_wiki_lang() -> String {
    "en".to_string()
}

#[derive(Clone, Debug)]
pub struct SignalsConfig {
    pub trends: SignalSourceConfig,
    pub weather: SignalSourceConfig,
    pub wiki: SignalSourceConfig,
    pub weather_location: WeatherLocation,
    pub wiki_articles: BTreeMap<String, WikiArticle>,
}

impl SignalsConfig {
    pub fn source(&self, key: &SignalKey) -> Option<&SignalSourceConfig> {
        match key.as_str() {
            SignalKey::TRENDS => Some(&self.trends),
            SignalKey::WEATHER => Some(&self.weather),
            SignalKey::WIKI => Some(&self.wiki),
            _ => None,
        }
    }

    pub fn keys(&self) -> Vec<SignalKey> {
        vec![SignalKey::trends(), SignalKey::weather(), SignalKey::wiki()]
    }
}

#[derive(Clone, Debug)]
pub struct RecommendationsConfig {
    pub default_limit: usize,
    pub dimension_weights: BTreeMap<Dimension, u32>,
    pub keywords: BTreeMap<Dimension, Vec<String>>,
    pub thresholds: RuleThresholds,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub trail_limit: usize,
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
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
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

/// Payload served for `trends` when the upstream has never answered.
pub fn default_trends_synthetic() -> Value {
    json!({
        "value": 75,
        "synthetic": true,
        "related_keywords": [
            { "keyword": "秋コーデ メンズ", "value": 100 },
            { "keyword": "ニット ベスト", "value": 85 },
            { "keyword": "ワイドパンツ", "value": 70 },
            { "keyword": "カーディガン", "value": 60 },
            { "keyword": "セットアップ", "value": 50 }
        ]
    })
}

fn default_wiki_articles() -> BTreeMap<String, WikiArticle> {
    [
        ("ストリート", "Street_fashion"),
        ("ヴィンテージ", "Vintage_clothing"),
        ("Y2K", "Y2K_fashion"),
        ("ミニマリズム", "Minimalism"),
        ("ゴープコア", "Gorpcore"),
        ("サステナブル", "Sustainable_fashion"),
        ("モード", "High_fashion"),
        ("韓国ファッション", "Korean_fashion"),
    ]
    .into_iter()
    .map(|(label, article)| {
        (label.to_string(), WikiArticle { article: article.to_string(), lang: default_wiki_lang() })
    })
    .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut trends = SignalSourceConfig::with_ttl(60 * 60);
        trends.synthetic_default = Some(default_trends_synthetic());

        Self {
            database: DatabaseConfig {
                url: "sqlite://mystyle.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            scoring: ScoringConfig {
                window_days: 7,
                retention_days: 14,
                utc_offset_hours: 9,
                weights: [(EventType::View, 1), (EventType::Click, 3), (EventType::Save, 7)]
                    .into_iter()
                    .collect(),
            },
            signals: SignalsConfig {
                trends,
                weather: SignalSourceConfig::with_ttl(60 * 60),
                wiki: SignalSourceConfig::with_ttl(6 * 60 * 60),
                weather_location: WeatherLocation {
                    name: "Nagoya".to_string(),
                    latitude: 35.183334,
                    longitude: 136.899994,
                    timezone: "Asia/Tokyo".to_string(),
                },
                wiki_articles: default_wiki_articles(),
            },
            recommendations: RecommendationsConfig {
                default_limit: 10,
                dimension_weights: [
                    (Dimension::Waterproof, 3),
                    (Dimension::Outer, 2),
                    (Dimension::Windproof, 2),
                    (Dimension::Layering, 1),
                    (Dimension::Breathable, 2),
                ]
                .into_iter()
                .collect(),
                keywords: Dimension::ALL
                    .into_iter()
                    .map(|dimension| {
                        let words = dimension
                            .default_keywords()
                            .iter()
                            .map(|word| word.to_string())
                            .collect();
                        (dimension, words)
                    })
                    .collect(),
                thresholds: RuleThresholds::default(),
            },
            session: SessionConfig { trail_limit: 20 },
        }
    }
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("mystyle.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
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
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(scoring) = patch.scoring {
            if let Some(window_days) = scoring.window_days {
                self.scoring.window_days = window_days;
            }
            if let Some(retention_days) = scoring.retention_days {
                self.scoring.retention_days = retention_days;
            }
            if let Some(utc_offset_hours) = scoring.utc_offset_hours {
                self.scoring.utc_offset_hours = utc_offset_hours;
            }
            if let Some(weights) = scoring.weights {
                self.scoring.weights.extend(weights);
            }
        }

        if let Some(signals) = patch.signals {
            if let Some(trends) = signals.trends {
                trends.apply_to(&mut self.signals.trends);
            }
            if let Some(weather) = signals.weather {
                weather.source.apply_to(&mut self.signals.weather);
                let location = &mut self.signals.weather_location;
                if let Some(name) = weather.location_name {
                    location.name = name;
                }
                if let Some(latitude) = weather.latitude {
                    location.latitude = latitude;
                }
                if let Some(longitude) = weather.longitude {
                    location.longitude = longitude;
                }
                if let Some(timezone) = weather.timezone {
                    location.timezone = timezone;
                }
            }
            if let Some(wiki) = signals.wiki {
                wiki.source.apply_to(&mut self.signals.wiki);
                if let Some(articles) = wiki.articles {
                    self.signals.wiki_articles = articles
                        .into_iter()
                        .map(|(label, spec)| (label, spec.into_article()))
                        .collect();
                }
            }
        }

        if let Some(recommendations) = patch.recommendations {
            if let Some(default_limit) = recommendations.default_limit {
                self.recommendations.default_limit = default_limit;
            }
            if let Some(weights) = recommendations.dimension_weights {
                self.recommendations.dimension_weights.extend(weights);
            }
            if let Some(keywords) = recommendations.keywords {
                self.recommendations.keywords.extend(keywords);
            }
            if let Some(thresholds) = recommendations.thresholds {
                let target = &mut self.recommendations.thresholds;
                if let Some(value) = thresholds.precip_prob_min {
                    target.precip_prob_min = value;
                }
                if let Some(value) = thresholds.cold_max_temp {
                    target.cold_max_temp = value;
                }
                if let Some(value) = thresholds.wind_min {
                    target.wind_min = value;
                }
                if let Some(value) = thresholds.temp_swing_min {
                    target.temp_swing_min = value;
                }
                if let Some(value) = thresholds.hot_max_temp {
                    target.hot_max_temp = value;
                }
            }
        }

        if let Some(session) = patch.session {
            if let Some(trail_limit) = session.trail_limit {
                self.session.trail_limit = trail_limit;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("MYSTYLE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("MYSTYLE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("MYSTYLE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("MYSTYLE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("MYSTYLE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("MYSTYLE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("MYSTYLE_SERVER_PORT") {
            self.server.port = parse_env("MYSTYLE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("MYSTYLE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("MYSTYLE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("MYSTYLE_LOGGING_LEVEL").or_else(|| read_env("MYSTYLE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("MYSTYLE_LOGGING_FORMAT").or_else(|| read_env("MYSTYLE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        if let Some(value) = read_env("MYSTYLE_SCORING_WINDOW_DAYS") {
            self.scoring.window_days = parse_env("MYSTYLE_SCORING_WINDOW_DAYS", &value)?;
        }
        if let Some(value) = read_env("MYSTYLE_SCORING_RETENTION_DAYS") {
            self.scoring.retention_days = parse_env("MYSTYLE_SCORING_RETENTION_DAYS", &value)?;
        }
        if let Some(value) = read_env("MYSTYLE_SCORING_UTC_OFFSET_HOURS") {
            self.scoring.utc_offset_hours =
                parse_env("MYSTYLE_SCORING_UTC_OFFSET_HOURS", &value)?;
        }

        for (prefix, source) in [
            ("MYSTYLE_SIGNALS_TRENDS", &mut self.signals.trends),
            ("MYSTYLE_SIGNALS_WEATHER", &mut self.signals.weather),
            ("MYSTYLE_SIGNALS_WIKI", &mut self.signals.wiki),
        ] {
            let key = format!("{prefix}_ENABLED");
            if let Some(value) = read_env(&key) {
                source.enabled = parse_env(&key, &value)?;
            }
            let key = format!("{prefix}_TTL_SECS");
            if let Some(value) = read_env(&key) {
                source.ttl_secs = parse_env(&key, &value)?;
            }
            let key = format!("{prefix}_REFRESH_INTERVAL_SECS");
            if let Some(value) = read_env(&key) {
                source.refresh_interval_secs = Some(parse_env(&key, &value)?);
            }
            if let Some(value) = read_env(&format!("{prefix}_ENDPOINT")) {
                source.endpoint = Some(value);
            }
        }

        if let Some(value) = read_env("MYSTYLE_SESSION_TRAIL_LIMIT") {
            self.session.trail_limit = parse_env("MYSTYLE_SESSION_TRAIL_LIMIT", &value)?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        validate_scoring(&self.scoring)?;
        validate_signals(&self.signals)?;
        validate_recommendations(&self.recommendations)?;
        validate_session(&self.session)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("mystyle.toml"), PathBuf::from("config/mystyle.toml")]
        .into_iter()
        .find(|path| path.exists())
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

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
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

fn validate_scoring(scoring: &ScoringConfig) -> Result<(), ConfigError> {
    if scoring.window_days == 0 {
        return Err(ConfigError::Validation(
            "scoring.window_days must be greater than zero".to_string(),
        ));
    }

    if scoring.retention_days < scoring.window_days {
        return Err(ConfigError::Validation(format!(
            "scoring.retention_days ({}) must be at least scoring.window_days ({})",
            scoring.retention_days, scoring.window_days
        )));
    }

    if !(-12..=14).contains(&scoring.utc_offset_hours) {
        return Err(ConfigError::Validation(
            "scoring.utc_offset_hours must be in range -12..=14".to_string(),
        ));
    }

    if let Some((event_type, weight)) = scoring.weights.iter().find(|(_, weight)| **weight < 0) {
        return Err(ConfigError::Validation(format!(
            "scoring.weights.{event_type} must not be negative (got {weight})"
        )));
    }

    Ok(())
}

fn validate_signals(signals: &SignalsConfig) -> Result<(), ConfigError> {
    for (name, source) in
        [("trends", &signals.trends), ("weather", &signals.weather), ("wiki", &signals.wiki)]
    {
        if source.ttl_secs == 0 {
            return Err(ConfigError::Validation(format!(
                "signals.{name}.ttl_secs must be greater than zero"
            )));
        }
        if source.refresh_interval_secs == Some(0) {
            return Err(ConfigError::Validation(format!(
                "signals.{name}.refresh_interval_secs must be greater than zero"
            )));
        }
        if source.fetch_timeout_secs == 0 || source.fetch_timeout_secs > 120 {
            return Err(ConfigError::Validation(format!(
                "signals.{name}.fetch_timeout_secs must be in range 1..=120"
            )));
        }
        if let Some(endpoint) = &source.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(ConfigError::Validation(format!(
                    "signals.{name}.endpoint must start with http:// or https://"
                )));
            }
        }
    }

    let location = &signals.weather_location;
    if !(-90.0..=90.0).contains(&location.latitude)
        || !(-180.0..=180.0).contains(&location.longitude)
    {
        return Err(ConfigError::Validation(
            "signals.weather latitude/longitude are out of range".to_string(),
        ));
    }

    if signals.wiki.enabled && signals.wiki_articles.is_empty() {
        return Err(ConfigError::Validation(
            "signals.wiki is enabled but signals.wiki.articles is empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_recommendations(recommendations: &RecommendationsConfig) -> Result<(), ConfigError> {
    if recommendations.default_limit == 0 {
        return Err(ConfigError::Validation(
            "recommendations.default_limit must be greater than zero".to_string(),
        ));
    }

    if let Some((dimension, _)) =
        recommendations.keywords.iter().find(|(_, words)| words.iter().all(|w| w.trim().is_empty()))
    {
        return Err(ConfigError::Validation(format!(
            "recommendations.keywords.{dimension} must contain at least one keyword"
        )));
    }

    Ok(())
}

fn validate_session(session: &SessionConfig) -> Result<(), ConfigError> {
    if session.trail_limit == 0 || session.trail_limit > 100 {
        return Err(ConfigError::Validation(
            "session.trail_limit must be in range 1..=100".to_string(),
        ));
    }

    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
    scoring: Option<ScoringPatch>,
    signals: Option<SignalsPatch>,
    recommendations: Option<RecommendationsPatch>,
    session: Option<SessionPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct ScoringPatch {
    window_days: Option<u32>,
    retention_days: Option<u32>,
    utc_offset_hours: Option<i32>,
    weights: Option<BTreeMap<EventType, i64>>,
}

#[derive(Debug, Default, Deserialize)]
struct SignalsPatch {
    trends: Option<SourcePatch>,
    weather: Option<WeatherPatch>,
    wiki: Option<WikiPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SourcePatch {
    enabled: Option<bool>,
    ttl_secs: Option<u64>,
    refresh_interval_secs: Option<u64>,
    fetch_timeout_secs: Option<u64>,
    endpoint: Option<String>,
    synthetic_default: Option<Value>,
}

impl SourcePatch {
    fn apply_to(self, target: &mut SignalSourceConfig) {
        if let Some(enabled) = self.enabled {
            target.enabled = enabled;
        }
        if let Some(ttl_secs) = self.ttl_secs {
            target.ttl_secs = ttl_secs;
        }
        if let Some(refresh_interval_secs) = self.refresh_interval_secs {
            target.refresh_interval_secs = Some(refresh_interval_secs);
        }
        if let Some(fetch_timeout_secs) = self.fetch_timeout_secs {
            target.fetch_timeout_secs = fetch_timeout_secs;
        }
        if let Some(endpoint) = self.endpoint {
            target.endpoint = Some(endpoint);
        }
        if let Some(synthetic_default) = self.synthetic_default {
            target.synthetic_default = Some(synthetic_default);
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct WeatherPatch {
    #[serde(flatten)]
    source: SourcePatch,
    location_name: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    timezone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WikiPatch {
    #[serde(flatten)]
    source: SourcePatch,
    articles: Option<BTreeMap<String, WikiArticleSpec>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WikiArticleSpec {
    Title(String),
    Detailed(WikiArticle),
}

impl WikiArticleSpec {
    fn into_article(self) -> WikiArticle {
        match self {
            Self::Title(article) => WikiArticle { article, lang: default_wiki_lang() },
            Self::Detailed(article) => article,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RecommendationsPatch {
    default_limit: Option<usize>,
    dimension_weights: Option<BTreeMap<Dimension, u32>>,
    keywords: Option<BTreeMap<Dimension, Vec<String>>>,
    thresholds: Option<ThresholdsPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ThresholdsPatch {
    precip_prob_min: Option<f64>,
    cold_max_temp: Option<f64>,
    wind_min: Option<f64>,
    temp_swing_min: Option<f64>,
    hot_max_temp: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionPatch {
    trail_limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use serde_json::json;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
    use crate::domain::item::EventType;
    use crate::rules::Dimension;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    fn write_config(dir: &TempDir, body: &str) -> Result<std::path::PathBuf, String> {
        let path = dir.path().join("mystyle.toml");
        fs::write(&path, body).map_err(|err| err.to_string())?;
        Ok(path)
    }

    #[test]
    fn defaults_match_documented_policy() -> Result<(), String> {
        let config = AppConfig::default();

        ensure(config.scoring.window_days == 7, "score window defaults to 7 days")?;
        ensure(config.scoring.retention_days == 14, "retention defaults to 14 days")?;
        ensure(
            config.scoring.weights.get(&EventType::Save) == Some(&7),
            "save weight defaults to 7",
        )?;
        ensure(config.signals.wiki.ttl_secs == 6 * 60 * 60, "wiki ttl defaults to 6 hours")?;
        ensure(
            config.signals.trends.synthetic_default.is_some(),
            "trends ships a synthetic default",
        )?;
        ensure(
            config.signals.weather.synthetic_default.is_none(),
            "weather has no synthetic default",
        )?;
        ensure(config.session.trail_limit == 20, "trail limit defaults to 20")?;
        config.validate().map_err(|err| err.to_string())
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_TRENDS_ENDPOINT", "https://trends.example.test/latest.json");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = write_config(
                &dir,
                r#"
[signals.trends]
endpoint = "${TEST_TRENDS_ENDPOINT}"
"#,
            )?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.signals.trends.endpoint.as_deref()
                    == Some("https://trends.example.test/latest.json"),
                "trends endpoint should be interpolated from environment",
            )
        })();

        clear_vars(&["TEST_TRENDS_ENDPOINT"]);
        result
    }

    #[test]
    fn file_sections_patch_defaults() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = write_config(
            &dir,
            r#"
[scoring.weights]
click = 5

[signals.weather]
ttl_secs = 1800
synthetic_default = { precip_prob_max = 0, today_max = 20 }
location_name = "Tokyo"

[signals.wiki.articles]
"ストリート" = "Street_fashion"
"韓国ファッション" = { article = "한국_패션", lang = "ko" }

[recommendations.dimension_weights]
waterproof = 5

[recommendations.keywords]
outer = ["coat", "parka"]
"#,
        )?;

        let config =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.scoring.weights.get(&EventType::Click) == Some(&5), "click weight patched")?;
        ensure(config.scoring.weights.get(&EventType::View) == Some(&1), "view weight kept")?;
        ensure(config.signals.weather.ttl_secs == 1800, "weather ttl patched")?;
        ensure(
            config.signals.weather.synthetic_default
                == Some(json!({ "precip_prob_max": 0, "today_max": 20 })),
            "weather synthetic default converted to json",
        )?;
        ensure(config.signals.weather_location.name == "Tokyo", "location patched")?;
        ensure(config.signals.wiki_articles.len() == 2, "wiki articles replaced")?;
        ensure(
            config.signals.wiki_articles.get("韓国ファッション").map(|a| a.lang.as_str())
                == Some("ko"),
            "detailed wiki article keeps language",
        )?;
        ensure(
            config.recommendations.dimension_weights.get(&Dimension::Waterproof) == Some(&5),
            "dimension weight patched",
        )?;
        ensure(
            config.recommendations.keywords.get(&Dimension::Outer)
                == Some(&vec!["coat".to_string(), "parka".to_string()]),
            "keywords replaced per dimension",
        )?;
        ensure(
            config.recommendations.keywords.contains_key(&Dimension::Waterproof),
            "other dimensions keep default keywords",
        )
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("MYSTYLE_LOG_LEVEL", "warn");
        env::set_var("MYSTYLE_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["MYSTYLE_LOG_LEVEL", "MYSTYLE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("MYSTYLE_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("MYSTYLE_SIGNALS_WEATHER_TTL_SECS", "900");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = write_config(
                &dir,
                r#"
[database]
url = "sqlite://from-file.db"

[signals.weather]
ttl_secs = 1800

[logging]
level = "warn"
"#,
            )?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.signals.weather.ttl_secs == 900, "env ttl should win over file")?;
            Ok(())
        })();

        clear_vars(&["MYSTYLE_DATABASE_URL", "MYSTYLE_SIGNALS_WEATHER_TTL_SECS"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("MYSTYLE_SCORING_RETENTION_DAYS", "3");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("scoring.retention_days")
            );
            ensure(has_message, "validation failure should mention scoring.retention_days")
        })();

        clear_vars(&["MYSTYLE_SCORING_RETENTION_DAYS"]);
        result
    }

    #[test]
    fn invalid_env_number_is_reported_with_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("MYSTYLE_SERVER_PORT", "eighty");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) if key == "MYSTYLE_SERVER_PORT" => {
                Ok(())
            }
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("expected invalid env override".to_string()),
        };

        clear_vars(&["MYSTYLE_SERVER_PORT"]);
        result
    }
}
