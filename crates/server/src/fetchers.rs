//! HTTP fetchers for the external signal sources.
//!
//! Each fetcher performs exactly one upstream attempt; retry cadence and
//! fallback belong to the signal cache and the scheduler.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde_json::{json, Value};
use tracing::{debug, warn};

use mystyle_core::clock::Clock;
use mystyle_core::config::{SignalSourceConfig, SignalsConfig, WeatherLocation, WikiArticle};
use mystyle_core::signals::wiki::{
    build_payload, pageview_window, parse_pageviews, rank_trends, WikiTrend,
};
use mystyle_core::{FetchError, SignalFetcher, SignalKey};

pub const USER_AGENT: &str = "MyStyle-Trends/1.0";
pub const OPEN_METEO_FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
pub const WIKIMEDIA_PAGEVIEWS_URL: &str =
    "https://wikimedia.org/api/rest_v1/metrics/pageviews/per-article";

const DAILY_FIELDS: &str =
    "temperature_2m_max,temperature_2m_min,precipitation_probability_max,windspeed_10m_max";

fn http_client(timeout: Duration) -> Result<Client, FetchError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| FetchError::Transport(format!("could not build HTTP client: {e}")))
}

fn parse_url(raw: &str) -> Result<Url, FetchError> {
    Url::parse(raw).map_err(|e| FetchError::Transport(format!("invalid upstream URL `{raw}`: {e}")))
}

fn transport_error(err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(timeout.as_secs())
    } else {
        FetchError::Transport(err.to_string())
    }
}

async fn get_json(client: &Client, url: Url, timeout: Duration) -> Result<Value, FetchError> {
    let response = client.get(url).send().await.map_err(|e| transport_error(e, timeout))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(FetchError::Status { status: status.as_u16(), body });
    }
    response.json::<Value>().await.map_err(|e| FetchError::Decode(e.to_string()))
}

/// Current conditions and today's forecast for one configured location.
pub struct OpenMeteoFetcher {
    client: Client,
    endpoint: Url,
    location: WeatherLocation,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl OpenMeteoFetcher {
    pub fn new(
        source: &SignalSourceConfig,
        location: WeatherLocation,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, FetchError> {
        let timeout = source.fetch_timeout();
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: parse_url(source.endpoint.as_deref().unwrap_or(OPEN_METEO_FORECAST_URL))?,
            location,
            timeout,
            clock,
        })
    }

    fn request_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("latitude", &self.location.latitude.to_string())
            .append_pair("longitude", &self.location.longitude.to_string())
            .append_pair("timezone", &self.location.timezone)
            .append_pair("current", "temperature_2m")
            .append_pair("daily", DAILY_FIELDS)
            .append_pair("wind_speed_unit", "ms")
            .append_pair("forecast_days", "1");
        url
    }
}

/// Flattens an Open-Meteo forecast into the weather payload. Each daily
/// value is taken from the first (today's) slot.
pub fn weather_payload(location: &WeatherLocation, body: &Value, now: DateTime<Utc>) -> Value {
    let daily = |field: &str| body.pointer(&format!("/daily/{field}/0")).cloned();
    json!({
        "source": "Open-Meteo",
        "updated_at": now.to_rfc3339(),
        "location": {
            "name": location.name,
            "lat": location.latitude,
            "lon": location.longitude,
        },
        "current_temp": body.pointer("/current/temperature_2m").cloned(),
        "today_max": daily("temperature_2m_max"),
        "today_min": daily("temperature_2m_min"),
        "precip_prob_max": daily("precipitation_probability_max"),
        "wind_max": daily("windspeed_10m_max"),
    })
}

#[async_trait]
impl SignalFetcher for OpenMeteoFetcher {
    async fn fetch(&self) -> Result<Value, FetchError> {
        let body = get_json(&self.client, self.request_url(), self.timeout).await?;
        if body.get("daily").is_none() {
            return Err(FetchError::Decode("forecast response carries no `daily` block".into()));
        }
        Ok(weather_payload(&self.location, &body, self.clock.now()))
    }
}

/// Seven-day pageview series for each configured article, ranked by growth.
pub struct WikiPageviewsFetcher {
    client: Client,
    endpoint: Url,
    articles: BTreeMap<String, WikiArticle>,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl WikiPageviewsFetcher {
    pub fn new(
        source: &SignalSourceConfig,
        articles: BTreeMap<String, WikiArticle>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, FetchError> {
        let timeout = source.fetch_timeout();
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: parse_url(source.endpoint.as_deref().unwrap_or(WIKIMEDIA_PAGEVIEWS_URL))?,
            articles,
            timeout,
            clock,
        })
    }

    fn article_url(&self, article: &WikiArticle, now: DateTime<Utc>) -> Result<Url, FetchError> {
        let (start, end) = pageview_window(now);
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Transport(format!("`{}` cannot be a base URL", self.endpoint)))?
            .pop_if_empty()
            .push(&format!("{}.wikipedia", article.lang))
            .push("all-access")
            .push("user")
            .push(&article.article)
            .push("daily")
            .push(&format!("{}00", start.format("%Y%m%d")))
            .push(&format!("{}00", end.format("%Y%m%d")));
        Ok(url)
    }
}

#[async_trait]
impl SignalFetcher for WikiPageviewsFetcher {
    async fn fetch(&self) -> Result<Value, FetchError> {
        let now = self.clock.now();
        let mut trends = Vec::with_capacity(self.articles.len());
        let mut last_error = None;

        for (label, article) in &self.articles {
            let result = match self.article_url(article, now) {
                Ok(url) => get_json(&self.client, url, self.timeout).await,
                Err(err) => Err(err),
            };
            match result {
                Ok(body) => {
                    let series = parse_pageviews(&body);
                    if series.is_empty() {
                        debug!(
                            event_name = "signal.wiki.article_empty",
                            article = %article.article,
                            "pageview response carried no points"
                        );
                        continue;
                    }
                    trends.push(WikiTrend::new(label.clone(), article.article.clone(), series));
                }
                Err(err) => {
                    warn!(
                        event_name = "signal.wiki.article_skipped",
                        article = %article.article,
                        error = %err,
                        "pageview fetch failed for article"
                    );
                    last_error = Some(err);
                }
            }
        }

        if trends.is_empty() {
            if let Some(err) = last_error {
                return Err(err);
            }
        }
        Ok(build_payload(rank_trends(trends), now))
    }
}

/// Trend scores from an operator-provided JSON endpoint.
pub struct JsonEndpointFetcher {
    client: Client,
    endpoint: Option<Url>,
    timeout: Duration,
}

impl JsonEndpointFetcher {
    pub fn new(source: &SignalSourceConfig) -> Result<Self, FetchError> {
        let timeout = source.fetch_timeout();
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: source.endpoint.as_deref().map(parse_url).transpose()?,
            timeout,
        })
    }
}

#[async_trait]
impl SignalFetcher for JsonEndpointFetcher {
    async fn fetch(&self) -> Result<Value, FetchError> {
        let Some(endpoint) = &self.endpoint else {
            return Err(FetchError::NotConfigured);
        };
        get_json(&self.client, endpoint.clone(), self.timeout).await
    }
}

/// One fetcher per enabled signal key.
#[derive(Clone, Default)]
pub struct FetcherRegistry {
    fetchers: BTreeMap<SignalKey, Arc<dyn SignalFetcher>>,
}

impl FetcherRegistry {
    pub fn from_config(config: &SignalsConfig, clock: Arc<dyn Clock>) -> Result<Self, FetchError> {
        let mut registry = Self::default();
        if config.trends.enabled {
            registry.insert(SignalKey::trends(), Arc::new(JsonEndpointFetcher::new(&config.trends)?));
        }
        if config.weather.enabled {
            registry.insert(
                SignalKey::weather(),
                Arc::new(OpenMeteoFetcher::new(
                    &config.weather,
                    config.weather_location.clone(),
                    clock.clone(),
                )?),
            );
        }
        if config.wiki.enabled {
            registry.insert(
                SignalKey::wiki(),
                Arc::new(WikiPageviewsFetcher::new(
                    &config.wiki,
                    config.wiki_articles.clone(),
                    clock,
                )?),
            );
        }
        Ok(registry)
    }

    pub fn insert(&mut self, key: SignalKey, fetcher: Arc<dyn SignalFetcher>) {
        self.fetchers.insert(key, fetcher);
    }

    pub fn get(&self, key: &SignalKey) -> Option<Arc<dyn SignalFetcher>> {
        self.fetchers.get(key).cloned()
    }

    pub fn keys(&self) -> impl Iterator<Item = &SignalKey> {
        self.fetchers.keys()
    }
}
