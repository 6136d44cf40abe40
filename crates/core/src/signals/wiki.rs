//! Pageview-series shaping for the `wiki` signal.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageviewPoint {
    /// `YYYYMMDD`, as reported upstream.
    pub day: String,
    pub views: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WikiTrend {
    pub label: String,
    pub article: String,
    pub series: Vec<PageviewPoint>,
    pub growth: f64,
}

impl WikiTrend {
    pub fn new(label: impl Into<String>, article: impl Into<String>, series: Vec<PageviewPoint>) -> Self {
        let growth = compute_growth(&series);
        Self { label: label.into(), article: article.into(), series, growth }
    }
}

/// The seven complete UTC days ending yesterday.
pub fn pageview_window(now: DateTime<Utc>) -> (NaiveDate, NaiveDate) {
    let end = now.date_naive() - Duration::days(1);
    (end - Duration::days(6), end)
}

/// Reads the `items[].{timestamp, views}` list of a per-article response,
/// ordered by day.
pub fn parse_pageviews(body: &Value) -> Vec<PageviewPoint> {
    let mut points = body
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| PageviewPoint {
                    day: item
                        .get("timestamp")
                        .and_then(Value::as_str)
                        .map(|timestamp| timestamp.chars().take(8).collect())
                        .unwrap_or_default(),
                    views: item.get("views").and_then(Value::as_i64).unwrap_or(0),
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    points.sort_by(|a, b| a.day.cmp(&b.day));
    points
}

/// `(last - first) / max(first, 1)`; zero for series shorter than two points.
pub fn compute_growth(series: &[PageviewPoint]) -> f64 {
    match (series.first(), series.last()) {
        (Some(first), Some(last)) if series.len() >= 2 => {
            let base = if first.views > 0 { first.views } else { 1 };
            (last.views - first.views) as f64 / base as f64
        }
        _ => 0.0,
    }
}

/// Orders trends by growth, highest first, keeping input order on ties.
pub fn rank_trends(mut trends: Vec<WikiTrend>) -> Vec<WikiTrend> {
    trends.sort_by(|a, b| b.growth.total_cmp(&a.growth));
    trends
}

pub fn build_payload(trends: Vec<WikiTrend>, now: DateTime<Utc>) -> Value {
    json!({
        "source": "Wikimedia Pageviews",
        "updated_at": now.to_rfc3339(),
        "trends": rank_trends(trends),
    })
}
