use serde::{Deserialize, Serialize};

use crate::domain::weather::WeatherReading;
use crate::rules::Dimension;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleThresholds {
    /// Percent.
    pub precip_prob_min: f64,
    /// Degrees Celsius; at or below this the day counts as cold.
    pub cold_max_temp: f64,
    /// Metres per second.
    pub wind_min: f64,
    /// Degrees Celsius between the day's max and min.
    pub temp_swing_min: f64,
    pub hot_max_temp: f64,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            precip_prob_min: 40.0,
            cold_max_temp: 12.0,
            wind_min: 8.0,
            temp_swing_min: 8.0,
            hot_max_temp: 25.0,
        }
    }
}

/// `None` means the reading lacks an input the rule needs.
type Predicate = fn(&WeatherReading, &RuleThresholds) -> Option<bool>;
type Explain = fn(&RuleThresholds) -> String;

pub struct WeatherRule {
    pub id: &'static str,
    pub dimension: Dimension,
    predicate: Predicate,
    explain: Explain,
}

impl WeatherRule {
    pub fn matches(&self, reading: &WeatherReading, thresholds: &RuleThresholds) -> Option<bool> {
        (self.predicate)(reading, thresholds)
    }

    pub fn explanation(&self, thresholds: &RuleThresholds) -> String {
        (self.explain)(thresholds)
    }
}

/// The weather rules in evaluation order.
pub fn weather_rules() -> [WeatherRule; 5] {
    [
        WeatherRule {
            id: "rain",
            dimension: Dimension::Waterproof,
            predicate: |reading, t| reading.precip_prob_max.map(|p| p >= t.precip_prob_min),
            explain: |t| {
                format!("降水確率{}%以上なので撥水・防水アイテムを優先しています。", t.precip_prob_min)
            },
        },
        WeatherRule {
            id: "cold",
            dimension: Dimension::Outer,
            predicate: |reading, t| reading.today_max.map(|max| max <= t.cold_max_temp),
            explain: |t| {
                format!("最高気温{}℃以下のため、防寒性の高いアウターをピックアップ。", t.cold_max_temp)
            },
        },
        WeatherRule {
            id: "wind",
            dimension: Dimension::Windproof,
            predicate: |reading, t| reading.wind_max.map(|wind| wind >= t.wind_min),
            explain: |t| format!("風速{}m/s以上なので、防風仕様のアイテムを含めています。", t.wind_min),
        },
        WeatherRule {
            id: "temperature_swing",
            dimension: Dimension::Layering,
            predicate: |reading, t| {
                let (max, min) = (reading.today_max?, reading.today_min?);
                Some(max - min >= t.temp_swing_min)
            },
            explain: |_| "寒暖差が大きいため、レイヤリングしやすい構成を推奨します。".to_string(),
        },
        WeatherRule {
            id: "heat",
            dimension: Dimension::Breathable,
            predicate: |reading, t| reading.today_max.map(|max| max >= t.hot_max_temp),
            explain: |t| {
                format!("{}℃以上の見込みなので、通気性と速乾性を持つアイテムを表示します。", t.hot_max_temp)
            },
        },
    ]
}
