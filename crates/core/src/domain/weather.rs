use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Environmental reading consumed by the rule engine.
///
/// Every field is optional: a payload that lacks a value (or carries a
/// non-numeric one) simply leaves the rules that need it unfired.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    pub precip_prob_max: Option<f64>,
    pub today_max: Option<f64>,
    pub today_min: Option<f64>,
    pub wind_max: Option<f64>,
    pub current_temp: Option<f64>,
}

impl WeatherReading {
    pub fn from_payload(payload: &Value) -> Self {
        let number = |field: &str| payload.get(field).and_then(Value::as_f64);
        Self {
            precip_prob_max: number("precip_prob_max"),
            today_max: number("today_max"),
            today_min: number("today_min"),
            wind_max: number("wind_max"),
            current_temp: number("current_temp"),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::WeatherReading;

    #[test]
    fn from_payload_ignores_missing_and_non_numeric_fields() {
        let reading = WeatherReading::from_payload(&json!({
            "precip_prob_max": 60,
            "today_max": 8.5,
            "wind_max": "n/a",
            "source": "Open-Meteo"
        }));

        assert_eq!(reading.precip_prob_max, Some(60.0));
        assert_eq!(reading.today_max, Some(8.5));
        assert_eq!(reading.today_min, None);
        assert_eq!(reading.wind_max, None);
    }
}
