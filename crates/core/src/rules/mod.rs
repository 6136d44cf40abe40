//! Weather-driven relevance rules and keyword scoring of catalog items.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{AppConfig, RecommendationsConfig};
use crate::domain::item::Item;
use crate::domain::weather::WeatherReading;
use crate::errors::EngineError;

pub mod weather;

pub use weather::{weather_rules, RuleThresholds, WeatherRule};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Waterproof,
    Outer,
    Windproof,
    Layering,
    Breathable,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Waterproof,
        Dimension::Outer,
        Dimension::Windproof,
        Dimension::Layering,
        Dimension::Breathable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waterproof => "waterproof",
            Self::Outer => "outer",
            Self::Windproof => "windproof",
            Self::Layering => "layering",
            Self::Breathable => "breathable",
        }
    }

    pub fn default_keywords(&self) -> &'static [&'static str] {
        match self {
            Self::Waterproof => &["撥水", "防水", "waterproof", "レイン", "rain"],
            Self::Outer => &["コート", "アウター", "ジャケット", "ブルゾン"],
            Self::Windproof => &["防風", "wind", "シェル"],
            Self::Layering => &["レイヤ", "layer", "ベスト", "カーデ", "cardigan"],
            Self::Breathable => &["メッシュ", "透け", "breathable", "リネン", "linen", "エアリー"],
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevanceWeights(BTreeMap<Dimension, u32>);

impl RelevanceWeights {
    pub fn add(&mut self, dimension: Dimension, delta: u32) {
        let weight = self.0.entry(dimension).or_insert(0);
        *weight = weight.saturating_add(delta);
    }

    pub fn get(&self, dimension: Dimension) -> u32 {
        self.0.get(&dimension).copied().unwrap_or(0)
    }

    pub fn has_positive(&self) -> bool {
        self.0.values().any(|weight| *weight > 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, u32)> + '_ {
        self.0.iter().map(|(dimension, weight)| (*dimension, *weight))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherEvaluation {
    pub weights: RelevanceWeights,
    /// In rule declaration order.
    pub explanations: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item: Item,
    pub score: i64,
}

pub struct RuleEngine {
    rules: Vec<WeatherRule>,
    dimension_weights: BTreeMap<Dimension, u32>,
    keywords: BTreeMap<Dimension, Vec<String>>,
    thresholds: RuleThresholds,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::from_config(&AppConfig::default().recommendations)
    }
}

impl RuleEngine {
    /// Dimensions missing from `keywords` use their built-in keyword set.
    pub fn new(
        dimension_weights: BTreeMap<Dimension, u32>,
        keywords: BTreeMap<Dimension, Vec<String>>,
        thresholds: RuleThresholds,
    ) -> Self {
        let keywords: BTreeMap<Dimension, Vec<String>> = Dimension::ALL
            .into_iter()
            .map(|dimension| {
                let words = match keywords.get(&dimension) {
                    Some(words) => words.clone(),
                    None => dimension.default_keywords().iter().map(|w| w.to_string()).collect(),
                };
                let words = words
                    .iter()
                    .map(|word| word.trim().to_lowercase())
                    .filter(|word| !word.is_empty())
                    .collect::<Vec<_>>();
                (dimension, words)
            })
            .collect();

        Self { rules: weather_rules().into_iter().collect(), dimension_weights, keywords, thresholds }
    }

    pub fn from_config(config: &RecommendationsConfig) -> Self {
        Self::new(
            config.dimension_weights.clone(),
            config.keywords.clone(),
            config.thresholds.clone(),
        )
    }

    pub fn evaluate_weather(&self, reading: &WeatherReading) -> WeatherEvaluation {
        let mut evaluation = WeatherEvaluation::default();

        for rule in &self.rules {
            match rule.matches(reading, &self.thresholds) {
                None => {
                    debug!(
                        event_name = "rules.weather.input_missing",
                        rule = rule.id,
                        "reading lacks an input for this rule, skipping"
                    );
                }
                Some(false) => {}
                Some(true) => {
                    let weight = self.dimension_weights.get(&rule.dimension).copied().unwrap_or(0);
                    if weight == 0 {
                        warn!(
                            event_name = "rules.weight.missing",
                            rule = rule.id,
                            dimension = %rule.dimension,
                            error = %EngineError::ConfigurationMissing(format!(
                                "dimension weight for `{}`",
                                rule.dimension
                            )),
                            "rule matched but its dimension has no weight, not firing"
                        );
                        continue;
                    }
                    evaluation.weights.add(rule.dimension, weight);
                    evaluation.explanations.push(rule.explanation(&self.thresholds));
                }
            }
        }

        evaluation
    }

    /// Adds each positive dimension's weight once when any of its keywords
    /// occurs in the item's text.
    pub fn score_item(&self, item: &Item, weights: &RelevanceWeights) -> i64 {
        let text = item.searchable_text();
        weights
            .iter()
            .filter(|(_, weight)| *weight > 0)
            .filter(|(dimension, _)| {
                self.keywords
                    .get(dimension)
                    .is_some_and(|words| words.iter().any(|word| text.contains(word.as_str())))
            })
            .map(|(_, weight)| i64::from(weight))
            .sum()
    }

    /// Scores `items`, drops zero scores, and orders by score descending.
    /// Equal scores keep their input order.
    pub fn rank_items(
        &self,
        items: impl IntoIterator<Item = Item>,
        weights: &RelevanceWeights,
        limit: usize,
    ) -> Vec<ScoredItem> {
        if !weights.has_positive() {
            return Vec::new();
        }

        let mut scored = items
            .into_iter()
            .map(|item| {
                let score = self.score_item(&item, weights);
                ScoredItem { item, score }
            })
            .filter(|scored| scored.score > 0)
            .collect::<Vec<_>>();
        scored.sort_by(|a, b| b.score.cmp(&a.score));
        scored.truncate(limit);
        scored
    }
}
