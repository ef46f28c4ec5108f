use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Which endpoint a prediction was requested through. Both intents run the
/// same pipeline; the intent only labels the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PredictionIntent {
    Classification,
    Persona,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRecord {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    /// Highest model confidence as a percentage with two decimals. Written
    /// as a JSON number that keeps its scale (`95.00`).
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub score: Decimal,
    /// Empty when the image was rejected as not a bird.
    pub learn_more_link: String,
}

impl PredictionRecord {
    pub fn is_rejection(&self) -> bool {
        self.learn_more_link.is_empty()
    }
}
