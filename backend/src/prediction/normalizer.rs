use chrono::Utc;
use rust_decimal::Decimal;
use shared::PredictionRecord;
use std::str::FromStr;

use crate::config::LINK_PLACEHOLDER;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum NormalizeError {
    #[error("Model returned an empty score vector")]
    EmptyScores,
    #[error("Model returned no finite scores")]
    NonFiniteScores,
    #[error("Model score {0} does not fit a percentage")]
    OutOfRange(f32),
}

/// Turns a raw label and score vector into the record sent to callers.
#[derive(Debug, Clone)]
pub struct Normalizer {
    learn_more_template: String,
}

impl Normalizer {
    /// `learn_more_template` must contain `{name}`.
    pub fn new(learn_more_template: impl Into<String>) -> Self {
        Self {
            learn_more_template: learn_more_template.into(),
        }
    }

    pub fn normalize(
        &self,
        label: &str,
        scores: &[f32],
        is_rejection: bool,
    ) -> Result<PredictionRecord, NormalizeError> {
        let score = highest_score(scores)?;
        let learn_more_link = if is_rejection {
            String::new()
        } else {
            self.learn_more_link(label)
        };

        Ok(PredictionRecord {
            name: label.to_string(),
            timestamp: Utc::now(),
            score,
            learn_more_link,
        })
    }

    pub fn learn_more_link(&self, label: &str) -> String {
        let encoded = label.replace(['-', ' '], "+").to_lowercase();
        self.learn_more_template.replace(LINK_PLACEHOLDER, &encoded)
    }
}

/// Largest score as a percentage with two decimal places.
///
/// The score goes through its shortest decimal form before scaling, so
/// `0.12345` is rounded as exactly that value (half to even: `12.34`).
pub fn highest_score(scores: &[f32]) -> Result<Decimal, NormalizeError> {
    if scores.is_empty() {
        return Err(NormalizeError::EmptyScores);
    }
    let max = scores
        .iter()
        .copied()
        .filter(|score| score.is_finite())
        .fold(None, |best: Option<f32>, score| {
            Some(best.map_or(score, |b| b.max(score)))
        })
        .ok_or(NormalizeError::NonFiniteScores)?;

    let percent = Decimal::from_str(&max.to_string())
        .ok()
        .and_then(|value| value.checked_mul(Decimal::ONE_HUNDRED))
        .ok_or(NormalizeError::OutOfRange(max))?;
    let mut rounded = percent.round_dp(2);
    rounded.rescale(2);
    Ok(rounded)
}
