use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProductType;

/// Label derived from a sentiment score: positive above 0.2, negative below
/// -0.2, neutral in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub fn from_score(score: f64) -> Self {
        if score > 0.2 {
            Self::Positive
        } else if score < -0.2 {
            Self::Negative
        } else {
            Self::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentResult {
    pub client_id: String,
    pub product_id: String,
    /// Score in [-1, 1].
    pub sentiment_score: f64,
    pub sentiment_label: SentimentLabel,
    /// Highest class probability, in [0, 1].
    pub confidence: f64,
    pub product_type: Option<ProductType>,
}

impl SentimentResult {
    /// Neutral result returned whenever inference fails; the recommendation
    /// flow must always proceed.
    pub fn neutral(client_id: String, product_id: String, product_type: Option<ProductType>) -> Self {
        Self {
            client_id,
            product_id,
            sentiment_score: 0.0,
            sentiment_label: SentimentLabel::Neutral,
            confidence: 0.0,
            product_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_thresholds() {
        assert_eq!(SentimentLabel::from_score(0.75), SentimentLabel::Positive);
        assert_eq!(SentimentLabel::from_score(0.21), SentimentLabel::Positive);
        assert_eq!(SentimentLabel::from_score(0.2), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_score(0.0), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_score(-0.2), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_score(-0.21), SentimentLabel::Negative);
    }

    #[test]
    fn neutral_result_has_zero_score_and_confidence() {
        let r = SentimentResult::neutral("c1".into(), "p1".into(), None);
        assert_eq!(r.sentiment_score, 0.0);
        assert_eq!(r.confidence, 0.0);
        assert_eq!(r.sentiment_label, SentimentLabel::Neutral);
    }
}
