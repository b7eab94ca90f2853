//! Sentiment scoring ensemble.
//!
//! Three independent scorers implement [`Scorer`]:
//! - [`LexiconScorer`]: valence lexicon plus negation/emphasis heuristics
//! - [`PolarityScorer`]: averaged word polarity/subjectivity
//! - [`NeuralScorer`]: pretrained classifier, optional at startup
//!
//! [`SentimentAggregator`] reconciles their outputs into one label/score
//! through a pluggable [`ReconciliationStrategy`].

pub mod aggregator;
pub mod lexicon;
pub mod neural;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod polarity;

pub use aggregator::{
    AggregateSentiment, NeuralFirstMajority, ReconciliationStrategy, SentimentAggregator,
};
pub use lexicon::LexiconScorer;
pub use neural::{ClassScore, LinearTextClassifier, NeuralScorer, SentimentModel};
#[cfg(feature = "onnx")]
pub use onnx::OnnxTextClassifier;
pub use polarity::PolarityScorer;

use crate::entities::SentimentLabel;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Score reported whenever a scorer cannot produce a real answer
pub const FALLBACK_SCORE: f64 = 0.5;

// ============================================================================
// SCORER KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScorerKind {
    Neural,
    Lexicon,
    Polarity,
}

impl ScorerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScorerKind::Neural => "neural",
            ScorerKind::Lexicon => "lexicon",
            ScorerKind::Polarity => "polarity",
        }
    }
}

impl fmt::Display for ScorerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

// ============================================================================
// SCORER RESULT
// ============================================================================

/// Method-specific diagnostics carried next to the label/score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScoreDetails {
    None,
    Lexicon {
        compound: f64,
        positive: f64,
        negative: f64,
        neutral: f64,
    },
    Polarity {
        polarity: f64,
        subjectivity: f64,
    },
    Neural {
        probabilities: Vec<ClassScore>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerResult {
    pub kind: ScorerKind,
    pub label: SentimentLabel,
    /// Confidence magnitude in [0, 1]
    pub score: f64,
    /// False when this is a fallback value rather than a real measurement
    pub available: bool,
    pub details: ScoreDetails,
}

impl ScorerResult {
    pub fn new(kind: ScorerKind, label: SentimentLabel, score: f64, details: ScoreDetails) -> Self {
        ScorerResult {
            kind,
            label,
            score: clamp_unit(score),
            available: true,
            details,
        }
    }

    /// {NEUTRAL, 0.5}, marked unavailable
    pub fn fallback(kind: ScorerKind) -> Self {
        ScorerResult {
            kind,
            label: SentimentLabel::Neutral,
            score: FALLBACK_SCORE,
            available: false,
            details: ScoreDetails::None,
        }
    }

    fn sanitized(mut self) -> Self {
        if !self.score.is_finite() {
            return ScorerResult::fallback(self.kind);
        }
        self.score = clamp_unit(self.score);
        self
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        FALLBACK_SCORE
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ============================================================================
// SCORER CAPABILITY
// ============================================================================

pub trait Scorer: Send + Sync {
    fn kind(&self) -> ScorerKind;

    /// Raw scoring; errors are turned into the fallback by [`Scorer::score`]
    fn try_score(&self, text: &str) -> Result<ScorerResult>;

    fn is_available(&self) -> bool {
        true
    }

    /// Never fails: any error is logged and replaced by {NEUTRAL, 0.5}
    fn score(&self, text: &str) -> ScorerResult {
        match self.try_score(text) {
            Ok(result) => result.sanitized(),
            Err(e) => {
                warn!(scorer = %self.kind(), error = %e, "scoring failed, using fallback");
                ScorerResult::fallback(self.kind())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReviewError;

    struct Broken;

    impl Scorer for Broken {
        fn kind(&self) -> ScorerKind {
            ScorerKind::Polarity
        }

        fn try_score(&self, _text: &str) -> Result<ScorerResult> {
            Err(ReviewError::ScorerRuntime {
                scorer: "polarity".to_string(),
                reason: "boom".to_string(),
            })
        }
    }

    struct OutOfRange;

    impl Scorer for OutOfRange {
        fn kind(&self) -> ScorerKind {
            ScorerKind::Lexicon
        }

        fn try_score(&self, _text: &str) -> Result<ScorerResult> {
            Ok(ScorerResult {
                kind: ScorerKind::Lexicon,
                label: SentimentLabel::Positive,
                score: f64::INFINITY,
                available: true,
                details: ScoreDetails::None,
            })
        }
    }

    #[test]
    fn test_failing_scorer_falls_back() {
        let result = Broken.score("anything");

        assert_eq!(result.label, SentimentLabel::Neutral);
        assert_eq!(result.score, FALLBACK_SCORE);
        assert!(!result.available);
    }

    #[test]
    fn test_non_finite_score_falls_back() {
        let result = OutOfRange.score("anything");
        assert_eq!(result.label, SentimentLabel::Neutral);
        assert_eq!(result.score, FALLBACK_SCORE);
    }

    #[test]
    fn test_new_clamps_score() {
        let result = ScorerResult::new(
            ScorerKind::Lexicon,
            SentimentLabel::Negative,
            -0.2,
            ScoreDetails::None,
        );
        assert_eq!(result.score, 0.0);
        assert!(result.available);
    }
}
