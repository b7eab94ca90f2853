// ⚖️ Sentiment Aggregator - reconcile scorer outputs into one decision
//
// The aggregator depends only on ScorerResult values, never on concrete
// scorers. The policy lives behind ReconciliationStrategy; one strategy is
// used consistently per aggregator.
//
// Default policy (NeuralFirstMajority):
//   1. A real neural result whose score exceeds the confidence floor wins.
//   2. Otherwise the available lexicon/polarity results vote; the label
//      with the most votes wins and any tie resolves to NEUTRAL.
//   3. No usable result at all gives NEUTRAL / 0.5.
// The reported score is the score of the source whose label was chosen.

use super::{ScorerKind, ScorerResult, FALLBACK_SCORE};
use crate::entities::SentimentLabel;
use crate::logging::component_span;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, Span};

pub const DEFAULT_CONFIDENCE_FLOOR: f64 = 0.6;

// ============================================================================
// AGGREGATE RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSentiment {
    pub label: SentimentLabel,
    /// Always within [0, 1]
    pub score: f64,
    /// Scorer whose result decided the label (None for the fallback or a tie)
    pub source: Option<ScorerKind>,
    /// Number of scorer results that took part in the decision
    pub participants: usize,
}

impl AggregateSentiment {
    pub fn fallback() -> Self {
        AggregateSentiment {
            label: SentimentLabel::Neutral,
            score: FALLBACK_SCORE,
            source: None,
            participants: 0,
        }
    }
}

// ============================================================================
// STRATEGY
// ============================================================================

pub trait ReconciliationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Must be deterministic: same results in, same answer out
    fn reconcile(&self, results: &[ScorerResult]) -> AggregateSentiment;
}

#[derive(Debug, Clone)]
pub struct NeuralFirstMajority {
    pub confidence_floor: f64,
}

impl NeuralFirstMajority {
    pub fn new(confidence_floor: f64) -> Self {
        NeuralFirstMajority { confidence_floor }
    }
}

impl Default for NeuralFirstMajority {
    fn default() -> Self {
        NeuralFirstMajority::new(DEFAULT_CONFIDENCE_FLOOR)
    }
}

impl ReconciliationStrategy for NeuralFirstMajority {
    fn name(&self) -> &'static str {
        "neural-first-majority"
    }

    fn reconcile(&self, results: &[ScorerResult]) -> AggregateSentiment {
        let usable: Vec<&ScorerResult> = results.iter().filter(|r| r.available).collect();

        if let Some(neural) = usable
            .iter()
            .find(|r| r.kind == ScorerKind::Neural && r.score > self.confidence_floor)
        {
            return AggregateSentiment {
                label: neural.label,
                score: neural.score,
                source: Some(ScorerKind::Neural),
                participants: 1,
            };
        }

        let mut voters: Vec<&ScorerResult> = usable
            .into_iter()
            .filter(|r| matches!(r.kind, ScorerKind::Lexicon | ScorerKind::Polarity))
            .collect();
        if voters.is_empty() {
            return AggregateSentiment::fallback();
        }
        voters.sort_by(|a, b| a.kind.cmp(&b.kind));

        let mut votes: BTreeMap<SentimentLabel, usize> = BTreeMap::new();
        for voter in &voters {
            *votes.entry(voter.label).or_insert(0) += 1;
        }

        let top = votes.values().copied().max().unwrap_or(0);
        let leaders: Vec<SentimentLabel> = votes
            .iter()
            .filter(|(_, count)| **count == top)
            .map(|(label, _)| *label)
            .collect();

        let label = match leaders.as_slice() {
            [single] => *single,
            _ => SentimentLabel::Neutral,
        };

        // Most confident source among those that voted for the winner
        let chosen = voters
            .iter()
            .filter(|r| r.label == label)
            .fold(None::<&&ScorerResult>, |best, r| match best {
                Some(b) if b.score >= r.score => Some(b),
                _ => Some(r),
            });

        match chosen {
            Some(result) => AggregateSentiment {
                label,
                score: result.score,
                source: Some(result.kind),
                participants: voters.len(),
            },
            None => AggregateSentiment {
                label,
                score: FALLBACK_SCORE,
                source: None,
                participants: voters.len(),
            },
        }
    }
}

// ============================================================================
// AGGREGATOR
// ============================================================================

pub struct SentimentAggregator {
    strategy: Box<dyn ReconciliationStrategy>,
    span: Span,
}

impl SentimentAggregator {
    pub fn new(strategy: Box<dyn ReconciliationStrategy>) -> Self {
        SentimentAggregator {
            strategy,
            span: component_span("sentiment_aggregator"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn aggregate(&self, results: &[ScorerResult]) -> AggregateSentiment {
        let _guard = self.span.enter();
        let mut decision = self.strategy.reconcile(results);
        decision.score = if decision.score.is_finite() {
            decision.score.clamp(0.0, 1.0)
        } else {
            FALLBACK_SCORE
        };

        debug!(
            strategy = self.strategy.name(),
            label = %decision.label,
            score = decision.score,
            source = ?decision.source,
            "aggregated sentiment"
        );
        decision
    }
}

impl Default for SentimentAggregator {
    fn default() -> Self {
        SentimentAggregator::new(Box::new(NeuralFirstMajority::default()))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentiment::ScoreDetails;

    fn result(kind: ScorerKind, label: SentimentLabel, score: f64) -> ScorerResult {
        ScorerResult::new(kind, label, score, ScoreDetails::None)
    }

    #[test]
    fn test_empty_input_fallback() {
        let decision = SentimentAggregator::default().aggregate(&[]);

        assert_eq!(decision.label, SentimentLabel::Neutral);
        assert_eq!(decision.score, 0.5);
        assert_eq!(decision.source, None);
    }

    #[test]
    fn test_confident_neural_wins() {
        let results = vec![
            result(ScorerKind::Neural, SentimentLabel::Positive, 0.93),
            result(ScorerKind::Lexicon, SentimentLabel::Negative, 0.4),
            result(ScorerKind::Polarity, SentimentLabel::Negative, 0.3),
        ];
        let decision = SentimentAggregator::default().aggregate(&results);

        assert_eq!(decision.label, SentimentLabel::Positive);
        assert_eq!(decision.score, 0.93);
        assert_eq!(decision.source, Some(ScorerKind::Neural));
    }

    #[test]
    fn test_unconfident_neural_falls_back_to_vote() {
        let results = vec![
            result(ScorerKind::Neural, SentimentLabel::Positive, 0.55),
            result(ScorerKind::Lexicon, SentimentLabel::Negative, 0.54),
            result(ScorerKind::Polarity, SentimentLabel::Negative, 0.7),
        ];
        let decision = SentimentAggregator::default().aggregate(&results);

        assert_eq!(decision.label, SentimentLabel::Negative);
        assert_eq!(decision.score, 0.7);
        assert_eq!(decision.source, Some(ScorerKind::Polarity));
    }

    #[test]
    fn test_floor_is_exclusive() {
        let results = vec![
            result(ScorerKind::Neural, SentimentLabel::Positive, 0.6),
            result(ScorerKind::Lexicon, SentimentLabel::Negative, 0.2),
        ];
        let decision = SentimentAggregator::default().aggregate(&results);
        assert_eq!(decision.label, SentimentLabel::Negative);
    }

    #[test]
    fn test_disagreement_ties_to_neutral() {
        let results = vec![
            result(ScorerKind::Lexicon, SentimentLabel::Positive, 0.3),
            result(ScorerKind::Polarity, SentimentLabel::Negative, 0.2),
        ];
        let decision = SentimentAggregator::default().aggregate(&results);

        assert_eq!(decision.label, SentimentLabel::Neutral);
        assert_eq!(decision.score, 0.5);
        assert_eq!(decision.source, None);
    }

    #[test]
    fn test_degraded_results_do_not_vote() {
        let results = vec![
            ScorerResult::fallback(ScorerKind::Neural),
            ScorerResult::fallback(ScorerKind::Lexicon),
            result(ScorerKind::Polarity, SentimentLabel::Positive, 0.45),
        ];
        let decision = SentimentAggregator::default().aggregate(&results);

        assert_eq!(decision.label, SentimentLabel::Positive);
        assert_eq!(decision.score, 0.45);
        assert_eq!(decision.participants, 1);
    }

    #[test]
    fn test_deterministic_regardless_of_order() {
        let aggregator = SentimentAggregator::default();
        let forward = vec![
            result(ScorerKind::Lexicon, SentimentLabel::Negative, 0.6),
            result(ScorerKind::Polarity, SentimentLabel::Negative, 0.6),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();

        let first = aggregator.aggregate(&forward);
        for _ in 0..10 {
            assert_eq!(aggregator.aggregate(&forward), first);
        }
        assert_eq!(aggregator.aggregate(&reversed), first);
        assert_eq!(first.source, Some(ScorerKind::Lexicon));
    }

    struct AlwaysPositive;

    impl ReconciliationStrategy for AlwaysPositive {
        fn name(&self) -> &'static str {
            "always-positive"
        }

        fn reconcile(&self, _results: &[ScorerResult]) -> AggregateSentiment {
            AggregateSentiment {
                label: SentimentLabel::Positive,
                score: 7.0,
                source: None,
                participants: 0,
            }
        }
    }

    #[test]
    fn test_pluggable_strategy_is_clamped() {
        let aggregator = SentimentAggregator::new(Box::new(AlwaysPositive));
        let decision = aggregator.aggregate(&[]);

        assert_eq!(aggregator.strategy_name(), "always-positive");
        assert_eq!(decision.label, SentimentLabel::Positive);
        assert_eq!(decision.score, 1.0);
    }
}
