// 🧭 Polarity Scorer - averaged word polarity and subjectivity
//
// Each sentiment-bearing word contributes a (polarity, subjectivity) pair.
// An intensifier right before a word multiplies both values; a negation
// before it (up to two words back) multiplies polarity by -0.5. The
// document polarity is the mean over contributing words.
//
// Labels: polarity > 0.1 POSITIVE, < -0.1 NEGATIVE, else NEUTRAL.
// The band is wider than the lexicon scorer's on purpose.

use super::{ScoreDetails, Scorer, ScorerKind, ScorerResult};
use crate::entities::SentimentLabel;
use crate::error::Result;
use crate::logging::component_span;
use std::collections::HashMap;
use tracing::{debug, Span};

const POSITIVE_THRESHOLD: f64 = 0.1;
const NEGATIVE_THRESHOLD: f64 = -0.1;
const NEGATION_FACTOR: f64 = -0.5;

/// (word, polarity, subjectivity)
const ADJECTIVES: &[(&str, f64, f64)] = &[
    ("good", 0.7, 0.6),
    ("great", 0.8, 0.75),
    ("excellent", 1.0, 1.0),
    ("amazing", 0.6, 0.9),
    ("awesome", 1.0, 1.0),
    ("best", 1.0, 0.3),
    ("better", 0.5, 0.5),
    ("nice", 0.6, 1.0),
    ("fast", 0.2, 0.6),
    ("quick", 0.33, 0.5),
    ("easy", 0.43, 0.83),
    ("simple", 0.0, 0.36),
    ("smooth", 0.4, 0.69),
    ("helpful", 0.5, 0.5),
    ("useful", 0.3, 0.0),
    ("convenient", 0.5, 0.5),
    ("reliable", 0.5, 0.5),
    ("secure", 0.4, 0.6),
    ("perfect", 1.0, 1.0),
    ("wonderful", 1.0, 1.0),
    ("fantastic", 0.4, 0.9),
    ("happy", 0.8, 1.0),
    ("satisfied", 0.5, 1.0),
    ("love", 0.5, 0.6),
    ("like", 0.2, 0.4),
    ("fine", 0.42, 0.5),
    ("cool", 0.35, 0.65),
    ("efficient", 0.5, 0.5),
    ("impressive", 1.0, 1.0),
    ("friendly", 0.38, 0.5),
    ("beautiful", 0.85, 1.0),
    ("bad", -0.7, 0.67),
    ("terrible", -1.0, 1.0),
    ("horrible", -1.0, 1.0),
    ("awful", -1.0, 1.0),
    ("worst", -1.0, 1.0),
    ("worse", -0.4, 0.6),
    ("poor", -0.4, 0.6),
    ("useless", -0.5, 0.0),
    ("slow", -0.3, 0.39),
    ("buggy", -0.5, 0.6),
    ("broken", -0.4, 0.4),
    ("annoying", -0.8, 0.9),
    ("disappointed", -0.75, 0.75),
    ("disappointing", -0.6, 0.7),
    ("frustrating", -0.4, 0.7),
    ("difficult", -0.5, 1.0),
    ("hard", -0.29, 0.54),
    ("confusing", -0.3, 0.7),
    ("unreliable", -0.5, 0.5),
    ("stupid", -0.8, 1.0),
    ("sad", -0.5, 1.0),
    ("angry", -0.5, 1.0),
    ("crashes", -0.4, 0.6),
    ("crash", -0.4, 0.6),
    ("wrong", -0.5, 0.9),
    ("unable", -0.5, 0.5),
    ("hate", -0.8, 0.9),
];

/// (word, multiplier)
const INTENSIFIERS: &[(&str, f64)] = &[
    ("very", 1.3),
    ("really", 1.2),
    ("extremely", 1.5),
    ("so", 1.3),
    ("too", 1.2),
    ("super", 1.4),
    ("quite", 1.1),
    ("absolutely", 1.5),
    ("totally", 1.3),
    ("pretty", 1.1),
    ("slightly", 0.5),
    ("somewhat", 0.6),
    ("barely", 0.4),
];

const NEGATIONS: &[&str] = &[
    "not", "never", "no", "dont", "doesnt", "didnt", "isnt", "wasnt", "cant", "cannot", "wont",
    "arent", "aint",
];

// ============================================================================
// POLARITY SCORER
// ============================================================================

/// Document-level sentiment estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sentiment {
    pub polarity: f64,
    pub subjectivity: f64,
}

pub struct PolarityScorer {
    adjectives: HashMap<String, (f64, f64)>,
    intensifiers: HashMap<String, f64>,
    span: Span,
}

impl PolarityScorer {
    pub fn new() -> Self {
        Self::with_span(component_span("polarity_scorer"))
    }

    pub fn with_span(span: Span) -> Self {
        PolarityScorer {
            adjectives: ADJECTIVES
                .iter()
                .map(|(w, p, s)| (w.to_string(), (*p, *s)))
                .collect(),
            intensifiers: INTENSIFIERS.iter().map(|(w, m)| (w.to_string(), *m)).collect(),
            span,
        }
    }

    pub fn sentiment(&self, text: &str) -> Sentiment {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase().replace('\'', ""))
            .collect();

        let mut assessments: Vec<(f64, f64)> = Vec::new();
        for (i, word) in words.iter().enumerate() {
            let Some(&(mut polarity, mut subjectivity)) = self.adjectives.get(word) else {
                continue;
            };

            if i >= 1 {
                if let Some(&multiplier) = self.intensifiers.get(&words[i - 1]) {
                    polarity *= multiplier;
                    subjectivity *= multiplier;
                }
            }

            let negated = (1..=2)
                .filter(|d| i >= *d)
                .any(|d| NEGATIONS.contains(&words[i - d].as_str()));
            if negated {
                polarity *= NEGATION_FACTOR;
            }

            assessments.push((polarity.clamp(-1.0, 1.0), subjectivity.clamp(0.0, 1.0)));
        }

        if assessments.is_empty() {
            return Sentiment {
                polarity: 0.0,
                subjectivity: 0.0,
            };
        }

        let n = assessments.len() as f64;
        Sentiment {
            polarity: assessments.iter().map(|(p, _)| p).sum::<f64>() / n,
            subjectivity: assessments.iter().map(|(_, s)| s).sum::<f64>() / n,
        }
    }
}

impl Default for PolarityScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl Scorer for PolarityScorer {
    fn kind(&self) -> ScorerKind {
        ScorerKind::Polarity
    }

    fn try_score(&self, text: &str) -> Result<ScorerResult> {
        let _guard = self.span.enter();
        let sentiment = self.sentiment(text);

        let label = if sentiment.polarity > POSITIVE_THRESHOLD {
            SentimentLabel::Positive
        } else if sentiment.polarity < NEGATIVE_THRESHOLD {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        };

        debug!(polarity = sentiment.polarity, label = %label, "polarity scored");

        Ok(ScorerResult::new(
            ScorerKind::Polarity,
            label,
            sentiment.polarity.abs(),
            ScoreDetails::Polarity {
                polarity: sentiment.polarity,
                subjectivity: sentiment.subjectivity,
            },
        ))
    }
}

// ============================================================================
// TESTS
// ============================================================================
