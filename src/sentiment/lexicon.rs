// 📖 Lexicon Scorer - rule-based valence scoring
//
// Sums word valences from a fixed lexicon, adjusted for boosters,
// negation, ALL-CAPS emphasis, "but" contrast and exclamation marks,
// then squashes the sum into a compound score in [-1, 1]:
//
//   compound = sum / sqrt(sum² + 15)
//
// Labels: compound >= 0.05 POSITIVE, <= -0.05 NEGATIVE, else NEUTRAL.

use super::{ScoreDetails, Scorer, ScorerKind, ScorerResult};
use crate::entities::SentimentLabel;
use crate::error::Result;
use crate::logging::component_span;
use std::collections::HashMap;
use tracing::{debug, Span};

const POSITIVE_THRESHOLD: f64 = 0.05;
const NEGATIVE_THRESHOLD: f64 = -0.05;

const BOOSTER_INCREMENT: f64 = 0.293;
const CAPS_INCREMENT: f64 = 0.733;
const NEGATION_SCALAR: f64 = -0.74;
const NORMALIZATION_ALPHA: f64 = 15.0;
const EXCLAMATION_INCREMENT: f64 = 0.292;
const MAX_EXCLAMATIONS: usize = 4;

// ============================================================================
// LEXICON DATA
// ============================================================================

/// Word valences on the usual -4..+4 scale
const VALENCES: &[(&str, f64)] = &[
    // positive
    ("good", 1.9),
    ("great", 3.1),
    ("excellent", 2.7),
    ("amazing", 2.8),
    ("awesome", 3.1),
    ("best", 3.2),
    ("better", 1.9),
    ("love", 3.2),
    ("loved", 2.9),
    ("like", 1.5),
    ("nice", 1.8),
    ("fast", 1.2),
    ("easy", 1.9),
    ("simple", 1.0),
    ("smooth", 1.5),
    ("helpful", 1.8),
    ("useful", 1.9),
    ("convenient", 1.7),
    ("reliable", 1.8),
    ("secure", 1.4),
    ("safe", 1.9),
    ("perfect", 2.7),
    ("wonderful", 2.7),
    ("fantastic", 2.6),
    ("happy", 2.7),
    ("satisfied", 1.8),
    ("thanks", 1.9),
    ("thank", 1.5),
    ("fine", 0.8),
    ("ok", 0.9),
    ("okay", 0.9),
    ("cool", 1.3),
    ("efficient", 1.8),
    ("impressive", 2.3),
    ("recommend", 1.5),
    ("works", 1.0),
    ("improved", 1.9),
    ("quick", 1.0),
    ("friendly", 2.2),
    ("enjoy", 2.2),
    ("super", 2.9),
    ("wow", 2.8),
    ("yes", 1.7),
    ("glad", 2.0),
    ("clean", 1.7),
    ("beautiful", 2.9),
    // negative
    ("bad", -2.5),
    ("terrible", -2.5),
    ("horrible", -2.5),
    ("awful", -2.0),
    ("worst", -3.1),
    ("worse", -2.1),
    ("poor", -2.1),
    ("hate", -2.7),
    ("useless", -1.8),
    ("slow", -1.0),
    ("crash", -1.7),
    ("crashes", -1.7),
    ("crashed", -1.7),
    ("crashing", -1.7),
    ("bug", -1.2),
    ("bugs", -1.2),
    ("buggy", -1.5),
    ("error", -1.7),
    ("errors", -1.4),
    ("fail", -2.3),
    ("fails", -2.0),
    ("failed", -2.3),
    ("failure", -2.3),
    ("problem", -1.7),
    ("problems", -1.7),
    ("issue", -0.8),
    ("issues", -0.8),
    ("annoying", -1.7),
    ("disappointed", -1.9),
    ("disappointing", -2.2),
    ("frustrating", -1.9),
    ("waste", -1.8),
    ("stuck", -1.2),
    ("freeze", -1.0),
    ("freezes", -1.0),
    ("broken", -1.8),
    ("difficult", -1.5),
    ("hard", -0.4),
    ("confusing", -1.3),
    ("unreliable", -1.8),
    ("unable", -1.4),
    ("lost", -1.3),
    ("scam", -2.7),
    ("stupid", -2.4),
    ("sad", -2.1),
    ("angry", -2.3),
    ("rubbish", -2.1),
    ("nonsense", -1.7),
];

/// Degree modifiers; positive values intensify, negative values dampen
const BOOSTERS: &[(&str, f64)] = &[
    ("very", BOOSTER_INCREMENT),
    ("really", BOOSTER_INCREMENT),
    ("extremely", BOOSTER_INCREMENT),
    ("so", BOOSTER_INCREMENT),
    ("too", BOOSTER_INCREMENT),
    ("totally", BOOSTER_INCREMENT),
    ("absolutely", BOOSTER_INCREMENT),
    ("completely", BOOSTER_INCREMENT),
    ("incredibly", BOOSTER_INCREMENT),
    ("highly", BOOSTER_INCREMENT),
    ("most", BOOSTER_INCREMENT),
    ("super", BOOSTER_INCREMENT),
    ("always", BOOSTER_INCREMENT),
    ("constantly", BOOSTER_INCREMENT),
    ("barely", -BOOSTER_INCREMENT),
    ("hardly", -BOOSTER_INCREMENT),
    ("slightly", -BOOSTER_INCREMENT),
    ("somewhat", -BOOSTER_INCREMENT),
    ("kinda", -BOOSTER_INCREMENT),
    ("little", -BOOSTER_INCREMENT),
    ("partly", -BOOSTER_INCREMENT),
];

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "none", "nothing", "nobody", "neither", "nor", "without", "cannot",
    "cant", "dont", "doesnt", "didnt", "isnt", "wasnt", "wont", "wouldnt", "shouldnt", "couldnt",
    "aint", "arent", "havent", "hasnt",
];

// ============================================================================
// LEXICON SCORER
// ============================================================================

pub struct LexiconScorer {
    valences: HashMap<String, f64>,
    boosters: HashMap<String, f64>,
    span: Span,
}

/// Raw output of one lexicon pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolarityScores {
    pub compound: f64,
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
}

impl LexiconScorer {
    pub fn new() -> Self {
        Self::with_span(component_span("lexicon_scorer"))
    }

    pub fn with_span(span: Span) -> Self {
        LexiconScorer {
            valences: VALENCES.iter().map(|(w, v)| (w.to_string(), *v)).collect(),
            boosters: BOOSTERS.iter().map(|(w, v)| (w.to_string(), *v)).collect(),
            span,
        }
    }

    /// Add or override a lexicon entry
    pub fn with_word(mut self, word: &str, valence: f64) -> Self {
        self.valences.insert(word.to_lowercase(), valence);
        self
    }

    /// Compound score plus positive/negative/neutral proportions
    pub fn polarity_scores(&self, text: &str) -> PolarityScores {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return PolarityScores {
                compound: 0.0,
                positive: 0.0,
                negative: 0.0,
                neutral: 1.0,
            };
        }

        let cap_differential = is_cap_differential(&tokens);
        let lowered: Vec<String> = tokens.iter().map(|t| normalize_token(t)).collect();

        let mut sentiments: Vec<f64> = Vec::with_capacity(tokens.len());
        for i in 0..tokens.len() {
            sentiments.push(self.token_valence(i, &tokens, &lowered, cap_differential));
        }

        apply_but_contrast(&lowered, &mut sentiments);

        let sum: f64 = sentiments.iter().sum();
        let emphasis = punctuation_emphasis(text);
        let compound = if sum > 0.0 {
            normalize(sum + emphasis)
        } else if sum < 0.0 {
            normalize(sum - emphasis)
        } else {
            0.0
        };

        let (positive, negative, neutral) = proportions(&sentiments, emphasis);

        PolarityScores {
            compound,
            positive,
            negative,
            neutral,
        }
    }

    fn token_valence(
        &self,
        i: usize,
        tokens: &[String],
        lowered: &[String],
        cap_differential: bool,
    ) -> f64 {
        let word = &lowered[i];

        // Boosters only modify their neighbours
        if self.boosters.contains_key(word) && !self.valences.contains_key(word) {
            return 0.0;
        }

        let Some(&base) = self.valences.get(word) else {
            return 0.0;
        };

        let mut valence = base;
        if cap_differential && is_shouting(&tokens[i]) {
            valence += CAPS_INCREMENT * valence.signum();
        }

        for distance in 1..=3 {
            if i < distance {
                break;
            }
            let prev = &lowered[i - distance];
            if self.valences.contains_key(prev) && !self.boosters.contains_key(prev) {
                continue;
            }

            let mut scalar =
                self.booster_scalar(prev, &tokens[i - distance], valence, cap_differential);
            if distance == 2 {
                scalar *= 0.95;
            } else if distance == 3 {
                scalar *= 0.9;
            }
            valence += scalar;

            if is_negation(prev) {
                valence *= NEGATION_SCALAR;
            }
        }

        valence
    }

    fn booster_scalar(
        &self,
        word: &str,
        original: &str,
        valence: f64,
        cap_differential: bool,
    ) -> f64 {
        let Some(&boost) = self.boosters.get(word) else {
            return 0.0;
        };

        let mut scalar = if valence < 0.0 { -boost } else { boost };
        if cap_differential && is_shouting(original) {
            scalar += CAPS_INCREMENT * valence.signum();
        }
        scalar
    }
}

impl Default for LexiconScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl Scorer for LexiconScorer {
    fn kind(&self) -> ScorerKind {
        ScorerKind::Lexicon
    }

    fn try_score(&self, text: &str) -> Result<ScorerResult> {
        let _guard = self.span.enter();
        let scores = self.polarity_scores(text);

        let label = if scores.compound >= POSITIVE_THRESHOLD {
            SentimentLabel::Positive
        } else if scores.compound <= NEGATIVE_THRESHOLD {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        };

        debug!(compound = scores.compound, label = %label, "lexicon scored");

        Ok(ScorerResult::new(
            ScorerKind::Lexicon,
            label,
            scores.compound.abs(),
            ScoreDetails::Lexicon {
                compound: scores.compound,
                positive: scores.positive,
                negative: scores.negative,
                neutral: scores.neutral,
            },
        ))
    }
}

// ============================================================================
// HEURISTICS
// ============================================================================

/// Whitespace tokens with surrounding punctuation stripped
fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric() && c != '\''))
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

fn normalize_token(token: &str) -> String {
    token.to_lowercase().replace('\'', "")
}

fn is_shouting(token: &str) -> bool {
    token.chars().any(|c| c.is_alphabetic())
        && token.chars().filter(|c| c.is_alphabetic()).all(|c| c.is_uppercase())
}

/// Some, but not all, tokens are ALL-CAPS
fn is_cap_differential(tokens: &[String]) -> bool {
    let shouting = tokens.iter().filter(|t| is_shouting(t)).count();
    shouting > 0 && shouting < tokens.len()
}

fn is_negation(word: &str) -> bool {
    NEGATIONS.contains(&word)
}

/// Words before "but" count half, words after count one and a half
fn apply_but_contrast(lowered: &[String], sentiments: &mut [f64]) {
    let Some(pivot) = lowered.iter().position(|w| w == "but") else {
        return;
    };

    for (i, sentiment) in sentiments.iter_mut().enumerate() {
        if i < pivot {
            *sentiment *= 0.5;
        } else if i > pivot {
            *sentiment *= 1.5;
        }
    }
}

fn punctuation_emphasis(text: &str) -> f64 {
    let exclamations = text.matches('!').count().min(MAX_EXCLAMATIONS);
    let questions = text.matches('?').count();

    let question_emphasis = match questions {
        0 | 1 => 0.0,
        2 | 3 => questions as f64 * 0.18,
        _ => 0.96,
    };

    exclamations as f64 * EXCLAMATION_INCREMENT + question_emphasis
}

fn normalize(score: f64) -> f64 {
    (score / (score * score + NORMALIZATION_ALPHA).sqrt()).clamp(-1.0, 1.0)
}

fn proportions(sentiments: &[f64], emphasis: f64) -> (f64, f64, f64) {
    let mut positive_sum = 0.0;
    let mut negative_sum = 0.0;
    let mut neutral_count = 0.0;

    for &s in sentiments {
        if s > 0.0 {
            positive_sum += s + 1.0;
        } else if s < 0.0 {
            negative_sum += s - 1.0;
        } else {
            neutral_count += 1.0;
        }
    }

    if positive_sum > negative_sum.abs() {
        positive_sum += emphasis;
    } else if positive_sum < negative_sum.abs() {
        negative_sum -= emphasis;
    }

    let total = positive_sum + negative_sum.abs() + neutral_count;
    if total == 0.0 {
        return (0.0, 0.0, 1.0);
    }

    (
        positive_sum / total,
        negative_sum.abs() / total,
        neutral_count / total,
    )
}

// ============================================================================
// TESTS
// ============================================================================
