//! Neural scorer backed by a pretrained text classifier.
//!
//! The model is a black box behind [`SentimentModel`]. It is loaded once at
//! startup; if loading fails the scorer is built disabled and answers every
//! call with {NEUTRAL, 0.5} without touching the model. Inference runs on a
//! worker thread with a per-call timeout so a stuck model cannot block the
//! batch. The first timeout marks the scorer stalled and later calls fall
//! back without spawning more work.
//!
//! Two backends exist: [`LinearTextClassifier`] (JSON artifact) and, with
//! the `onnx` feature, a transformer classifier run through ONNX Runtime.

use super::{ScoreDetails, Scorer, ScorerKind, ScorerResult};
use crate::entities::SentimentLabel;
use crate::error::{Result, ReviewError};
use crate::logging::component_span;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn, Span};

pub const DEFAULT_MAX_CHARS: usize = 512;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Probability for one output class of the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScore {
    pub label: String,
    pub probability: f64,
}

/// A pretrained classifier returning one probability per class.
pub trait SentimentModel: Send + Sync {
    fn name(&self) -> &str;

    fn predict(&self, text: &str) -> Result<Vec<ClassScore>>;
}

// ============================================================================
// BUNDLED MODEL: bag-of-words linear classifier
// ============================================================================

/// Linear classifier over log-scaled term counts with a softmax head.
///
/// Artifact format (JSON):
/// `{ "labels": [...], "vocabulary": {"term": index}, "weights": [[...]], "bias": [...] }`
/// where `weights[class][term]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearTextClassifier {
    #[serde(default = "default_model_name")]
    pub name: String,
    pub labels: Vec<String>,
    pub vocabulary: HashMap<String, usize>,
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

fn default_model_name() -> String {
    "linear-bow".to_string()
}

impl LinearTextClassifier {
    pub fn from_json(raw: &str) -> Result<Self> {
        let model: LinearTextClassifier = serde_json::from_str(raw)?;
        model.validate()?;
        Ok(model)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    fn validate(&self) -> Result<()> {
        let unavailable = |reason: String| ReviewError::ScorerUnavailable {
            scorer: ScorerKind::Neural.to_string(),
            reason,
        };

        if self.labels.is_empty() {
            return Err(unavailable("model has no output labels".to_string()));
        }
        if self.weights.len() != self.labels.len() || self.bias.len() != self.labels.len() {
            return Err(unavailable(format!(
                "expected {} weight rows and biases, found {} and {}",
                self.labels.len(),
                self.weights.len(),
                self.bias.len()
            )));
        }
        let terms = self.vocabulary.len();
        if let Some(row) = self.weights.iter().find(|row| row.len() != terms) {
            return Err(unavailable(format!(
                "weight row has {} entries for a vocabulary of {}",
                row.len(),
                terms
            )));
        }
        if self.vocabulary.values().any(|&idx| idx >= terms) {
            return Err(unavailable("vocabulary index out of range".to_string()));
        }
        Ok(())
    }
}

impl SentimentModel for LinearTextClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, text: &str) -> Result<Vec<ClassScore>> {
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            if let Some(&idx) = self.vocabulary.get(&token.to_lowercase()) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }

        let logits: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, bias)| {
                bias + counts
                    .iter()
                    .map(|(&idx, &count)| row[idx] * (1.0 + count).ln())
                    .sum::<f64>()
            })
            .collect();

        let probabilities = softmax(&logits);
        Ok(self
            .labels
            .iter()
            .zip(probabilities)
            .map(|(label, probability)| ClassScore {
                label: label.clone(),
                probability,
            })
            .collect())
    }
}

pub(crate) fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.iter().map(|e| e / total).collect()
}

// ============================================================================
// NEURAL SCORER
// ============================================================================

pub struct NeuralScorer {
    /// Checked once at construction; `None` means the scorer is disabled.
    model: Option<Arc<dyn SentimentModel>>,
    /// Set by the first inference timeout. The abandoned thread may still
    /// hold the model, so no further work is sent to it.
    stalled: AtomicBool,
    max_chars: usize,
    timeout: Duration,
    span: Span,
}

impl NeuralScorer {
    pub fn with_model(model: Arc<dyn SentimentModel>) -> Self {
        NeuralScorer {
            model: Some(model),
            stalled: AtomicBool::new(false),
            max_chars: DEFAULT_MAX_CHARS,
            timeout: DEFAULT_TIMEOUT,
            span: component_span("neural_scorer"),
        }
    }

    pub fn disabled() -> Self {
        NeuralScorer {
            model: None,
            stalled: AtomicBool::new(false),
            max_chars: DEFAULT_MAX_CHARS,
            timeout: DEFAULT_TIMEOUT,
            span: component_span("neural_scorer"),
        }
    }

    /// Load the artifact at `path`; any failure yields a disabled scorer.
    ///
    /// A directory or `.onnx` file selects the ONNX backend (`onnx`
    /// feature), anything else is read as a JSON linear classifier.
    pub fn load(path: Option<&Path>) -> Self {
        let span = component_span("neural_scorer");
        let scorer = span.in_scope(|| match path {
            None => {
                info!("no neural model configured, neural scorer disabled");
                Self::disabled()
            }
            Some(path) => match load_model(path) {
                Ok(model) => {
                    info!(model = model.name(), path = %path.display(), "loaded neural model");
                    Self::with_model(model)
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "could not load neural model, neural scorer disabled"
                    );
                    Self::disabled()
                }
            },
        });
        scorer.with_span(span)
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled.load(Ordering::Acquire)
    }

    fn infer(&self, model: &Arc<dyn SentimentModel>, text: &str) -> Result<Vec<ClassScore>> {
        let runtime_error = |reason: String| ReviewError::ScorerRuntime {
            scorer: ScorerKind::Neural.to_string(),
            reason,
        };

        let input = truncate_chars(text, self.max_chars);
        let model = Arc::clone(model);
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name("neural-inference".to_string())
            .spawn(move || {
                let _ = tx.send(model.predict(&input));
            })
            .map_err(|e| runtime_error(format!("could not spawn inference thread: {}", e)))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if !self.stalled.swap(true, Ordering::AcqRel) {
                    error!(
                        timeout = ?self.timeout,
                        "neural inference stalled, scorer degraded for the rest of the run"
                    );
                }
                Err(runtime_error(format!(
                    "inference timed out after {:?}",
                    self.timeout
                )))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(runtime_error("inference thread panicked".to_string()))
            }
        }
    }
}

impl Scorer for NeuralScorer {
    fn kind(&self) -> ScorerKind {
        ScorerKind::Neural
    }

    fn is_available(&self) -> bool {
        self.model.is_some() && !self.is_stalled()
    }

    fn try_score(&self, text: &str) -> Result<ScorerResult> {
        let Some(model) = &self.model else {
            return Err(ReviewError::ScorerUnavailable {
                scorer: ScorerKind::Neural.to_string(),
                reason: "model not loaded".to_string(),
            });
        };
        if self.is_stalled() {
            return Err(ReviewError::ScorerUnavailable {
                scorer: ScorerKind::Neural.to_string(),
                reason: "inference stalled after a timeout".to_string(),
            });
        }

        let _guard = self.span.enter();
        if text.trim().is_empty() {
            return Ok(ScorerResult::fallback(ScorerKind::Neural));
        }

        let probabilities = self.infer(model, text)?;
        let result = decide(probabilities);
        debug!(label = %result.label, score = result.score, "neural scored");
        Ok(result)
    }

    fn score(&self, text: &str) -> ScorerResult {
        // Disabled at startup or stalled: no inference, no per-call log noise
        if !self.is_available() {
            return ScorerResult::fallback(ScorerKind::Neural);
        }

        match self.try_score(text) {
            Ok(result) => result,
            Err(e) => {
                let _guard = self.span.enter();
                warn!(error = %e, "neural scoring failed, using fallback");
                ScorerResult::fallback(ScorerKind::Neural)
            }
        }
    }
}

// ============================================================================
// BACKEND SELECTION
// ============================================================================

fn is_onnx_artifact(path: &Path) -> bool {
    path.is_dir() || path.extension().is_some_and(|ext| ext == "onnx")
}

fn load_model(path: &Path) -> Result<Arc<dyn SentimentModel>> {
    if is_onnx_artifact(path) {
        return load_onnx(path);
    }
    Ok(Arc::new(LinearTextClassifier::load(path)?))
}

#[cfg(feature = "onnx")]
fn load_onnx(path: &Path) -> Result<Arc<dyn SentimentModel>> {
    let model_dir = if path.is_dir() {
        path
    } else {
        path.parent().unwrap_or(Path::new("."))
    };
    Ok(Arc::new(super::onnx::OnnxTextClassifier::load(model_dir)?))
}

#[cfg(not(feature = "onnx"))]
fn load_onnx(path: &Path) -> Result<Arc<dyn SentimentModel>> {
    Err(ReviewError::ScorerUnavailable {
        scorer: ScorerKind::Neural.to_string(),
        reason: format!(
            "{} is an ONNX model but the `onnx` feature is not enabled",
            path.display()
        ),
    })
}

/// Higher of POSITIVE/NEGATIVE wins; without both classes the answer is NEUTRAL/0.5.
fn decide(probabilities: Vec<ClassScore>) -> ScorerResult {
    let lookup = |wanted: SentimentLabel| {
        probabilities
            .iter()
            .find(|c| c.label.parse::<SentimentLabel>().ok() == Some(wanted))
            .map(|c| c.probability)
    };

    match (lookup(SentimentLabel::Positive), lookup(SentimentLabel::Negative)) {
        (Some(positive), Some(negative)) if positive.is_finite() && negative.is_finite() => {
            let (label, score) = if positive > negative {
                (SentimentLabel::Positive, positive)
            } else {
                (SentimentLabel::Negative, negative)
            };
            ScorerResult::new(
                ScorerKind::Neural,
                label,
                score,
                ScoreDetails::Neural { probabilities },
            )
        }
        _ => {
            let mut result = ScorerResult::fallback(ScorerKind::Neural);
            result.details = ScoreDetails::Neural { probabilities };
            result
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    struct FixedModel {
        scores: Vec<(&'static str, f64)>,
    }

    impl SentimentModel for FixedModel {
        fn name(&self) -> &str {
            "fixed"
        }

        fn predict(&self, _text: &str) -> Result<Vec<ClassScore>> {
            Ok(self
                .scores
                .iter()
                .map(|(label, probability)| ClassScore {
                    label: label.to_string(),
                    probability: *probability,
                })
                .collect())
        }
    }

    struct RecordingModel {
        seen: Mutex<Vec<usize>>,
    }

    impl SentimentModel for RecordingModel {
        fn name(&self) -> &str {
            "recording"
        }

        fn predict(&self, text: &str) -> Result<Vec<ClassScore>> {
            self.seen.lock().unwrap().push(text.chars().count());
            Ok(vec![
                ClassScore {
                    label: "POSITIVE".to_string(),
                    probability: 0.9,
                },
                ClassScore {
                    label: "NEGATIVE".to_string(),
                    probability: 0.1,
                },
            ])
        }
    }

    struct SlowModel;

    impl SentimentModel for SlowModel {
        fn name(&self) -> &str {
            "slow"
        }

        fn predict(&self, _text: &str) -> Result<Vec<ClassScore>> {
            thread::sleep(Duration::from_millis(500));
            Ok(vec![])
        }
    }

    struct PanickingModel;

    impl SentimentModel for PanickingModel {
        fn name(&self) -> &str {
            "panics"
        }

        fn predict(&self, _text: &str) -> Result<Vec<ClassScore>> {
            panic!("model exploded")
        }
    }

    fn toy_model_json() -> String {
        serde_json::json!({
            "name": "toy",
            "labels": ["NEGATIVE", "POSITIVE"],
            "vocabulary": {"great": 0, "terrible": 1, "crashes": 2},
            "weights": [[-2.0, 3.0, 2.0], [3.0, -2.0, -1.0]],
            "bias": [0.0, 0.0]
        })
        .to_string()
    }

    #[test]
    fn test_picks_higher_probability() {
        let scorer = NeuralScorer::with_model(Arc::new(FixedModel {
            scores: vec![("NEGATIVE", 0.2), ("POSITIVE", 0.8)],
        }));
        let result = scorer.score("love it");

        assert_eq!(result.label, SentimentLabel::Positive);
        assert!((result.score - 0.8).abs() < 1e-12);
        assert!(result.available);
    }

    #[test]
    fn test_missing_class_is_neutral() {
        let scorer = NeuralScorer::with_model(Arc::new(FixedModel {
            scores: vec![("POSITIVE", 0.99)],
        }));
        let result = scorer.score("love it");

        assert_eq!(result.label, SentimentLabel::Neutral);
        assert_eq!(result.score, 0.5);
    }

    #[test]
    fn test_disabled_scorer_returns_fallback() {
        let scorer = NeuralScorer::disabled();
        assert!(!scorer.is_available());

        let result = scorer.score("This app is terrible");
        assert_eq!(result.label, SentimentLabel::Neutral);
        assert_eq!(result.score, 0.5);
        assert!(!result.available);
    }

    #[test]
    fn test_load_failure_disables() {
        let scorer = NeuralScorer::load(Some(Path::new("/nonexistent/model.json")));
        assert!(!scorer.is_available());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"labels\": []}}").unwrap();
        let scorer = NeuralScorer::load(Some(file.path()));
        assert!(!scorer.is_available());

        assert!(!NeuralScorer::load(None).is_available());
    }

    #[test]
    fn test_load_linear_model() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", toy_model_json()).unwrap();

        let scorer = NeuralScorer::load(Some(file.path()));
        assert!(scorer.is_available());

        let negative = scorer.score("Terrible app, crashes daily");
        assert_eq!(negative.label, SentimentLabel::Negative);
        assert!(negative.score > 0.5);

        let positive = scorer.score("great great app");
        assert_eq!(positive.label, SentimentLabel::Positive);
    }

    #[test]
    fn test_invalid_artifact_shape() {
        let raw = serde_json::json!({
            "labels": ["NEGATIVE", "POSITIVE"],
            "vocabulary": {"great": 0},
            "weights": [[1.0, 2.0], [0.5, 0.5]],
            "bias": [0.0, 0.0]
        })
        .to_string();

        assert!(matches!(
            LinearTextClassifier::from_json(&raw),
            Err(ReviewError::ScorerUnavailable { .. })
        ));
    }

    #[test]
    fn test_truncates_long_text() {
        let model = Arc::new(RecordingModel {
            seen: Mutex::new(Vec::new()),
        });
        let scorer = NeuralScorer::with_model(model.clone());

        let long_text = "é".repeat(2000);
        let result = scorer.score(&long_text);

        assert_eq!(result.label, SentimentLabel::Positive);
        assert_eq!(*model.seen.lock().unwrap(), vec![DEFAULT_MAX_CHARS]);
    }

    #[test]
    fn test_timeout_degrades() {
        let scorer = NeuralScorer::with_model(Arc::new(SlowModel))
            .with_timeout(Duration::from_millis(20));
        let result = scorer.score("anything");

        assert_eq!(result.label, SentimentLabel::Neutral);
        assert_eq!(result.score, 0.5);
        assert!(!result.available);
    }

    struct HungModel {
        calls: AtomicUsize,
    }

    impl SentimentModel for HungModel {
        fn name(&self) -> &str {
            "hung"
        }

        fn predict(&self, _text: &str) -> Result<Vec<ClassScore>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(300));
            Ok(vec![])
        }
    }

    #[test]
    fn test_timeout_stops_further_inference() {
        let model = Arc::new(HungModel {
            calls: AtomicUsize::new(0),
        });
        let scorer =
            NeuralScorer::with_model(model.clone()).with_timeout(Duration::from_millis(5));

        for _ in 0..50 {
            let result = scorer.score("still waiting");
            assert_eq!(result.label, SentimentLabel::Neutral);
            assert!(!result.available);
        }

        // Let the abandoned call finish before counting
        thread::sleep(Duration::from_millis(350));
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        assert!(scorer.is_stalled());
        assert!(!scorer.is_available());
    }

    #[test]
    fn test_onnx_artifact_detection() {
        let dir = tempfile::tempdir().unwrap();
        assert!(is_onnx_artifact(dir.path()));
        assert!(is_onnx_artifact(Path::new("models/sst2/model.onnx")));
        assert!(!is_onnx_artifact(Path::new("models/linear.json")));

        // Empty directory: no model.onnx (or no onnx backend), so disabled
        assert!(!NeuralScorer::load(Some(dir.path())).is_available());
    }

    #[test]
    fn test_panicking_model_degrades() {
        let scorer = NeuralScorer::with_model(Arc::new(PanickingModel));
        let result = scorer.score("anything");
        assert_eq!(result.label, SentimentLabel::Neutral);
        assert_eq!(result.score, 0.5);
    }

    #[test]
    fn test_empty_text_fallback() {
        let scorer = NeuralScorer::with_model(Arc::new(FixedModel {
            scores: vec![("NEGATIVE", 0.9), ("POSITIVE", 0.1)],
        }));
        let result = scorer.score("   ");
        assert_eq!(result.label, SentimentLabel::Neutral);
        assert_eq!(result.score, 0.5);
    }
}
