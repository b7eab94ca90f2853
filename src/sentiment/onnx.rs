//! ONNX Runtime backend for pretrained transformer sentiment classifiers.
//!
//! The model directory must contain `model.onnx` and `tokenizer.json`; an
//! optional `config.json` supplies the `id2label` map. Without it the
//! two-class SST-2 order (NEGATIVE, POSITIVE) is assumed.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use serde::Deserialize;
use tokenizers::Tokenizer;
use tracing::info;

use super::neural::{softmax, ClassScore, SentimentModel};
use super::ScorerKind;
use crate::error::{Result, ReviewError};

/// Token limit of BERT-family classifiers
pub const MAX_TOKENS: usize = 512;

const DEFAULT_LABELS: [&str; 2] = ["NEGATIVE", "POSITIVE"];

#[derive(Debug, Default, Deserialize)]
struct ModelConfig {
    #[serde(default, rename = "_name_or_path")]
    name_or_path: Option<String>,
    #[serde(default)]
    id2label: BTreeMap<String, String>,
}

/// Transformer classifier producing one logit per label.
pub struct OnnxTextClassifier {
    name: String,
    // Session::run needs exclusive access
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    labels: Vec<String>,
    uses_type_ids: bool,
}

fn unavailable(reason: String) -> ReviewError {
    ReviewError::ScorerUnavailable {
        scorer: ScorerKind::Neural.to_string(),
        reason,
    }
}

fn runtime(reason: String) -> ReviewError {
    ReviewError::ScorerRuntime {
        scorer: ScorerKind::Neural.to_string(),
        reason,
    }
}

impl OnnxTextClassifier {
    /// Load a classifier from a directory containing `model.onnx` and `tokenizer.json`.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !model_path.exists() {
            return Err(unavailable(format!(
                "model.onnx not found in {}",
                model_dir.display()
            )));
        }
        if !tokenizer_path.exists() {
            return Err(unavailable(format!(
                "tokenizer.json not found in {}",
                model_dir.display()
            )));
        }

        let config = read_config(model_dir)?;
        let labels = labels_from(&config)?;

        let session = Session::builder()
            .map_err(|e| unavailable(format!("onnx session builder: {}", e)))?
            .commit_from_file(&model_path)
            .map_err(|e| unavailable(format!("load {}: {}", model_path.display(), e)))?;

        // DistilBERT exports take no token_type_ids
        let uses_type_ids = session
            .inputs()
            .iter()
            .any(|input| input.name() == "token_type_ids");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| unavailable(format!("load tokenizer: {}", e)))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| unavailable(format!("set truncation: {}", e)))?;

        let name = config
            .name_or_path
            .unwrap_or_else(|| model_dir.display().to_string());

        info!(
            model = %name,
            labels = ?labels,
            uses_type_ids,
            "loaded onnx sentiment model"
        );
        Ok(OnnxTextClassifier {
            name,
            session: Mutex::new(session),
            tokenizer,
            labels,
            uses_type_ids,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

fn read_config(model_dir: &Path) -> Result<ModelConfig> {
    let path = model_dir.join("config.json");
    if !path.exists() {
        return Ok(ModelConfig::default());
    }
    let content = std::fs::read_to_string(&path)?;
    serde_json::from_str(&content)
        .map_err(|e| unavailable(format!("invalid {}: {}", path.display(), e)))
}

/// Labels ordered by class index; falls back to the SST-2 pair.
fn labels_from(config: &ModelConfig) -> Result<Vec<String>> {
    if config.id2label.is_empty() {
        return Ok(DEFAULT_LABELS.iter().map(|l| l.to_string()).collect());
    }

    let mut indexed = Vec::with_capacity(config.id2label.len());
    for (id, label) in &config.id2label {
        let index: usize = id
            .parse()
            .map_err(|_| unavailable(format!("id2label key {:?} is not an index", id)))?;
        indexed.push((index, label.to_uppercase()));
    }
    indexed.sort_by_key(|(index, _)| *index);

    if indexed.iter().enumerate().any(|(i, (index, _))| i != *index) {
        return Err(unavailable("id2label indices are not contiguous".to_string()));
    }
    Ok(indexed.into_iter().map(|(_, label)| label).collect())
}

fn to_i64(values: &[u32]) -> Vec<i64> {
    values.iter().map(|&v| i64::from(v)).collect()
}

impl SentimentModel for OnnxTextClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, text: &str) -> Result<Vec<ClassScore>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| runtime(format!("tokenize: {}", e)))?;

        let shape = [1i64, encoding.get_ids().len() as i64];
        let tensor = |values: &[u32]| {
            Tensor::from_array((shape, to_i64(values).into_boxed_slice()))
                .map_err(|e| runtime(format!("build input tensor: {}", e)))
        };
        let ids_tensor = tensor(encoding.get_ids())?;
        let mask_tensor = tensor(encoding.get_attention_mask())?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| runtime("onnx session lock poisoned".to_string()))?;

        let outputs = if self.uses_type_ids {
            let type_tensor = tensor(encoding.get_type_ids())?;
            session
                .run(ort::inputs![
                    "input_ids" => ids_tensor,
                    "attention_mask" => mask_tensor,
                    "token_type_ids" => type_tensor,
                ])
                .map_err(|e| runtime(format!("inference: {}", e)))?
        } else {
            session
                .run(ort::inputs![
                    "input_ids" => ids_tensor,
                    "attention_mask" => mask_tensor,
                ])
                .map_err(|e| runtime(format!("inference: {}", e)))?
        };

        // Logits: [1, n_labels]
        let (output_shape, output_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| runtime(format!("read logits: {}", e)))?;
        let dims: &[i64] = output_shape;
        if output_data.len() != self.labels.len() {
            return Err(runtime(format!(
                "unexpected output shape {:?} for {} labels",
                dims,
                self.labels.len()
            )));
        }

        let logits: Vec<f64> = output_data.iter().map(|&l| f64::from(l)).collect();
        Ok(self
            .labels
            .iter()
            .zip(softmax(&logits))
            .map(|(label, probability)| ClassScore {
                label: label.clone(),
                probability,
            })
            .collect())
    }
}
