//! Sentiment classification service.
//!
//! Runs a fine-tuned BERT-family sequence classifier through Candle. The
//! class count is whatever the checkpoint declares; per-class probabilities
//! are converted to a single score in [-1, 1] with dedicated formulas for
//! 2, 3, and 5 classes and an argmax interpolation for anything else.
//!
//! Inference failures never propagate: the service answers with a neutral
//! result (score 0, confidence 0) so the recommendation flow always
//! proceeds.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use candle_core::{D, Device, IndexOp, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use serde::Deserialize;
use tokenizers::{PaddingParams, Tokenizer, TruncationParams};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use locarank_core::{Error, ProductType, Result, SentimentLabel, SentimentResult};

/// Public multilingual star-rating checkpoint used when no local model
/// directory is configured (5 classes).
pub const FALLBACK_MODEL: &str = "nlptown/bert-base-multilingual-uncased-sentiment";

/// One comment to classify.
#[derive(Debug, Clone)]
pub struct SentimentInput {
    pub product_id: String,
    pub client_id: String,
    pub comment: String,
    pub product_type: Option<ProductType>,
}

#[derive(Debug, Deserialize)]
struct HeadConfig {
    #[serde(default)]
    id2label: Option<HashMap<String, String>>,
    #[serde(default)]
    num_labels: Option<usize>,
}

struct Classifier {
    model: BertModel,
    head: Linear,
    tokenizer: Tokenizer,
    device: Device,
    num_labels: usize,
}

/// Lazily-initialized sentiment service handle. Cheap to clone.
#[derive(Clone)]
pub struct SentimentService {
    model_path: PathBuf,
    classifier: Arc<OnceCell<Arc<Classifier>>>,
}

impl SentimentService {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            classifier: Arc::new(OnceCell::new()),
        }
    }

    /// Classify one comment. Never fails: any load or inference error
    /// collapses to a neutral result.
    pub async fn analyze(&self, input: SentimentInput) -> SentimentResult {
        match self.try_analyze(&input).await {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    product_id = %input.product_id,
                    error = %e,
                    "sentiment inference failed; returning neutral result"
                );
                SentimentResult::neutral(input.client_id, input.product_id, input.product_type)
            }
        }
    }

    /// Classify a batch of comments, preserving input order.
    pub async fn analyze_batch(&self, inputs: Vec<SentimentInput>) -> Vec<SentimentResult> {
        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            results.push(self.analyze(input).await);
        }
        results
    }

    pub async fn health_check(&self) -> bool {
        let probe = SentimentInput {
            product_id: "health".to_string(),
            client_id: "health".to_string(),
            comment: "service check".to_string(),
            product_type: None,
        };
        self.try_analyze(&probe).await.is_ok()
    }

    async fn try_analyze(&self, input: &SentimentInput) -> Result<SentimentResult> {
        let classifier = self.loaded().await?;
        let comment = input.comment.clone();

        let probabilities = tokio::task::spawn_blocking(move || classifier.predict(&comment))
            .await
            .map_err(|e| Error::internal(format!("sentiment task join error: {e}")))??;

        let predicted = probabilities
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let confidence = probabilities.iter().copied().fold(0.0_f64, f64::max);

        let score = score_from_probabilities(&probabilities, predicted);
        Ok(SentimentResult {
            client_id: input.client_id.clone(),
            product_id: input.product_id.clone(),
            sentiment_score: score,
            sentiment_label: SentimentLabel::from_score(score),
            confidence,
            product_type: input.product_type,
        })
    }

    async fn loaded(&self) -> Result<Arc<Classifier>> {
        let model_path = self.model_path.clone();
        self.classifier
            .get_or_try_init(|| async move {
                tokio::task::spawn_blocking(move || Classifier::load(&model_path).map(Arc::new))
                    .await
                    .map_err(|e| Error::internal(format!("sentiment load join error: {e}")))?
            })
            .await
            .cloned()
    }
}

/// Convert per-class probabilities to a score in [-1, 1].
///
/// * 2 classes `[negative, positive]`: p(pos) − p(neg)
/// * 3 classes `[negative, neutral, positive]`: p(pos) − p(neg)
/// * 5 classes (star ratings): (Σ (i+1)·pᵢ − 3) / 2
/// * anything else: interpolate the argmax position onto [-1, 1]
pub fn score_from_probabilities(probabilities: &[f64], predicted: usize) -> f64 {
    let score = match probabilities.len() {
        2 => probabilities[1] - probabilities[0],
        3 => probabilities[2] - probabilities[0],
        5 => {
            let weighted: f64 = probabilities
                .iter()
                .enumerate()
                .map(|(i, p)| (i as f64 + 1.0) * p)
                .sum();
            (weighted - 3.0) / 2.0
        }
        0 | 1 => 0.0,
        k => (predicted as f64 / (k as f64 - 1.0)) * 2.0 - 1.0,
    };
    // Round to 4 decimals so cached and recomputed scores compare equal.
    (score.clamp(-1.0, 1.0) * 10_000.0).round() / 10_000.0
}

impl Classifier {
    fn load(model_path: &Path) -> Result<Self> {
        let (config_path, tokenizer_path, weights_path) = if has_local_checkpoint(model_path) {
            info!(path = %model_path.display(), "loading sentiment model from local directory");
            (
                model_path.join("config.json"),
                model_path.join("tokenizer.json"),
                model_path.join("model.safetensors"),
            )
        } else {
            warn!(
                path = %model_path.display(),
                fallback = FALLBACK_MODEL,
                "sentiment model directory missing; fetching public fallback checkpoint"
            );
            let api =
                hf_hub::api::sync::Api::new().map_err(|e| Error::unavailable("hf-hub", e))?;
            let repo = api.model(FALLBACK_MODEL.to_string());
            (
                repo.get("config.json").map_err(|e| Error::unavailable("hf-hub", e))?,
                repo.get("tokenizer.json").map_err(|e| Error::unavailable("hf-hub", e))?,
                repo.get("model.safetensors")
                    .map_err(|e| Error::unavailable("hf-hub", e))?,
            )
        };

        let device = Device::Cpu;

        let raw_config = fs::read_to_string(&config_path)
            .map_err(|e| Error::unavailable("sentiment-model", e))?;
        let config: Config = serde_json::from_str(&raw_config)
            .map_err(|e| Error::unavailable("sentiment-model", e))?;
        let head_config: HeadConfig = serde_json::from_str(&raw_config)
            .map_err(|e| Error::unavailable("sentiment-model", e))?;
        let num_labels = head_config
            .id2label
            .as_ref()
            .map(|labels| labels.len())
            .or(head_config.num_labels)
            .ok_or_else(|| {
                Error::unavailable("sentiment-model", "config declares no label set")
            })?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| Error::unavailable("sentiment-model", e))?;
        tokenizer.with_padding(Some(PaddingParams::default()));
        tokenizer
            .with_truncation(Some(TruncationParams { max_length: 512, ..Default::default() }))
            .map_err(|e| Error::unavailable("sentiment-model", e))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, &device)
                .map_err(|e| Error::unavailable("sentiment-model", e))?
        };
        let model = BertModel::load(vb.pp("bert"), &config)
            .map_err(|e| Error::unavailable("sentiment-model", e))?;
        let head = candle_nn::linear(config.hidden_size, num_labels, vb.pp("classifier"))
            .map_err(|e| Error::unavailable("sentiment-model", e))?;

        info!(num_labels, "sentiment model loaded");
        Ok(Self { model, head, tokenizer, device, num_labels })
    }

    /// Per-class probabilities for one text.
    fn predict(&self, text: &str) -> Result<Vec<f64>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| Error::Inference(e.to_string()))?;

        let inference = || -> candle_core::Result<Vec<f64>> {
            let input_ids = Tensor::new(encoding.get_ids(), &self.device)?.unsqueeze(0)?;
            let token_type_ids =
                Tensor::new(encoding.get_type_ids(), &self.device)?.unsqueeze(0)?;
            let attention_mask =
                Tensor::new(encoding.get_attention_mask(), &self.device)?.unsqueeze(0)?;

            let hidden = self
                .model
                .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
            // Classify from the [CLS] position.
            let cls = hidden.i((.., 0))?;
            let logits = self.head.forward(&cls)?;
            let probabilities = candle_nn::ops::softmax(&logits, D::Minus1)?;
            let row = probabilities.squeeze(0)?.to_vec1::<f32>()?;
            Ok(row.into_iter().map(f64::from).collect())
        };

        let probabilities = inference().map_err(|e| Error::Inference(e.to_string()))?;
        if probabilities.len() != self.num_labels {
            return Err(Error::Inference(format!(
                "expected {} class probabilities, got {}",
                self.num_labels,
                probabilities.len()
            )));
        }
        Ok(probabilities)
    }
}

fn has_local_checkpoint(path: &Path) -> bool {
    path.join("config.json").exists()
        && path.join("tokenizer.json").exists()
        && path.join("model.safetensors").exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_score_is_probability_difference() {
        let score = score_from_probabilities(&[0.2, 0.8], 1);
        assert!((score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn three_class_neutral_contributes_nothing() {
        let score = score_from_probabilities(&[0.1, 0.8, 0.1], 1);
        assert!(score.abs() < 1e-9);

        let positive = score_from_probabilities(&[0.1, 0.2, 0.7], 2);
        assert!((positive - 0.6).abs() < 1e-9);
    }

    #[test]
    fn five_class_star_formula() {
        // All mass on 5 stars: (5 - 3) / 2 = 1.
        let score = score_from_probabilities(&[0.0, 0.0, 0.0, 0.0, 1.0], 4);
        assert!((score - 1.0).abs() < 1e-9);

        // All mass on 1 star: (1 - 3) / 2 = -1.
        let score = score_from_probabilities(&[1.0, 0.0, 0.0, 0.0, 0.0], 0);
        assert!((score + 1.0).abs() < 1e-9);

        // Uniform mass lands on neutral.
        let score = score_from_probabilities(&[0.2; 5], 0);
        assert!(score.abs() < 1e-9);
    }

    #[test]
    fn unusual_class_count_uses_argmax_interpolation() {
        // k=4: argmax 0 → -1, argmax 3 → 1, argmax 1 → -1/3.
        assert!((score_from_probabilities(&[0.7, 0.1, 0.1, 0.1], 0) + 1.0).abs() < 1e-9);
        assert!((score_from_probabilities(&[0.1, 0.1, 0.1, 0.7], 3) - 1.0).abs() < 1e-9);
        let mid = score_from_probabilities(&[0.1, 0.7, 0.1, 0.1], 1);
        assert!((mid + 1.0 / 3.0).abs() < 1e-4);
    }

    #[test]
    fn degenerate_class_counts_are_neutral() {
        assert_eq!(score_from_probabilities(&[], 0), 0.0);
        assert_eq!(score_from_probabilities(&[1.0], 0), 0.0);
    }

    #[test]
    fn score_is_always_within_bounds() {
        let cases: [&[f64]; 4] = [
            &[1.0, 0.0],
            &[0.0, 0.0, 1.0],
            &[0.0, 0.0, 0.0, 0.0, 1.0],
            &[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0],
        ];
        for probs in cases {
            let score = score_from_probabilities(probs, probs.len() - 1);
            assert!((-1.0..=1.0).contains(&score));
        }
    }

    #[tokio::test]
    async fn analyze_degrades_to_neutral_when_model_is_unreadable() {
        // A directory that looks like a checkpoint but holds garbage: the
        // load fails locally and the neutral contract applies.
        let dir = tempfile::tempdir().unwrap();
        for name in ["config.json", "tokenizer.json", "model.safetensors"] {
            fs::write(dir.path().join(name), "not a model").unwrap();
        }
        let service = SentimentService::new(dir.path());

        let result = service
            .analyze(SentimentInput {
                product_id: "p1".to_string(),
                client_id: "c1".to_string(),
                comment: "Excellent service".to_string(),
                product_type: Some(ProductType::Vehicle),
            })
            .await;

        assert_eq!(result.sentiment_label, SentimentLabel::Neutral);
        assert_eq!(result.sentiment_score, 0.0);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.product_id, "p1");
    }
}
