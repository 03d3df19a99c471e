//! Bi-encoder embedding service.
//!
//! Wraps a BERT-family sentence encoder run locally through Candle. The
//! model loads lazily on first use; concurrent first calls share a single
//! initialization. When the configured model directory is missing, a public
//! multilingual checkpoint is fetched from the Hugging Face hub instead and
//! the fallback is logged exactly once (by virtue of the one-shot init).
//!
//! All outputs are ℓ₂-normalized so cosine similarity reduces to a dot
//! product downstream.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use tokenizers::{PaddingParams, Tokenizer, TruncationParams};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use locarank_core::{Error, Result};

/// Public multilingual checkpoint used when no local model directory is
/// configured. BERT-family so the local runtime can execute it; 768-dim.
pub const FALLBACK_MODEL: &str = "sentence-transformers/LaBSE";

/// Forward-pass batch cap; larger inputs are chunked.
const MAX_BATCH: usize = 32;

/// Resolved file locations for one checkpoint.
struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

struct Encoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
}

/// Lazily-initialized embedding service handle. Cheap to clone.
#[derive(Clone)]
pub struct EmbeddingService {
    model_path: PathBuf,
    expected_dimension: usize,
    encoder: Arc<OnceCell<Arc<Encoder>>>,
}

impl EmbeddingService {
    pub fn new(model_path: impl Into<PathBuf>, expected_dimension: usize) -> Self {
        Self {
            model_path: model_path.into(),
            expected_dimension,
            encoder: Arc::new(OnceCell::new()),
        }
    }

    /// Embedding dimension once the model is loaded; the configured value
    /// before that.
    pub async fn dimension(&self) -> usize {
        match self.encoder.get() {
            Some(encoder) => encoder.dimension,
            None => self.expected_dimension,
        }
    }

    /// Encode one text into a unit-norm vector.
    pub async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.encode_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::Inference("encoder returned no vector".to_string()))
    }

    /// Encode many texts, chunked at the internal batch cap. Output order
    /// matches input order.
    pub async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let encoder = self.loaded().await?;

        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_BATCH) {
            let encoder = Arc::clone(&encoder);
            let batch: Vec<String> = chunk.to_vec();
            // CPU-bound forward pass; keep it off the async workers.
            let vectors = tokio::task::spawn_blocking(move || encoder.encode(&batch))
                .await
                .map_err(|e| Error::internal(format!("embedding task join error: {e}")))??;
            out.extend(vectors);
        }
        Ok(out)
    }

    /// True when the model is loaded and produces a vector of the expected
    /// dimension.
    pub async fn health_check(&self) -> bool {
        match self.encode("health check").await {
            Ok(vector) => {
                let dim = self.dimension().await;
                vector.len() == dim
            }
            Err(e) => {
                warn!(error = %e, "embedding health check failed");
                false
            }
        }
    }

    async fn loaded(&self) -> Result<Arc<Encoder>> {
        let model_path = self.model_path.clone();
        self.encoder
            .get_or_try_init(|| async move {
                tokio::task::spawn_blocking(move || Encoder::load(&model_path).map(Arc::new))
                    .await
                    .map_err(|e| Error::internal(format!("embedding load join error: {e}")))?
            })
            .await
            .cloned()
    }
}

impl Encoder {
    fn load(model_path: &Path) -> Result<Self> {
        let files = if has_local_checkpoint(model_path) {
            info!(path = %model_path.display(), "loading embedding model from local directory");
            ModelFiles {
                config: model_path.join("config.json"),
                tokenizer: model_path.join("tokenizer.json"),
                weights: model_path.join("model.safetensors"),
            }
        } else {
            warn!(
                path = %model_path.display(),
                fallback = FALLBACK_MODEL,
                "embedding model directory missing; fetching public fallback checkpoint"
            );
            fetch_hub_files(FALLBACK_MODEL)?
        };

        let device = Device::Cpu;

        let raw_config = fs::read_to_string(&files.config)
            .map_err(|e| Error::unavailable("embedding-model", e))?;
        let config: Config = serde_json::from_str(&raw_config)
            .map_err(|e| Error::unavailable("embedding-model", e))?;

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| Error::unavailable("embedding-model", e))?;
        tokenizer.with_padding(Some(PaddingParams::default()));
        tokenizer
            .with_truncation(Some(TruncationParams { max_length: 512, ..Default::default() }))
            .map_err(|e| Error::unavailable("embedding-model", e))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[files.weights], DTYPE, &device)
                .map_err(|e| Error::unavailable("embedding-model", e))?
        };
        let model =
            BertModel::load(vb, &config).map_err(|e| Error::unavailable("embedding-model", e))?;

        let dimension = config.hidden_size;
        info!(dimension, "embedding model loaded");

        Ok(Self { model, tokenizer, device, dimension })
    }

    /// Tokenize, forward, mean-pool over the attention mask, ℓ₂-normalize.
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| Error::Inference(e.to_string()))?;

        let inference = || -> candle_core::Result<Vec<Vec<f32>>> {
            let ids = encodings
                .iter()
                .map(|e| Tensor::new(e.get_ids(), &self.device))
                .collect::<candle_core::Result<Vec<_>>>()?;
            let input_ids = Tensor::stack(&ids, 0)?;

            let type_ids = encodings
                .iter()
                .map(|e| Tensor::new(e.get_type_ids(), &self.device))
                .collect::<candle_core::Result<Vec<_>>>()?;
            let token_type_ids = Tensor::stack(&type_ids, 0)?;

            let masks = encodings
                .iter()
                .map(|e| Tensor::new(e.get_attention_mask(), &self.device))
                .collect::<candle_core::Result<Vec<_>>>()?;
            let attention_mask = Tensor::stack(&masks, 0)?;

            let hidden = self
                .model
                .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

            // Mean pooling over non-padding positions.
            let mask = attention_mask.to_dtype(DTYPE)?.unsqueeze(2)?;
            let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
            let counts = mask.sum(1)?;
            let pooled = summed.broadcast_div(&counts)?;

            let norms = pooled.sqr()?.sum_keepdim(1)?.sqrt()?;
            let normalized = pooled.broadcast_div(&norms)?;

            normalized.to_vec2::<f32>()
        };

        inference().map_err(|e| Error::Inference(e.to_string()))
    }
}

fn has_local_checkpoint(path: &Path) -> bool {
    path.join("config.json").exists()
        && path.join("tokenizer.json").exists()
        && path.join("model.safetensors").exists()
}

fn fetch_hub_files(model_id: &str) -> Result<ModelFiles> {
    let api = hf_hub::api::sync::Api::new().map_err(|e| Error::unavailable("hf-hub", e))?;
    let repo = api.model(model_id.to_string());
    Ok(ModelFiles {
        config: repo.get("config.json").map_err(|e| Error::unavailable("hf-hub", e))?,
        tokenizer: repo.get("tokenizer.json").map_err(|e| Error::unavailable("hf-hub", e))?,
        weights: repo
            .get("model.safetensors")
            .map_err(|e| Error::unavailable("hf-hub", e))?,
    })
}
