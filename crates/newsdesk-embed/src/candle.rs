//! BERT sentence encoder running on Candle.
//!
//! The default model is `sentence-transformers/all-MiniLM-L6-v2`:
//! - 384 dimensions
//! - 512 max tokens
//! - mean pooling over the last hidden state, then L2 normalisation
//!
//! Weights are fetched from the Hugging Face hub on first use and cached on
//! disk. Loading happens exactly once per embedder, even when several tasks
//! race to embed first.

use std::path::PathBuf;

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use hf_hub::api::tokio::ApiBuilder;
use hf_hub::{Repo, RepoType};
use newsdesk_core::{EmbedError, Embedder, EmbeddingConfig, EmbeddingOutput};
use tokenizers::Tokenizer;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Default model on the Hugging Face hub.
pub const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Output dimension of [`DEFAULT_MODEL`].
pub const DEFAULT_DIMENSION: usize = 384;

/// Maximum sequence length. Longer input is truncated.
const MAX_TOKENS: usize = 512;

struct LoadedModel {
    model: BertModel,
    tokenizer: Tokenizer,
}

/// Sentence embedder backed by a BERT model.
pub struct CandleEmbedder {
    model_id: String,
    dimension: usize,
    device: Device,
    cache_dir: PathBuf,
    loaded: OnceCell<LoadedModel>,
}

impl CandleEmbedder {
    /// Embedder for [`DEFAULT_MODEL`], caching weights under `cache_dir`.
    pub fn new(cache_dir: PathBuf) -> Self {
        Self::with_model(cache_dir, DEFAULT_MODEL, DEFAULT_DIMENSION)
    }

    /// Embedder for any BERT-style model on the hub.
    ///
    /// `dimension` must equal the model's hidden size; it is checked when
    /// the model loads.
    pub fn with_model(cache_dir: PathBuf, model_id: impl Into<String>, dimension: usize) -> Self {
        let device = Device::cuda_if_available(0).unwrap_or(Device::Cpu);
        info!("CandleEmbedder using device: {:?}", device);
        Self {
            model_id: model_id.into(),
            dimension,
            device,
            cache_dir,
            loaded: OnceCell::new(),
        }
    }

    /// Download (if needed) and load the model.
    ///
    /// Idempotent. Concurrent callers wait for a single load.
    pub async fn init(&self) -> Result<(), EmbedError> {
        self.loaded().await.map(|_| ())
    }

    async fn loaded(&self) -> Result<&LoadedModel, EmbedError> {
        self.loaded.get_or_try_init(|| self.load()).await
    }

    async fn load(&self) -> Result<LoadedModel, EmbedError> {
        info!("Loading embedding model {}", self.model_id);

        let api = ApiBuilder::new()
            .with_cache_dir(self.cache_dir.clone())
            .build()
            .map_err(|e| EmbedError::ModelLoad(format!("hub client: {e}")))?;
        let repo = api.repo(Repo::new(self.model_id.clone(), RepoType::Model));

        let mut paths = Vec::with_capacity(3);
        for file in ["tokenizer.json", "config.json", "model.safetensors"] {
            debug!("Fetching {}", file);
            let path = repo
                .get(file)
                .await
                .map_err(|e| EmbedError::ModelLoad(format!("download {file}: {e}")))?;
            paths.push(path);
        }
        let [tokenizer_path, config_path, weights_path]: [PathBuf; 3] = paths
            .try_into()
            .map_err(|_| EmbedError::ModelLoad("incomplete model download".to_string()))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbedError::ModelLoad(format!("tokenizer: {e}")))?;

        let raw_config = tokio::fs::read_to_string(&config_path)
            .await
            .map_err(|e| EmbedError::ModelLoad(format!("read config: {e}")))?;
        let hidden_size = serde_json::from_str::<serde_json::Value>(&raw_config)
            .ok()
            .and_then(|v| v.get("hidden_size").and_then(serde_json::Value::as_u64));
        if let Some(actual) = hidden_size {
            if actual as usize != self.dimension {
                return Err(EmbedError::DimensionMismatch {
                    expected: self.dimension,
                    actual: actual as usize,
                });
            }
        }
        let config: Config = serde_json::from_str(&raw_config)
            .map_err(|e| EmbedError::ModelLoad(format!("parse config: {e}")))?;

        // SAFETY: the weights file is only read, and the hub cache does not
        // rewrite files in place.
        #[allow(unsafe_code)]
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &self.device)
                .map_err(|e| EmbedError::ModelLoad(format!("weights: {e}")))?
        };
        let model = BertModel::load(vb, &config)
            .map_err(|e| EmbedError::ModelLoad(format!("BERT model: {e}")))?;

        info!("Embedding model {} ready", self.model_id);
        Ok(LoadedModel { model, tokenizer })
    }

    async fn encode_batch(
        &self,
        texts: &[&str],
        normalize: bool,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        let LoadedModel { model, tokenizer } = self.loaded().await?;

        let encodings = tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbedError::Inference(format!("tokenization: {e}")))?;

        let max_len = encodings
            .iter()
            .map(|e| e.len())
            .max()
            .unwrap_or(0)
            .min(MAX_TOKENS);
        let batch_size = texts.len();

        let mut input_ids = Vec::with_capacity(batch_size * max_len);
        let mut attention_mask = Vec::with_capacity(batch_size * max_len);
        let mut token_counts = Vec::with_capacity(batch_size);

        for encoding in &encodings {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let len = ids.len().min(max_len);
            token_counts.push(mask[..len].iter().filter(|&&m| m == 1).count());

            input_ids.extend_from_slice(&ids[..len]);
            attention_mask.extend_from_slice(&mask[..len]);
            input_ids.extend(std::iter::repeat(0).take(max_len - len));
            attention_mask.extend(std::iter::repeat(0).take(max_len - len));
        }

        let shape = (batch_size, max_len);
        let input_ids =
            Tensor::from_vec(input_ids, shape, &self.device).map_err(inference("input_ids"))?;
        let attention_mask = Tensor::from_vec(attention_mask, shape, &self.device)
            .map_err(inference("attention_mask"))?;
        let token_type_ids = input_ids.zeros_like().map_err(inference("token_type_ids"))?;

        let hidden = model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(inference("forward"))?;

        let pooled = mean_pooling(&hidden, &attention_mask)?;
        let embeddings = if normalize {
            l2_normalize(&pooled)?
        } else {
            pooled
        };

        let rows = embeddings
            .to_vec2::<f32>()
            .map_err(inference("to_vec2"))?;
        Ok(rows
            .into_iter()
            .zip(token_counts)
            .map(|(embedding, token_count)| EmbeddingOutput {
                embedding,
                token_count,
            })
            .collect())
    }
}

fn inference(stage: &'static str) -> impl Fn(candle_core::Error) -> EmbedError {
    move |e| EmbedError::Inference(format!("{stage}: {e}"))
}

/// Average token embeddings, ignoring padding.
fn mean_pooling(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor, EmbedError> {
    let mask = attention_mask
        .to_dtype(DType::F32)
        .and_then(|m| m.unsqueeze(2))
        .and_then(|m| m.broadcast_as(hidden.shape()))
        .map_err(inference("mask"))?;

    let summed = hidden
        .mul(&mask)
        .and_then(|t| t.sum(1))
        .map_err(inference("masked sum"))?;
    let counts = mask
        .sum(1)
        .and_then(|t| t.clamp(1e-9, f64::MAX))
        .map_err(inference("mask count"))?;

    summed.div(&counts).map_err(inference("mean"))
}

fn l2_normalize(embeddings: &Tensor) -> Result<Tensor, EmbedError> {
    let norm = embeddings
        .sqr()
        .and_then(|t| t.sum_keepdim(1))
        .and_then(|t| t.sqrt())
        .and_then(|t| t.clamp(1e-12, f64::MAX))
        .map_err(inference("norm"))?;
    embeddings.broadcast_div(&norm).map_err(inference("normalize"))
}

#[async_trait]
impl Embedder for CandleEmbedder {
    fn model_name(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_tokens(&self) -> usize {
        MAX_TOKENS
    }

    async fn embed_text(
        &self,
        texts: &[&str],
        config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EmbedError::EmptyInput);
        }

        debug!(
            "Embedding {} texts with batch_size {}",
            texts.len(),
            config.batch_size
        );

        let mut outputs = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(config.batch_size.max(1)) {
            outputs.extend(self.encode_batch(chunk, config.normalize).await?);
        }
        Ok(outputs)
    }
}
