use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use winesearch_core::error::EmbeddingError;
use winesearch_core::traits::EmbeddingProvider;

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_batch;

struct Inner {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    max_len: usize,
    dim: usize,
}

impl Inner {
    fn embed_texts(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_batch(&self.tokenizer, texts, self.max_len, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let vectors: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        if elapsed_ms > 1_000 {
            warn!(texts = texts.len(), elapsed_ms, "slow embedding batch");
        } else {
            debug!(texts = texts.len(), elapsed_ms, "embedded batch");
        }
        Ok(vectors)
    }
}

/// BERT sentence-transformer (all-MiniLM-L6-v2 by default) with masked mean
/// pooling. Inference runs on a blocking thread.
pub struct SentenceEmbedder {
    inner: Arc<Inner>,
    model_id: String,
}

impl SentenceEmbedder {
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = select_device();
        info!(model_dir = %model_dir.display(), "loading sentence embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let config: BertConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let dim = config.hidden_size;

        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = BertModel::load(vb, &config)?;

        let model_id = model_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "sentence-transformer".to_string());
        info!(model = %model_id, dim, "sentence embedding model loaded");
        Ok(Self { inner: Arc::new(Inner { model, tokenizer, device, max_len, dim }), model_id })
    }

    async fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            inner.embed_texts(&refs)
        })
        .await
        .map_err(|e| EmbeddingError::Unavailable(format!("embedding worker stopped: {}", e)))?
        .map_err(|e| EmbeddingError::Failed(e.to_string()))
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return Ok(candle_core::safetensors::load(&safetensors, device)?);
    }
    let pickle: PathBuf = model_dir.join("pytorch_model.bin");
    if pickle.exists() {
        return Ok(candle_core::pickle::read_all(&pickle)?.into_iter().collect());
    }
    Err(anyhow!("no model.safetensors or pytorch_model.bin in {}", model_dir.display()))
}

#[async_trait]
impl EmbeddingProvider for SentenceEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dim(&self) -> usize {
        self.inner.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        self.run(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| EmbeddingError::Failed("model returned no vector".into()))
    }

    async fn embed_many(
        &self,
        texts: &[String],
    ) -> Result<Vec<Result<Vec<f32>, EmbeddingError>>, EmbeddingError> {
        let (present, blank): (Vec<usize>, Vec<usize>) = (0..texts.len()).partition(|&i| !texts[i].trim().is_empty());
        let mut out: Vec<Result<Vec<f32>, EmbeddingError>> = Vec::with_capacity(texts.len());
        out.resize_with(texts.len(), || Err(EmbeddingError::EmptyInput));
        debug!(blank = blank.len(), "embedding batch");
        if present.is_empty() {
            return Ok(out);
        }
        let vectors = self.run(present.iter().map(|&i| texts[i].clone()).collect()).await?;
        if vectors.len() != present.len() {
            return Err(EmbeddingError::Failed(format!("model returned {} vectors for {} texts", vectors.len(), present.len())));
        }
        for (i, v) in present.into_iter().zip(vectors) {
            out[i] = Ok(v);
        }
        Ok(out)
    }
}
