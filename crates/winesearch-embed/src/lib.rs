use std::sync::Arc;

use tracing::info;
use winesearch_core::config::{expand_path, EmbeddingSettings};
use winesearch_core::traits::EmbeddingProvider;

mod device;
mod hash;
mod pool;
mod sentence;
mod tokenize;

pub use device::select_device;
pub use hash::HashEmbedder;
pub use pool::masked_mean_l2;
pub use sentence::SentenceEmbedder;
pub use tokenize::tokenize_batch;

/// Hash embeddings when `APP_USE_HASH_EMBEDDINGS` is truthy or the settings
/// ask for them, the sentence model otherwise.
pub fn default_embedder(settings: &EmbeddingSettings) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let from_env = std::env::var("APP_USE_HASH_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if from_env || settings.use_hash_embedder {
        info!(dim = settings.dim, "using hash embedder");
        return Ok(Arc::new(HashEmbedder::new(settings.dim)));
    }
    let model_dir = resolve_model_dir(&settings.model_dir)?;
    let embedder = SentenceEmbedder::load(&model_dir, settings.max_len)?;
    if embedder.dim() != settings.dim {
        anyhow::bail!(
            "model {} produces {} dimensions but embedding.dim is {}",
            embedder.model_id(),
            embedder.dim(),
            settings.dim
        );
    }
    Ok(Arc::new(embedder))
}

fn resolve_model_dir(configured: &str) -> anyhow::Result<std::path::PathBuf> {
    if let Ok(dir) = std::env::var("APP_MODEL_DIR") {
        let p = expand_path(&dir);
        if p.exists() {
            return Ok(p);
        }
    }
    let p = expand_path(configured);
    if p.exists() {
        return Ok(p);
    }
    Err(anyhow::anyhow!("Could not locate embedding model directory {}", p.display()))
}
