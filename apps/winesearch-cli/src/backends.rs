use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use winesearch_columnar::LanceAdapter;
use winesearch_core::config::{resolve_with_base, Settings};
use winesearch_core::traits::BackendAdapter;
use winesearch_core::types::BackendKind;
use winesearch_graph::GraphAdapter;
use winesearch_keyword::KeywordAdapter;
use winesearch_text::TantivyAdapter;
use winesearch_vector::VectorAdapter;

/// An opened backend. The columnar store is kept typed as well so the CLI can
/// build its ANN index once a load finishes.
pub struct Backend {
    pub adapter: Arc<dyn BackendAdapter>,
    columnar: Option<Arc<LanceAdapter>>,
}

impl Backend {
    pub async fn open(kind: BackendKind, settings: &Settings, base: &Path) -> Result<Self> {
        let dim = settings.embedding.dim;
        let backend = match kind {
            BackendKind::Graph => Self::plain(GraphAdapter::new()),
            BackendKind::InvertedIndex => {
                let dir = resolve_with_base(base, &settings.data.tantivy_index_dir);
                info!(dir = %dir.display(), "opening tantivy index");
                Self::plain(TantivyAdapter::open(dir))
            }
            BackendKind::FastKeyword => Self::plain(KeywordAdapter::default()),
            BackendKind::Vector => Self::plain(VectorAdapter::new("wines", dim)),
            BackendKind::ColumnarVector => {
                let dir = resolve_with_base(base, &settings.data.lancedb_dir);
                let uri = dir.to_string_lossy().into_owned();
                let lance = Arc::new(
                    LanceAdapter::connect(&uri, dim)
                        .await
                        .with_context(|| format!("connecting to lancedb at {uri}"))?,
                );
                Self { adapter: lance.clone(), columnar: Some(lance) }
            }
        };
        info!(backend = %kind, persistent = is_persistent(kind), "backend opened");
        Ok(backend)
    }

    fn plain(adapter: impl BackendAdapter + 'static) -> Self {
        Self { adapter: Arc::new(adapter), columnar: None }
    }

    /// Post-load maintenance: the columnar store gets its vector index.
    pub async fn finish_ingest(&self) -> Result<()> {
        if let Some(lance) = &self.columnar {
            let built = lance.build_vector_index().await.context("building vector index")?;
            if built {
                println!("🧭 Built IVF-PQ vector index");
            } else {
                println!("ℹ️  Too few rows for an IVF-PQ index, using flat search");
            }
        }
        Ok(())
    }
}

/// Whether data written by one CLI invocation is visible to the next.
pub fn is_persistent(kind: BackendKind) -> bool {
    matches!(kind, BackendKind::InvertedIndex | BackendKind::ColumnarVector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_process_backends_open_without_io() -> Result<()> {
        let settings = Settings::default();
        let base = std::env::temp_dir();
        for kind in [BackendKind::Graph, BackendKind::FastKeyword, BackendKind::Vector] {
            let backend = Backend::open(kind, &settings, &base).await?;
            assert_eq!(backend.adapter.kind(), kind);
            backend.finish_ingest().await?;
        }
        assert!(is_persistent(BackendKind::ColumnarVector));
        assert!(!is_persistent(BackendKind::Graph));
        Ok(())
    }
}
