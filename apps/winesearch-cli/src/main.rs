use anyhow::{bail, Context, Result};
use futures::stream;
use std::env;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use winesearch_core::config::{resolve_with_base, Config, Settings};
use winesearch_core::source::read_all;
use winesearch_core::traits::EmbeddingProvider;
use winesearch_embed::default_embedder;
use winesearch_ingest::{CancelToken, IngestReport, Pipeline};
use winesearch_query::QueryTranslator;

mod args;
mod backends;
mod progress;

use args::{IngestArgs, QueryArgs, QueryOptions, RunArgs, USAGE};
use backends::Backend;
use progress::IngestProgress;

fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn load_embedder(settings: &Settings) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder = default_embedder(&settings.embedding).context("loading embedding model")?;
    println!("🧠 Embeddings: {} ({} dims)", embedder.model_id(), embedder.dim());
    Ok(embedder)
}

async fn ingest(backend: &Backend, args: &IngestArgs, settings: &Settings, base: &Path) -> Result<IngestReport> {
    let path = match &args.path {
        Some(p) => p.clone(),
        None => resolve_with_base(base, &settings.data.source),
    };
    println!("📂 Reading {}", path.display());
    let records = read_all(&path, args.limit).with_context(|| format!("reading {}", path.display()))?;
    if let Some(limit) = args.limit {
        println!("🔢 Limited to {limit} records");
    }
    let total = records.len();

    let mut pipeline = Pipeline::new(backend.adapter.clone(), settings.ingest.clone(), settings.retry.policy());
    if backend.adapter.needs_embeddings() {
        pipeline = pipeline.with_embedder(load_embedder(settings)?, settings.embedding.fields.clone());
    }

    let cancel = CancelToken::new();
    let on_interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, letting dispatched batches finish");
                cancel.cancel();
            }
        })
    };
    let progress = IngestProgress::start(total, pipeline.metrics());
    let report = pipeline.run(stream::iter(records), &cancel).await;
    progress.finish();
    on_interrupt.abort();

    if !report.cancelled {
        backend.finish_ingest().await?;
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.cancelled {
        println!("⚠️  Cancelled: {} records not attempted", report.not_attempted);
    } else {
        println!("\n✅ Ingested {}/{} records into {}", report.succeeded, report.read, report.backend);
    }
    Ok(report)
}

async fn query(backend: &Backend, options: &QueryOptions, settings: &Settings) -> Result<()> {
    let mut translator = QueryTranslator::new(settings.query.clone(), settings.retry.policy());
    if backend.adapter.needs_embeddings() && options.params.terms.is_some() {
        translator = translator.with_embedder(load_embedder(settings)?);
    }
    let request = options.request(settings.query.hybrid_alpha);
    let adapter = backend.adapter.as_ref();
    info!(backend = %adapter.kind(), ?request, "query");

    if options.explain {
        println!("🔎 {}", translator.explain(&request, adapter).await?);
    }
    let result = translator.translate_and_execute(&request, adapter).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if let Some(cursor) = &result.next_cursor {
        println!("\n💡 Next page: --cursor {cursor}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    let settings = config.settings()?;
    let base = env::current_dir()?;

    let mut argv = env::args().skip(1);
    let Some(command) = argv.next() else {
        println!("{USAGE}");
        return Ok(());
    };
    let rest: Vec<String> = argv.collect();

    match command.as_str() {
        "ingest" => {
            let args = IngestArgs::parse(&rest)?;
            let backend = Backend::open(args.backend, &settings, &base).await?;
            ingest(&backend, &args, &settings, &base).await?;
            if !backends::is_persistent(args.backend) {
                println!("💡 {} keeps data in memory; use `winesearch run` to query it", args.backend);
            }
        }
        "query" => {
            let args = QueryArgs::parse(&rest)?;
            let backend = Backend::open(args.backend, &settings, &base).await?;
            query(&backend, &args.options, &settings).await?;
        }
        "run" => {
            let args = RunArgs::parse(&rest)?;
            let backend = Backend::open(args.ingest.backend, &settings, &base).await?;
            let report = ingest(&backend, &args.ingest, &settings, &base).await?;
            if report.cancelled {
                return Ok(());
            }
            println!();
            query(&backend, &args.options, &settings).await?;
        }
        "schema" => {
            let kind = args::backend(&rest)?;
            if rest.len() > 1 {
                bail!("schema takes only a backend\n\n{USAGE}");
            }
            let backend = Backend::open(kind, &settings, &base).await?;
            let status = backend.adapter.ensure_schema().await.context("ensuring schema")?;
            println!("✅ {kind} schema: {status:?}");
            println!("Capabilities:");
            for capability in backend.adapter.capabilities().iter() {
                println!("  • {capability}");
            }
        }
        "help" | "-h" | "--help" => println!("{USAGE}"),
        other => bail!("unknown command '{other}'\n\n{USAGE}"),
    }
    Ok(())
}
