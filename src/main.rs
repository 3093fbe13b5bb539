use std::sync::Arc;

use miette::{IntoDiagnostic, Result};
use tokio::net::TcpListener;
use tracing::info;

use docparley::backends::{EmbeddingBackend, GenerativeBackend, ModelPricing, OpenAiBackend};
use docparley::chunker::Chunker;
use docparley::config::Config;
use docparley::engine::AnsweringEngine;
use docparley::index::{DistanceMetric, EmbeddingIndexer};
use docparley::retriever::Retriever;
use docparley::service::{AppContext, router};
use docparley::storage::{FsObjectStore, ObjectStore};
use docparley::stores::SqliteConversationStore;
use docparley::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    miette::set_panic_hook();

    let config = Config::from_env()?;

    let store = Arc::new(SqliteConversationStore::connect(&config.database_url).await?);
    let objects: Arc<dyn ObjectStore> =
        Arc::new(FsObjectStore::new(&config.object_store_root).await?);

    let backend = Arc::new(OpenAiBackend::new(
        reqwest::Client::new(),
        &config.openai_base_url,
        &config.openai_api_key,
        &config.chat_model,
        &config.embedding_model,
        ModelPricing {
            prompt_cost_per_1k: config.prompt_cost_per_1k,
            completion_cost_per_1k: config.completion_cost_per_1k,
        },
    ));
    let embedder: Arc<dyn EmbeddingBackend> = backend.clone();
    let generator: Arc<dyn GenerativeBackend> = backend;

    let chunker = Chunker::new(config.chunk_size, config.chunk_overlap).into_diagnostic()?;
    let engine = AnsweringEngine::new(
        store,
        Arc::clone(&objects),
        EmbeddingIndexer::new(Arc::clone(&embedder), DistanceMetric::default()),
        Retriever::new(embedder, config.retrieve_top_k),
        generator,
        chunker,
        config.engine_settings(),
    );

    let context = Arc::new(AppContext {
        engine,
        objects,
        bucket: config.storage_bucket.clone(),
        upload_prefix: config.storage_prefix.clone(),
    });

    let listener = TcpListener::bind(config.bind_addr).await.into_diagnostic()?;
    info!(addr = %config.bind_addr, "docparley listening");
    axum::serve(listener, router(context).into_make_service())
        .await
        .into_diagnostic()?;

    Ok(())
}
