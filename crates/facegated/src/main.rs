use anyhow::Result;
use facegate_core::OnnxPipeline;
use facegate_store::IdentityStore;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod http;
mod registry;

#[actix_web::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facegated starting");
    let config = config::Config::from_env();

    // Load models and open the store synchronously (fail-fast)
    let pipeline = OnnxPipeline::load(
        &config.detector_model_path(),
        &config.embedder_model_path(),
        config.embedding_dim,
    )?;
    let store = IdentityStore::open(&config.storage_dir, config.embedding_dim)?;
    tracing::info!(
        storage_dir = %config.storage_dir.display(),
        threshold = config.match_threshold,
        embedding_dim = config.embedding_dim,
        "identity store opened"
    );

    let engine = engine::spawn_engine(Box::new(pipeline));
    let registry = registry::Registry::new(engine, store, config.match_threshold);

    tracing::info!(addr = %config.bind_addr, "facegated ready");
    http::serve(&config.bind_addr, registry).await?;

    tracing::info!("facegated shutting down");
    Ok(())
}
