use anyhow::{Context, Result};
use rollcall_core::OnnxExtractor;
use rollcalld::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    tracing::info!(
        bind = %config.bind_addr,
        data_dir = %config.data_dir.display(),
        store = %config.store_path.display(),
        model_dir = %config.model_dir.display(),
        threshold = config.match_threshold,
        strategy = %config.match_strategy,
        "rollcalld starting"
    );

    // Fail fast if the models are missing.
    let extractor = OnnxExtractor::load(&config.model_dir)
        .with_context(|| format!("loading models from {}", config.model_dir.display()))?;

    let bind_addr = config.bind_addr;
    let app = rollcalld::build_app(config, Box::new(extractor)).await?;

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "rollcalld ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("rollcalld shutting down");
    Ok(())
}
