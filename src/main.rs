use anyhow::Context;
use recipe_studio::{
    config::Settings,
    gemini::{redact_key, GeminiClient},
    images::ImageGenerator,
    personas::PersonaRegistry,
    pipeline::RecipePipeline,
    routes::{self, AppState},
    text::TextGenerator,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let settings = Settings::from_env().context("loading settings")?;
    tracing::info!(
        api_key = %redact_key(&settings.gemini_api_key),
        text_model = %settings.text_model,
        image_model = %settings.image_model,
        "Loaded settings"
    );

    let personas = PersonaRegistry::new();
    match &settings.persona_dir {
        Some(dir) => personas.initialize_from_dir(dir),
        None => personas.initialize(),
    }
    .context("loading personas")?;

    let gemini = Arc::new(GeminiClient::from_settings(&settings));
    let pipeline = RecipePipeline::new(
        TextGenerator::new(gemini.clone()).with_retry_policy(settings.text_retry_policy()),
        ImageGenerator::new(gemini)
            .with_retry_policy(settings.image_retry_policy())
            .with_options(settings.image),
    );
    let state = AppState::new(pipeline, personas, settings.default_cover_count);

    let app = routes::router(state.clone()).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    state.pipeline.close().await;
    tracing::info!("👋 Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
    }
}
