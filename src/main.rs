use anyhow::Result;
use dotenv::dotenv;
use std::sync::Arc;

use foodfresh::config::AppConfig;
use foodfresh::handlers::{AnalysisWorkflow, ClockRefresher};
use foodfresh::services::{Clock, InferenceClient, OpenRouterService};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::init();

    // Load environment variables
    dotenv().ok();

    log::info!("🚀 Starting FoodFresh...");

    let config = AppConfig::from_env()?;

    let inference = OpenRouterService::new(config.openrouter_api_key.clone(), config.openrouter_model.clone())
        .with_base_url(config.openrouter_base_url.clone())
        .with_timeout(config.inference_timeout);
    let inference: Arc<dyn InferenceClient> = Arc::new(inference);
    log::info!("✅ OpenRouter service initialized with model: {}", config.openrouter_model);

    let clock = Clock::new(config.clock_timezone);
    match clock.timezone() {
        Some(tz) => log::info!("🕐 Clock timezone: {}", tz),
        None => log::info!("🕐 Clock timezone: local"),
    }

    let workflow = AnalysisWorkflow::new(inference, clock, config.max_upload_bytes);
    let clock_refresher = ClockRefresher::start(&workflow, config.clock_refresh).await?;

    #[cfg(feature = "http-server")]
    {
        use foodfresh::server::create_router;

        let app = create_router(workflow.clone(), config.max_upload_bytes);
        let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
        log::info!("🌐 Server listening on {}", config.bind_addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("❌ Server error: {}", e);
            }
        });
    }

    log::info!("🎉 FoodFresh is ready!");

    // Keep running
    tokio::signal::ctrl_c().await?;

    log::info!("🛑 Shutting down...");
    clock_refresher.stop().await?;

    Ok(())
}
