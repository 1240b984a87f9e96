use std::{error::Error, sync::Arc};

use f1_pipeline::{
    routes::{init_tracing, make_app},
    utils::{config::Config, state::AppState},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();
    init_tracing();

    info!("Initializing pipeline...");
    let config = Config::init()?;
    info!(
        "Configuration loaded successfully (season {})",
        config.current_season
    );

    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState::init(config, shutdown.clone())?);
    info!("External clients initialized successfully");

    let scheduler = tokio::spawn(state.scheduler.clone().run());

    let listener = TcpListener::bind(&state.config.bind_addr).await?;
    info!("Listening on http://{}", state.config.bind_addr);

    let app = make_app(state.clone());
    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    scheduler.await?;
    Ok(())
}
