use std::net::SocketAddr;

use quantdesk::config::Config;
use quantdesk::engine::Engine;
use quantdesk::http::router;

use tracing::level_filters::LevelFilter;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .compact()
        .with_target(false)
        .with_env_filter(filter)
        .init();
}

fn config_path() -> String {
    std::env::var("QUANTDESK_CONFIG").unwrap_or_else(|_| {
        std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_owned())
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::from_file(config_path())?;
    let bind_addr: SocketAddr = config.http.bind_addr.parse()?;

    info!(%bind_addr, "starting quantdesk");
    let engine = Engine::start(config).await?;
    let app = router(engine.clone());

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(engine))
        .await?;

    Ok(())
}

async fn shutdown_signal(engine: Engine) {
    tokio::signal::ctrl_c().await.expect("failed to install ctrl_c handler");
    info!("shutdown signal received, draining coordinator");
    engine.shutdown().await;
}
