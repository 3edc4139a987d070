use std::env;
use rivals_server::{router, ServerConfig, State};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_args_and_env(env::args())?;
    let state = State::open(&config.db_path)?;
    let app = router(state.clone());
    let addr = config.addr();
    info!(%addr, db = %config.db_path, "listening");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    state.store().flush().await?;
    Ok(())
}
