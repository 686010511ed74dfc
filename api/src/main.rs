use std::net::SocketAddr;
use std::time::Duration;

use dotenv::dotenv;
use mimalloc::MiMalloc;
use tracing_subscriber::EnvFilter;

use api::{App, config::ServerConfig, router};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,api=debug"));

    // Structured output for log ingestion in production, human-readable
    // everywhere else. Reads the raw variable because the subscriber must be
    // up before config parsing starts logging.
    let json_logs = std::env::var("ENVIRONMENT").is_ok_and(|env| env == "production");
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenv().ok();
    init_tracing();

    let config = ServerConfig::new_from_env();
    let app = App::from_config(config);

    if app.store.is_none() {
        tracing::warn!("CMS credentials are not set, comment endpoints will answer 503");
    }
    if app.identity_provider.is_none() {
        tracing::warn!("Auth service is not configured, sign-in endpoints will answer 503");
    }

    let limiter = app.limiter.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(5 * 60));
        loop {
            tick.tick().await;
            limiter.evict_expired();
        }
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", app.config.port)).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        router(app)?.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
