//! SupportChat API server

use anyhow::Context;
use std::sync::Arc;
use supportchat_api::{
    email::SmtpMailer, push::WebPushSender, routes::create_router, AppState, Config,
};
use supportchat_shared::{create_pool, run_migrations, MemoryMessageStore, MessageStore, PgMessageStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;

    let store: Arc<dyn MessageStore> = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url, config.database_max_connections)
                .await
                .context("Failed to connect to database")?;
            run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;
            tracing::info!("Using PostgreSQL message store");
            Arc::new(PgMessageStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; messages are kept in memory only");
            Arc::new(MemoryMessageStore::new())
        }
    };

    let mailer = SmtpMailer::from_config(&config).context("Failed to configure mailer")?;
    let push = WebPushSender::from_config(&config).context("Failed to configure web push")?;
    tracing::info!(
        email = mailer.is_enabled(),
        push = push.is_enabled(),
        "Offline notifications configured"
    );

    let bind_address = config.bind_address.clone();
    let state = AppState::new(config, store, Arc::new(push), Arc::new(mailer));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    tracing::info!(address = %bind_address, "SupportChat API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("supportchat_api=debug,tower_http=info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
