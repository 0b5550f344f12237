use std::sync::Arc;

use anyhow::Context;
use chatwire::{
    AppState, Messenger,
    config::Config,
    db,
    store::{CachedMessageStore, MessageStore, SqliteStore},
};
use tracing::{info, instrument};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    init_tracing(config.json_logs);
    serve(config).await
}

fn init_tracing(json_logs: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chatwire=info"));

    if json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }
}

#[instrument(skip_all, fields(address = %config.listen_address()))]
async fn serve(config: Config) -> anyhow::Result<()> {
    let db_pool = db::connect(&config.database_url, config.max_connections)
        .await
        .with_context(|| format!("opening {}", config.database_url))?;

    let store = Arc::new(SqliteStore::new(db_pool));
    let messages: Arc<dyn MessageStore> = if config.message_cache {
        Arc::new(CachedMessageStore::new(store.clone(), config.message_cache_chats))
    } else {
        store.clone()
    };
    let messenger = Messenger::new(messages, store, config.messenger_options());

    let app = chatwire::app(AppState { messenger });
    let listener = tokio::net::TcpListener::bind(config.listen_address())
        .await
        .with_context(|| format!("binding {}", config.listen_address()))?;

    info!(message_cache = config.message_cache, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
