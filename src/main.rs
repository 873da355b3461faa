use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use flago_api::{
    api::{create_router, AppState},
    config::Config,
    db::{self, Cache, PgPartyStore},
    services::{
        party::{InMemoryPartyStore, PartyStore},
        providers::{PerplexityProvider, SpotifyProvider},
        sync::BroadcastSync,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flago_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn PartyStore> = match config.database_url.as_deref() {
        Some(url) => {
            let pool = db::create_pool(url).await?;
            db::run_migrations(&pool).await?;
            tracing::info!("Parties persist in PostgreSQL");
            Arc::new(PgPartyStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, parties are kept in memory");
            Arc::new(InMemoryPartyStore::new())
        }
    };

    let (cache, cache_writer) = match config.redis_url.as_deref() {
        Some(url) => {
            let client = db::create_redis_client(url)?;
            let (cache, writer) = Cache::new(client).await;
            (Some(cache), Some(writer))
        }
        None => {
            tracing::info!("REDIS_URL not set, metadata lookups are uncached");
            (None, None)
        }
    };

    if config.perplexity_api_key.is_none() {
        tracing::warn!("PERPLEXITY_API_KEY not set, slate requests will fail");
    }
    let recommender = Arc::new(PerplexityProvider::new(
        config.perplexity_api_key.clone(),
        config.perplexity_api_url.clone(),
        config.perplexity_model.clone(),
    ));
    let metadata = Arc::new(SpotifyProvider::new(
        config.spotify_client_id.clone(),
        config.spotify_client_secret.clone(),
        cache,
    ));

    let state = AppState::new(
        store,
        recommender,
        metadata,
        Arc::new(BroadcastSync::new()),
        config.session_settings(),
    );
    let app = create_router(state);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!("Server running on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(writer) = cache_writer {
        writer.shutdown().await;
    }
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
